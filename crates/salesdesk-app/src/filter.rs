// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::Date;

use crate::{CouplingRule, TableConfig};

/// Categorical value meaning "no filter". Never sent to the query service.
pub const ALL_SENTINEL: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchField {
    Text,
    TransactionId,
    Card,
    User,
}

impl SearchField {
    pub const ALL: [Self; 4] = [Self::Text, Self::TransactionId, Self::Card, Self::User];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::TransactionId => "transaction",
            Self::Card => "card",
            Self::User => "user",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "transaction" | "transactionId" => Some(Self::TransactionId),
            "card" => Some(Self::Card),
            "user" | "salesUser" => Some(Self::User),
            _ => None,
        }
    }

    /// Request parameter the search text is bound to.
    pub const fn param_name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::TransactionId => "transactionId",
            Self::Card => "card",
            Self::User => "salesUser",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Some(Self::Asc),
            "desc" | "descending" => Some(Self::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub column: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn ascending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn descending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }

    pub const fn is_descending(&self) -> bool {
        matches!(self.direction, SortDirection::Desc)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateMode {
    None,
    Single,
    Range,
}

/// Date restriction of a table query. The variant is the date mode, so a
/// single date can never coexist with a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DateFilter {
    #[default]
    None,
    Single(Date),
    Range {
        from: Date,
        to: Option<Date>,
    },
}

impl DateFilter {
    /// Builds a range, swapping the bounds when they arrive reversed.
    pub fn range(from: Date, to: Option<Date>) -> Self {
        match to {
            Some(to) if to < from => Self::Range {
                from: to,
                to: Some(from),
            },
            _ => Self::Range { from, to },
        }
    }

    pub const fn mode(&self) -> DateMode {
        match self {
            Self::None => DateMode::None,
            Self::Single(_) => DateMode::Single,
            Self::Range { .. } => DateMode::Range,
        }
    }

    /// Inclusive calendar bounds, `None` when no date filter is active.
    pub fn bounds(&self) -> Option<(Date, Date)> {
        match *self {
            Self::None => None,
            Self::Single(day) => Some((day, day)),
            Self::Range { from, to } => Some((from, to.unwrap_or(from))),
        }
    }
}

/// One user-driven change to a table's query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterPatch {
    SearchText(String),
    SearchField(SearchField),
    Categorical { key: String, value: String },
    Date(DateFilter),
    Page(u32),
    PageSize(u32),
    Sort(Sort),
}

impl FilterPatch {
    pub fn categorical(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Categorical {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Free text is a continuous stream; everything else is a discrete action.
    pub const fn is_debounced(&self) -> bool {
        matches!(self, Self::SearchText(_))
    }
}

/// Immutable snapshot of a table's query parameters. Every transition
/// returns a new snapshot; all of them except `with_page` put the user back
/// on page 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    search_text: String,
    search_field: SearchField,
    categorical: BTreeMap<String, String>,
    date: DateFilter,
    page: u32,
    page_size: u32,
    sort: Option<Sort>,
}

impl FilterState {
    pub fn for_table(config: &TableConfig) -> Self {
        Self {
            search_text: String::new(),
            search_field: SearchField::Text,
            categorical: config.categorical_defaults().clone(),
            date: DateFilter::None,
            page: 1,
            page_size: config.default_page_size(),
            sort: None,
        }
    }

    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    pub const fn search_field(&self) -> SearchField {
        self.search_field
    }

    pub fn categorical_filters(&self) -> &BTreeMap<String, String> {
        &self.categorical
    }

    pub fn categorical(&self, key: &str) -> Option<&str> {
        self.categorical.get(key).map(String::as_str)
    }

    pub const fn date(&self) -> DateFilter {
        self.date
    }

    pub const fn page(&self) -> u32 {
        self.page
    }

    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn sort(&self) -> Option<&Sort> {
        self.sort.as_ref()
    }

    pub fn with_search_text(&self, text: impl Into<String>) -> Self {
        Self {
            search_text: text.into(),
            page: 1,
            ..self.clone()
        }
    }

    pub fn with_search_field(&self, field: SearchField) -> Self {
        Self {
            search_field: field,
            page: 1,
            ..self.clone()
        }
    }

    pub fn with_categorical_filter(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut next = Self {
            page: 1,
            ..self.clone()
        };
        next.categorical.insert(key.into(), value.into());
        next
    }

    pub fn with_date(&self, date: DateFilter) -> Self {
        Self {
            date,
            page: 1,
            ..self.clone()
        }
    }

    pub fn with_page(&self, page: u32) -> Result<Self> {
        if page == 0 {
            bail!("page numbers start at 1, got 0");
        }
        Ok(Self {
            page,
            ..self.clone()
        })
    }

    pub fn with_page_size(&self, page_size: u32) -> Result<Self> {
        if page_size == 0 {
            bail!("page size must be positive, got 0");
        }
        Ok(Self {
            page_size,
            page: 1,
            ..self.clone()
        })
    }

    pub fn with_sort(&self, sort: Sort) -> Self {
        Self {
            sort: Some(sort),
            page: 1,
            ..self.clone()
        }
    }

    pub fn reset(&self, config: &TableConfig) -> Self {
        Self::for_table(config)
    }

    /// Applies a patch under the table's rules: unknown categorical keys and
    /// search fields the table does not offer are rejected, and coupling
    /// rules run after the primary change.
    pub fn apply(&self, patch: &FilterPatch, config: &TableConfig) -> Result<Self> {
        match patch {
            FilterPatch::SearchText(text) => Ok(self.with_search_text(text.clone())),
            FilterPatch::SearchField(field) => {
                if !config.offers(*field) {
                    bail!(
                        "table {} does not support searching by {}; use one of: {}",
                        config.name(),
                        field.as_str(),
                        config
                            .search_fields()
                            .iter()
                            .map(|field| field.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                }
                let mut next = self.with_search_field(*field);
                if *field == SearchField::User && self.search_field != SearchField::User {
                    for rule in config.couplings() {
                        if let CouplingRule::UserSearchResets { filters } = rule {
                            next.restore_defaults(filters, config);
                        }
                    }
                }
                Ok(next)
            }
            FilterPatch::Categorical { key, value } => {
                if !config.declares(key) {
                    bail!("table {} has no {key:?} filter", config.name());
                }
                let changed = self.categorical(key) != Some(value.as_str());
                let mut next = self.with_categorical_filter(key.clone(), value.clone());
                if changed {
                    for rule in config.couplings() {
                        if let CouplingRule::ClearOnChange { trigger, cleared } = rule
                            && trigger == key
                        {
                            next.restore_defaults(cleared, config);
                        }
                    }
                }
                Ok(next)
            }
            FilterPatch::Date(date) => Ok(self.with_date(*date)),
            FilterPatch::Page(page) => self.with_page(*page),
            FilterPatch::PageSize(size) => self.with_page_size(*size),
            FilterPatch::Sort(sort) => Ok(self.with_sort(sort.clone())),
        }
    }

    fn restore_defaults(&mut self, keys: &[String], config: &TableConfig) {
        for key in keys {
            let default = config.default_for(key).unwrap_or(ALL_SENTINEL);
            self.categorical.insert(key.clone(), default.to_owned());
        }
    }
}
