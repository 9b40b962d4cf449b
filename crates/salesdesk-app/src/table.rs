// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeMap;

use crate::{ALL_SENTINEL, FilterState, SearchField};

pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// Side effect one filter change has on the others. Tables disagree on
/// these, so each table lists its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CouplingRule {
    /// Changing `trigger` restores each `cleared` filter to its default.
    ClearOnChange {
        trigger: String,
        cleared: Vec<String>,
    },
    /// Switching the search field to user search restores these filters.
    UserSearchResets { filters: Vec<String> },
}

/// Everything that differs between two table screens: where the rows come
/// from, which filters exist and what they default to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    name: String,
    endpoint: String,
    default_sort_column: String,
    default_page_size: u32,
    categorical_defaults: BTreeMap<String, String>,
    search_fields: Vec<SearchField>,
    couplings: Vec<CouplingRule>,
}

impl TableConfig {
    pub const PRESETS: [&'static str; 4] = ["leads", "sales", "payments", "expenses"];

    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        default_sort_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            default_sort_column: default_sort_column.into(),
            default_page_size: DEFAULT_PAGE_SIZE,
            categorical_defaults: BTreeMap::new(),
            search_fields: vec![SearchField::Text],
            couplings: Vec::new(),
        }
    }

    pub fn with_categorical(mut self, key: impl Into<String>, default: impl Into<String>) -> Self {
        self.categorical_defaults.insert(key.into(), default.into());
        self
    }

    pub fn with_search_fields(mut self, fields: &[SearchField]) -> Self {
        self.search_fields = fields.to_vec();
        if !self.search_fields.contains(&SearchField::Text) {
            self.search_fields.insert(0, SearchField::Text);
        }
        self
    }

    pub fn with_coupling(mut self, rule: CouplingRule) -> Self {
        self.couplings.push(rule);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.default_page_size = page_size.max(1);
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn leads() -> Self {
        Self::new("leads", "/leads", "entDate")
            .with_categorical("company", ALL_SENTINEL)
            .with_categorical("status", ALL_SENTINEL)
            .with_categorical("source", ALL_SENTINEL)
            .with_search_fields(&[SearchField::Text, SearchField::User])
            .with_coupling(CouplingRule::UserSearchResets {
                filters: vec!["company".to_owned()],
            })
    }

    pub fn sales() -> Self {
        Self::new("sales", "/sales", "date")
            .with_categorical("company", "QS")
            .with_categorical("vendor", ALL_SENTINEL)
            .with_categorical("brand", ALL_SENTINEL)
            .with_search_fields(&[
                SearchField::Text,
                SearchField::TransactionId,
                SearchField::Card,
                SearchField::User,
            ])
            .with_coupling(CouplingRule::ClearOnChange {
                trigger: "company".to_owned(),
                cleared: vec!["vendor".to_owned(), "brand".to_owned()],
            })
            .with_coupling(CouplingRule::UserSearchResets {
                filters: vec!["vendor".to_owned()],
            })
    }

    pub fn payments() -> Self {
        Self::new("payments", "/payments", "PaymentDate")
            .with_categorical("company", ALL_SENTINEL)
            .with_categorical("gateway", ALL_SENTINEL)
            .with_categorical("customer", ALL_SENTINEL)
            .with_categorical("vendor", ALL_SENTINEL)
            .with_search_fields(&[
                SearchField::Text,
                SearchField::TransactionId,
                SearchField::Card,
            ])
            .with_coupling(CouplingRule::ClearOnChange {
                trigger: "customer".to_owned(),
                cleared: vec!["vendor".to_owned()],
            })
    }

    pub fn expenses() -> Self {
        Self::new("expenses", "/expenses", "date")
            .with_categorical("company", ALL_SENTINEL)
            .with_categorical("category", ALL_SENTINEL)
            .with_categorical("vendor", ALL_SENTINEL)
    }

    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "leads" => Some(Self::leads()),
            "sales" => Some(Self::sales()),
            "payments" => Some(Self::payments()),
            "expenses" => Some(Self::expenses()),
            _ => None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn default_sort_column(&self) -> &str {
        &self.default_sort_column
    }

    pub const fn default_page_size(&self) -> u32 {
        self.default_page_size
    }

    pub fn categorical_defaults(&self) -> &BTreeMap<String, String> {
        &self.categorical_defaults
    }

    pub fn default_for(&self, key: &str) -> Option<&str> {
        self.categorical_defaults.get(key).map(String::as_str)
    }

    pub fn declares(&self, key: &str) -> bool {
        self.categorical_defaults.contains_key(key)
    }

    pub fn search_fields(&self) -> &[SearchField] {
        &self.search_fields
    }

    pub fn offers(&self, field: SearchField) -> bool {
        self.search_fields.contains(&field)
    }

    pub fn couplings(&self) -> &[CouplingRule] {
        &self.couplings
    }

    pub fn default_filter(&self) -> FilterState {
        FilterState::for_table(self)
    }
}
