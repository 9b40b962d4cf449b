// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::Serialize;
use std::collections::BTreeMap;
use time::macros::format_description;
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime};

use crate::{ALL_SENTINEL, FilterState, SearchField, SortDirection, TableConfig};

/// Canonical query sent to the query service. Derived from a
/// [`FilterState`]; two snapshots that mean the same query produce equal
/// parameters, which is what duplicate suppression compares.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RequestParameters {
    pub text: String,
    pub transaction_id: Option<String>,
    pub card: Option<String>,
    pub sales_user: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub page: u32,
    pub page_size: u32,
    pub sort_column: String,
    pub sort_direction: SortDirection,
    pub filters: BTreeMap<String, String>,
}

impl RequestParameters {
    /// Query-string pairs in a stable order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("text".to_owned(), self.text.clone())];
        let field_params = [
            ("transactionId", &self.transaction_id),
            ("card", &self.card),
            ("salesUser", &self.sales_user),
            ("fromDate", &self.from_date),
            ("toDate", &self.to_date),
        ];
        for (name, value) in field_params {
            if let Some(value) = value {
                pairs.push((name.to_owned(), value.clone()));
            }
        }
        pairs.push(("page".to_owned(), self.page.to_string()));
        pairs.push(("pageSize".to_owned(), self.page_size.to_string()));
        pairs.push(("sortColumn".to_owned(), self.sort_column.clone()));
        pairs.push((
            "sortDirection".to_owned(),
            self.sort_direction.as_str().to_owned(),
        ));
        pairs.extend(
            self.filters
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        pairs
    }
}

pub fn normalize(filter: &FilterState, config: &TableConfig) -> RequestParameters {
    let search = filter.search_text().to_owned();
    let routed = |field: SearchField| {
        (filter.search_field() == field && !search.is_empty()).then(|| search.clone())
    };

    let text = if filter.search_field() == SearchField::Text {
        search.clone()
    } else {
        String::new()
    };

    let (from_date, to_date) = match filter.date().bounds() {
        Some((from, to)) => (Some(format_day(from)), Some(format_day(to))),
        None => (None, None),
    };

    let (sort_column, sort_direction) = match filter.sort() {
        Some(sort) => (sort.column.clone(), sort.direction),
        None => (config.default_sort_column().to_owned(), SortDirection::Desc),
    };

    let filters = filter
        .categorical_filters()
        .iter()
        .filter(|(_, value)| value.as_str() != ALL_SENTINEL)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    RequestParameters {
        transaction_id: routed(SearchField::TransactionId),
        card: routed(SearchField::Card),
        sales_user: routed(SearchField::User),
        text,
        from_date,
        to_date,
        page: filter.page(),
        page_size: filter.page_size(),
        sort_column,
        sort_direction,
        filters,
    }
}

/// Calendar day the user saw when picking `at`: the date in `at`'s own
/// offset, never the UTC date. [`Date`] values in a [`FilterState`] are
/// already local calendar days and are encoded as they are.
pub fn local_day(at: OffsetDateTime) -> Date {
    at.date()
}

/// `YYYY-MM-DD`, the only date encoding the query service accepts.
pub fn format_day(day: Date) -> String {
    day.format(&format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| day.to_string())
}

pub fn parse_day(raw: &str) -> Option<Date> {
    Date::parse(raw.trim(), &format_description!("[year]-[month]-[day]")).ok()
}

/// Accepts a `YYYY-MM-DD` day or an RFC 3339 timestamp. A timestamp maps to
/// the calendar day in its own offset.
pub fn parse_day_or_timestamp(raw: &str) -> Option<Date> {
    parse_day(raw).or_else(|| {
        OffsetDateTime::parse(raw.trim(), &Rfc3339)
            .ok()
            .map(local_day)
    })
}
