// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::{FilterState, format_day, normalize_value};

/// One choice in a filter dropdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionEntry {
    pub value: String,
    pub label: String,
}

impl OptionEntry {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// The salesperson list depends on company and period, so it is cached per
/// combination of the three.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserOptionsKey {
    pub company: String,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
}

impl UserOptionsKey {
    pub fn from_filter(filter: &FilterState) -> Self {
        let (from_date, to_date) = match filter.date().bounds() {
            Some((from, to)) => (Some(format_day(from)), Some(format_day(to))),
            None => (None, None),
        };
        Self {
            company: filter
                .categorical("company")
                .unwrap_or(crate::ALL_SENTINEL)
                .to_owned(),
            from_date,
            to_date,
        }
    }
}

pub trait OptionSource {
    /// Static dictionary such as companies, vendors, brands or gateways.
    fn fetch_options(&mut self, kind: &str) -> Result<Vec<OptionEntry>>;
    fn fetch_users(&mut self, key: &UserOptionsKey) -> Result<Vec<OptionEntry>>;
}

/// Option lists for one table screen. Dictionaries are fetched once per
/// catalog; user lists once per [`UserOptionsKey`]. Failed fetches are not
/// cached.
#[derive(Debug, Clone, Default)]
pub struct OptionCatalog {
    lists: HashMap<String, Vec<OptionEntry>>,
    users: HashMap<UserOptionsKey, Vec<OptionEntry>>,
}

impl OptionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list<S: OptionSource + ?Sized>(
        &mut self,
        source: &mut S,
        kind: &str,
    ) -> Result<&[OptionEntry]> {
        if !self.lists.contains_key(kind) {
            let entries = source.fetch_options(kind)?;
            info!("[OPTIONS] cached {} {kind} options", entries.len());
            self.lists.insert(kind.to_owned(), entries);
        }
        Ok(self.lists.get(kind).map(Vec::as_slice).unwrap_or_default())
    }

    pub fn users<S: OptionSource + ?Sized>(
        &mut self,
        source: &mut S,
        key: &UserOptionsKey,
    ) -> Result<&[OptionEntry]> {
        if !self.users.contains_key(key) {
            let entries = source.fetch_users(key)?;
            info!(
                "[OPTIONS] cached {} users for company {}",
                entries.len(),
                key.company
            );
            self.users.insert(key.clone(), entries);
        }
        Ok(self.users.get(key).map(Vec::as_slice).unwrap_or_default())
    }

    pub fn invalidate_users(&mut self) {
        self.users.clear();
    }

    pub fn is_cached(&self, kind: &str) -> bool {
        self.lists.contains_key(kind)
    }
}

/// Reads option entries out of any payload shape the query service uses
/// for tables. Rows may be plain strings or objects carrying
/// `value`/`id`/`code`/`name` and `label`/`name`/`title`.
pub fn parse_option_entries(payload: &Value) -> Vec<OptionEntry> {
    normalize_value(payload)
        .result
        .records
        .iter()
        .filter_map(option_entry)
        .collect()
}

fn option_entry(row: &Value) -> Option<OptionEntry> {
    match row {
        Value::Object(object) => {
            let value = ["value", "id", "code", "name"]
                .iter()
                .find_map(|key| scalar_text(object.get(*key)?))?;
            let label = ["label", "name", "title"]
                .iter()
                .find_map(|key| scalar_text(object.get(*key)?))
                .unwrap_or_else(|| value.clone());
            Some(OptionEntry { value, label })
        }
        other => scalar_text(other).map(|text| OptionEntry::new(text.clone(), text)),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{OptionCatalog, OptionEntry, OptionSource, UserOptionsKey, parse_option_entries};
    use crate::{DateFilter, FilterState, TableConfig};
    use anyhow::{Result, bail};
    use serde_json::json;
    use time::{Date, Month};

    #[derive(Default)]
    struct CountingSource {
        option_calls: usize,
        user_calls: usize,
        fail_next: bool,
    }

    impl OptionSource for CountingSource {
        fn fetch_options(&mut self, kind: &str) -> Result<Vec<OptionEntry>> {
            self.option_calls += 1;
            if self.fail_next {
                self.fail_next = false;
                bail!("options endpoint down");
            }
            Ok(vec![OptionEntry::new(kind, kind.to_uppercase())])
        }

        fn fetch_users(&mut self, key: &UserOptionsKey) -> Result<Vec<OptionEntry>> {
            self.user_calls += 1;
            Ok(vec![OptionEntry::new(
                format!("{}-rep", key.company),
                "Rep",
            )])
        }
    }

    #[test]
    fn dictionaries_are_fetched_once() -> Result<()> {
        let mut source = CountingSource::default();
        let mut catalog = OptionCatalog::new();

        let first = catalog.list(&mut source, "vendor")?.to_vec();
        let second = catalog.list(&mut source, "vendor")?.to_vec();
        assert_eq!(first, second);
        assert_eq!(source.option_calls, 1);

        catalog.list(&mut source, "brand")?;
        assert_eq!(source.option_calls, 2);
        assert!(catalog.is_cached("brand"));
        Ok(())
    }

    #[test]
    fn failed_fetch_is_retried_next_time() -> Result<()> {
        let mut source = CountingSource {
            fail_next: true,
            ..CountingSource::default()
        };
        let mut catalog = OptionCatalog::new();

        assert!(catalog.list(&mut source, "gateway").is_err());
        assert!(!catalog.is_cached("gateway"));
        assert_eq!(catalog.list(&mut source, "gateway")?.len(), 1);
        assert_eq!(source.option_calls, 2);
        Ok(())
    }

    #[test]
    fn user_lists_are_cached_per_company_and_period() -> Result<()> {
        let config = TableConfig::sales();
        let base = FilterState::for_table(&config);
        let march = Date::from_calendar_date(2025, Month::March, 1)?;
        let dated = base.with_date(DateFilter::Single(march));

        let mut source = CountingSource::default();
        let mut catalog = OptionCatalog::new();

        let key = UserOptionsKey::from_filter(&base);
        assert_eq!(key.company, "QS");
        catalog.users(&mut source, &key)?;
        catalog.users(&mut source, &UserOptionsKey::from_filter(&base.with_search_text("x")))?;
        assert_eq!(source.user_calls, 1);

        let dated_key = UserOptionsKey::from_filter(&dated);
        assert_eq!(dated_key.from_date.as_deref(), Some("2025-03-01"));
        catalog.users(&mut source, &dated_key)?;
        assert_eq!(source.user_calls, 2);

        catalog.invalidate_users();
        catalog.users(&mut source, &key)?;
        assert_eq!(source.user_calls, 3);
        Ok(())
    }

    #[test]
    fn option_entries_accept_strings_and_objects() {
        let entries = parse_option_entries(&json!({
            "data": [
                "QS",
                {"id": 7, "name": "Acme"},
                {"value": "nova", "label": "Nova Brands"},
                {"code": "X"},
                {"unrelated": true},
                ""
            ],
            "totalRecords": 6
        }));
        assert_eq!(
            entries,
            vec![
                OptionEntry::new("QS", "QS"),
                OptionEntry::new("7", "Acme"),
                OptionEntry::new("nova", "Nova Brands"),
                OptionEntry::new("X", "X"),
            ]
        );
    }
}
