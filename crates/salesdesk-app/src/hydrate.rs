// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use log::debug;

use crate::{
    DateFilter, FilterState, SearchField, Sort, SortDirection, TableConfig, parse_day_or_timestamp,
};

/// Builds the initial snapshot for a deep link such as
/// `company=QS&from=2025-01-01&to=2025-01-31&page=3`.
///
/// The link describes a finished snapshot, so coupling rules do not run and
/// the page number survives. Unknown keys are ignored.
pub fn hydrate_filter<I, K, V>(config: &TableConfig, pairs: I) -> Result<FilterState>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut state = FilterState::for_table(config);
    let mut search: Option<(SearchField, String)> = None;
    let mut explicit_field = None;
    let mut from = None;
    let mut to = None;
    let mut single = None;
    let mut sort_column = None;
    let mut sort_direction = None;
    let mut page = None;

    for (key, value) in pairs {
        let (key, value) = (key.as_ref(), value.as_ref().trim());
        match key {
            "text" | "search" => search = Some((SearchField::Text, value.to_owned())),
            "transactionId" => search = Some((SearchField::TransactionId, value.to_owned())),
            "card" => search = Some((SearchField::Card, value.to_owned())),
            "salesUser" => search = Some((SearchField::User, value.to_owned())),
            "field" => {
                explicit_field = Some(
                    SearchField::parse(value)
                        .ok_or_else(|| anyhow!("unknown search field {value:?} in link"))?,
                );
            }
            "date" => single = Some(parse_link_day(key, value)?),
            "from" | "fromDate" => from = Some(parse_link_day(key, value)?),
            "to" | "toDate" => to = Some(parse_link_day(key, value)?),
            "sort" | "sortColumn" => sort_column = Some(value.to_owned()),
            "dir" | "sortDirection" => {
                sort_direction = Some(
                    SortDirection::parse(value).ok_or_else(|| {
                        anyhow!("sort direction must be asc or desc, got {value:?}")
                    })?,
                );
            }
            "page" => page = Some(parse_positive(key, value)?),
            "pageSize" => state = state.with_page_size(parse_positive(key, value)?)?,
            other if config.declares(other) => {
                state = state.with_categorical_filter(other, value);
            }
            other => debug!("[LINK] ignoring unknown key {other:?}"),
        }
    }

    let (field, text) = match (search, explicit_field) {
        (Some((_, text)), Some(field)) => (field, text),
        (Some((field, text)), None) => (field, text),
        (None, Some(field)) => (field, String::new()),
        (None, None) => (SearchField::Text, String::new()),
    };
    if !config.offers(field) {
        bail!(
            "table {} does not support searching by {} (link parameter {})",
            config.name(),
            field.as_str(),
            field.param_name()
        );
    }
    state = state.with_search_field(field).with_search_text(text);

    let date = match (single, from, to) {
        (_, Some(from), to) => DateFilter::range(from, to),
        (_, None, Some(_)) => bail!("link has an end date (to) without a start date (from)"),
        (Some(day), None, None) => DateFilter::Single(day),
        (None, None, None) => DateFilter::None,
    };
    state = state.with_date(date);

    match (sort_column.filter(|column| !column.is_empty()), sort_direction) {
        (Some(column), direction) => {
            state = state.with_sort(Sort {
                column,
                direction: direction.unwrap_or(SortDirection::Desc),
            });
        }
        (None, Some(_)) => bail!("link has a sort direction (dir) without a sort column"),
        (None, None) => {}
    }

    if let Some(page) = page {
        state = state.with_page(page)?;
    }
    Ok(state)
}

fn parse_link_day(key: &str, value: &str) -> Result<time::Date> {
    parse_day_or_timestamp(value).ok_or_else(|| {
        anyhow!("{key} must be a YYYY-MM-DD date or an RFC 3339 timestamp, got {value:?}")
    })
}

fn parse_positive(key: &str, value: &str) -> Result<u32> {
    let parsed: u32 = value
        .parse()
        .with_context(|| format!("{key} must be a positive integer, got {value:?}"))?;
    if parsed == 0 {
        bail!("{key} must be a positive integer, got 0");
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::hydrate_filter;
    use crate::{DateFilter, SearchField, SortDirection, TableConfig};
    use anyhow::Result;
    use time::{Date, Month};

    #[test]
    fn empty_link_yields_table_defaults() -> Result<()> {
        let config = TableConfig::sales();
        let state = hydrate_filter(&config, Vec::<(String, String)>::new())?;
        assert_eq!(state, config.default_filter());
        Ok(())
    }

    #[test]
    fn link_keeps_page_and_dependent_filters() -> Result<()> {
        let config = TableConfig::sales();
        let state = hydrate_filter(
            &config,
            [
                ("page", "3"),
                ("vendor", "Acme"),
                ("company", "Other"),
                ("from", "2025-01-31"),
                ("to", "2025-01-01"),
                ("sort", "amount"),
                ("dir", "asc"),
                ("utm_source", "mail"),
            ],
        )?;
        assert_eq!(state.page(), 3);
        assert_eq!(state.categorical("company"), Some("Other"));
        assert_eq!(state.categorical("vendor"), Some("Acme"));
        let first = Date::from_calendar_date(2025, Month::January, 1)?;
        let last = Date::from_calendar_date(2025, Month::January, 31)?;
        assert_eq!(state.date(), DateFilter::range(first, Some(last)));
        let sort = state.sort().expect("sort from link");
        assert_eq!(sort.column, "amount");
        assert_eq!(sort.direction, SortDirection::Asc);
        Ok(())
    }

    #[test]
    fn field_parameter_selects_search_mode() -> Result<()> {
        let config = TableConfig::payments();
        let state = hydrate_filter(&config, [("card", "4242")])?;
        assert_eq!(state.search_field(), SearchField::Card);
        assert_eq!(state.search_text(), "4242");

        let single = hydrate_filter(&config, [("date", "2025-06-01")])?;
        assert!(matches!(single.date(), DateFilter::Single(_)));
        Ok(())
    }

    #[test]
    fn timestamps_in_links_keep_the_sender_calendar_day() -> Result<()> {
        let config = TableConfig::payments();
        let state = hydrate_filter(
            &config,
            [
                ("from", "2025-03-01T00:15:00+09:00"),
                ("to", "2025-03-31T23:45:00-05:00"),
            ],
        )?;
        let first = Date::from_calendar_date(2025, Month::March, 1)?;
        let last = Date::from_calendar_date(2025, Month::March, 31)?;
        assert_eq!(state.date(), DateFilter::range(first, Some(last)));
        Ok(())
    }

    #[test]
    fn invalid_values_are_rejected_with_the_key_name() {
        let config = TableConfig::leads();
        let error = hydrate_filter(&config, [("page", "0")]).expect_err("page 0 is invalid");
        assert!(error.to_string().contains("page"));

        let error = hydrate_filter(&config, [("from", "01/02/2025")]).expect_err("bad date");
        assert!(error.to_string().contains("YYYY-MM-DD"));

        let error = hydrate_filter(&config, [("to", "2025-01-31")]).expect_err("to needs from");
        assert!(error.to_string().contains("without a start date"));

        let error = hydrate_filter(&config, [("dir", "asc")]).expect_err("dir needs sort");
        assert!(error.to_string().contains("without a sort column"));

        let error =
            hydrate_filter(&config, [("card", "4242")]).expect_err("leads has no card search");
        assert!(error.to_string().contains("does not support searching by card"));
    }
}
