// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use log::{debug, warn};
use serde::Serialize;
use serde_json::{Map, Value};

pub const TOTAL_KEY: &str = "totalRecords";

pub type Row = Value;

/// Rows of the current page plus the server's count across all pages.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TableResult {
    pub records: Vec<Row>,
    pub total_count: u64,
}

impl TableResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn page_count(&self, page_size: u32) -> u64 {
        if page_size == 0 {
            return 0;
        }
        self.total_count.div_ceil(u64::from(page_size))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PayloadShape {
    BareArray,
    DataArray,
    ItemsArray,
    NestedDataItems,
    InlineRow,
}

impl PayloadShape {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BareArray => "bare array",
            Self::DataArray => "data array",
            Self::ItemsArray => "items array",
            Self::NestedDataItems => "data.items",
            Self::InlineRow => "inline row",
        }
    }
}

type ShapeMatcher = fn(&Value) -> Option<TableResult>;

/// Payload shapes the query service is known to return, tried in order.
/// New shapes go here rather than into `normalize_value`.
pub const SHAPE_MATCHERS: [(PayloadShape, ShapeMatcher); 5] = [
    (PayloadShape::BareArray, match_bare_array),
    (PayloadShape::DataArray, match_data_array),
    (PayloadShape::ItemsArray, match_items_array),
    (PayloadShape::NestedDataItems, match_nested_data_items),
    (PayloadShape::InlineRow, match_inline_row),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub result: TableResult,
    /// `None` when nothing matched and `result` is the empty fallback.
    pub shape: Option<PayloadShape>,
    pub repaired: bool,
}

impl Normalized {
    fn unmatched() -> Self {
        Self {
            result: TableResult::empty(),
            shape: None,
            repaired: false,
        }
    }

    pub const fn is_malformed(&self) -> bool {
        self.shape.is_none()
    }
}

pub fn normalize_value(value: &Value) -> Normalized {
    for (shape, matcher) in SHAPE_MATCHERS {
        if let Some(result) = matcher(value) {
            return Normalized {
                result,
                shape: Some(shape),
                repaired: false,
            };
        }
    }
    Normalized::unmatched()
}

/// Normalizes a raw response body. Bodies that are not valid JSON, or
/// that are a JSON string wrapping the real payload, go through
/// [`repair_json_like`] first. Never fails: unrecognized input yields an
/// empty result with `shape: None`.
pub fn normalize_body(body: &str) -> Normalized {
    let (value, repaired) = match serde_json::from_str::<Value>(body) {
        Ok(Value::String(inner)) => match serde_json::from_str::<Value>(&inner) {
            Ok(value) => (Some(value), true),
            Err(_) => (repair_json_like(&inner), true),
        },
        Ok(value) => (Some(value), false),
        Err(_) => (repair_json_like(body), true),
    };

    let Some(value) = value else {
        warn!(
            "[RESPONSE] body is not JSON and could not be repaired ({} bytes)",
            body.len()
        );
        return Normalized::unmatched();
    };

    let mut normalized = normalize_value(&value);
    normalized.repaired = repaired;
    match normalized.shape {
        Some(shape) if repaired => debug!("[RESPONSE] repaired payload matched {}", shape.as_str()),
        Some(_) => {}
        None => warn!("[RESPONSE] payload matched no known shape; showing no rows"),
    }
    normalized
}

/// Best-effort conversion of a JavaScript-ish object literal into JSON:
/// single-quoted strings, bare keys, trailing commas, `undefined`, a BOM
/// and a trailing semicolon are all tolerated.
pub fn repair_json_like(raw: &str) -> Option<Value> {
    let trimmed = raw
        .trim()
        .trim_start_matches('\u{feff}')
        .trim_end_matches(';')
        .trim();
    if trimmed.is_empty() {
        return None;
    }

    let chars: Vec<char> = trimmed.chars().collect();
    let mut out = String::with_capacity(trimmed.len() + 16);
    let mut index = 0;

    while index < chars.len() {
        let ch = chars[index];

        if ch == '"' || ch == '\'' {
            index = copy_string_literal(&chars, index, &mut out);
            continue;
        }

        if ch == ',' {
            let next = chars[index + 1..].iter().find(|c| !c.is_whitespace());
            if !matches!(next, Some('}') | Some(']')) {
                out.push(',');
            }
            index += 1;
            continue;
        }

        if ch.is_ascii_alphabetic() || ch == '_' || ch == '$' {
            let start = index;
            while index < chars.len()
                && (chars[index].is_ascii_alphanumeric() || chars[index] == '_' || chars[index] == '$')
            {
                index += 1;
            }
            let word: String = chars[start..index].iter().collect();
            let next = chars[index..].iter().find(|c| !c.is_whitespace());
            if next == Some(&':') {
                out.push('"');
                out.push_str(&word);
                out.push('"');
            } else {
                out.push_str(match word.as_str() {
                    "undefined" | "None" | "NaN" => "null",
                    "True" => "true",
                    "False" => "false",
                    other => other,
                });
            }
            continue;
        }

        out.push(ch);
        index += 1;
    }

    serde_json::from_str(&out).ok()
}

fn copy_string_literal(chars: &[char], start: usize, out: &mut String) -> usize {
    let quote = chars[start];
    let mut index = start + 1;
    out.push('"');
    while index < chars.len() && chars[index] != quote {
        let ch = chars[index];
        if ch == '\\' && index + 1 < chars.len() {
            let escaped = chars[index + 1];
            if escaped == '\'' {
                out.push('\'');
            } else {
                out.push(ch);
                out.push(escaped);
            }
            index += 2;
            continue;
        }
        if ch == '"' {
            out.push_str("\\\"");
        } else {
            out.push(ch);
        }
        index += 1;
    }
    out.push('"');
    index + 1
}

fn match_bare_array(value: &Value) -> Option<TableResult> {
    let rows = value.as_array()?;
    Some(TableResult {
        records: rows.clone(),
        total_count: rows.len() as u64,
    })
}

fn match_data_array(value: &Value) -> Option<TableResult> {
    let object = value.as_object()?;
    let rows = object.get("data")?.as_array()?;
    Some(rows_with_total(rows, object))
}

fn match_items_array(value: &Value) -> Option<TableResult> {
    let object = value.as_object()?;
    let rows = object.get("items")?.as_array()?;
    Some(rows_with_total(rows, object))
}

fn match_nested_data_items(value: &Value) -> Option<TableResult> {
    let inner = value.as_object()?.get("data")?.as_object()?;
    let rows = inner.get("items")?.as_array()?;
    Some(rows_with_total(rows, inner))
}

fn match_inline_row(value: &Value) -> Option<TableResult> {
    let object = value.as_object()?;
    let broken_envelope = ["data", "items"]
        .iter()
        .any(|key| object.get(*key).is_some_and(|field| !field.is_array()));
    if broken_envelope {
        return None;
    }
    let total_count = explicit_total(object)?;
    Some(TableResult {
        records: vec![value.clone()],
        total_count,
    })
}

/// The server's count wins over the page length whenever it is present.
fn rows_with_total(rows: &[Value], holder: &Map<String, Value>) -> TableResult {
    TableResult {
        records: rows.to_vec(),
        total_count: explicit_total(holder).unwrap_or(rows.len() as u64),
    }
}

fn explicit_total(holder: &Map<String, Value>) -> Option<u64> {
    match holder.get(TOTAL_KEY)? {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|value| value.is_finite() && *value >= 0.0 && value.fract() == 0.0)
                .map(|value| value as u64)
        }),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
}
