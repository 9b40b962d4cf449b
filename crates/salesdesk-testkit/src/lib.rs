// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use salesdesk_app::{
    Controller, FailureKind, FetchTicket, PayloadShape, QueryService, TOTAL_KEY, TableResult,
    format_day,
};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::rc::Rc;
use time::macros::date;
use time::{Date, Duration};

const COMPANIES: [&str; 4] = ["QS", "Northwind", "Bluefin", "Harbor"];
const VENDORS: [&str; 8] = [
    "Acme Supply",
    "Summit Wholesale",
    "Greenleaf Goods",
    "Apex Distribution",
    "Heritage Imports",
    "Bright Source",
    "Central Parts",
    "Eagle Trading",
];
const BRANDS: [&str; 6] = ["Nova", "Orbit", "Lumen", "Kestrel", "Vale", "Cinder"];
const LEAD_STATUSES: [&str; 5] = ["new", "contacted", "qualified", "won", "lost"];
const LEAD_SOURCES: [&str; 5] = ["web", "referral", "phone", "event", "partner"];
const GATEWAYS: [&str; 4] = ["stripe", "adyen", "paypal", "wire"];
const EXPENSE_CATEGORIES: [&str; 6] = [
    "Travel",
    "Software",
    "Office",
    "Marketing",
    "Payroll",
    "Shipping",
];

const FIRST_NAMES: [&str; 12] = [
    "Avery", "Jordan", "Taylor", "Riley", "Morgan", "Casey", "Alex", "Quinn", "Parker", "Drew",
    "Kai", "Rowan",
];
const LAST_NAMES: [&str; 12] = [
    "Walker", "Martin", "Hill", "Evans", "Lopez", "Gray", "Ward", "Young", "Diaz", "Reed",
    "Turner", "Brooks",
];

/// Body that no payload shape accepts, even after repair.
pub const MALFORMED_BODY: &str = "<html><body>502 Bad Gateway</body></html>";

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }
}

/// Seeded generator of table rows shaped like the query service's.
#[derive(Debug, Clone)]
pub struct RowFaker {
    rng: DeterministicRng,
    next_id: u64,
}

impl RowFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            next_id: 1,
        }
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    pub fn lead(&mut self) -> Value {
        json!({
            "id": self.id(),
            "name": self.person(),
            "company": self.pick(&COMPANIES),
            "status": self.pick(&LEAD_STATUSES),
            "source": self.pick(&LEAD_SOURCES),
            "entDate": self.day(),
        })
    }

    pub fn sale(&mut self) -> Value {
        json!({
            "id": self.id(),
            "transactionId": self.transaction_id(),
            "company": self.pick(&COMPANIES),
            "vendor": self.pick(&VENDORS),
            "brand": self.pick(&BRANDS),
            "salesUser": self.person(),
            "amountCents": self.amount_cents(),
            "date": self.day(),
        })
    }

    pub fn payment(&mut self) -> Value {
        json!({
            "id": self.id(),
            "transactionId": self.transaction_id(),
            "card": format!("**** {:04}", self.rng.int_n(10_000)),
            "gateway": self.pick(&GATEWAYS),
            "customer": self.person(),
            "vendor": self.pick(&VENDORS),
            "amountCents": self.amount_cents(),
            "PaymentDate": self.day(),
        })
    }

    pub fn expense(&mut self) -> Value {
        json!({
            "id": self.id(),
            "company": self.pick(&COMPANIES),
            "category": self.pick(&EXPENSE_CATEGORIES),
            "vendor": self.pick(&VENDORS),
            "amountCents": self.amount_cents(),
            "date": self.day(),
        })
    }

    /// Rows for one of the preset tables; unknown tables get sales rows.
    pub fn rows(&mut self, table: &str, count: usize) -> Vec<Value> {
        (0..count)
            .map(|_| match table {
                "leads" => self.lead(),
                "payments" => self.payment(),
                "expenses" => self.expense(),
                _ => self.sale(),
            })
            .collect()
    }

    fn id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }

    fn person(&mut self) -> String {
        format!("{} {}", self.pick(&FIRST_NAMES), self.pick(&LAST_NAMES))
    }

    fn transaction_id(&mut self) -> String {
        format!("TX-{:08}", self.rng.int_n(100_000_000))
    }

    fn amount_cents(&mut self) -> i64 {
        100 + self.rng.int_n(500_000) as i64
    }

    fn day(&mut self) -> String {
        let offset = self.rng.int_n(365) as i64;
        format_day(fixture_date() - Duration::days(offset))
    }
}

pub fn fixture_date() -> Date {
    date!(2025 - 06 - 30)
}

/// Serializes `rows` in the given envelope. `total` goes wherever the
/// shape carries a count; a bare array has none.
pub fn payload(shape: PayloadShape, rows: &[Value], total: u64) -> String {
    let value = match shape {
        PayloadShape::BareArray => json!(rows),
        PayloadShape::DataArray => json!({ "data": rows, "totalRecords": total }),
        PayloadShape::ItemsArray => json!({ "items": rows, "totalRecords": total }),
        PayloadShape::NestedDataItems => json!({ "data": { "items": rows, "totalRecords": total } }),
        PayloadShape::InlineRow => {
            let mut row = rows.first().cloned().unwrap_or_else(|| json!({}));
            if let Value::Object(object) = &mut row {
                object.insert(TOTAL_KEY.to_owned(), json!(total));
            }
            row
        }
    };
    value.to_string()
}

/// A `data`/`totalRecords` payload written as a JavaScript object literal:
/// bare keys, single quotes, a trailing comma and an `undefined`.
pub fn js_literal_payload(ids: &[u64], total: u64) -> String {
    let rows: Vec<String> = ids
        .iter()
        .map(|id| format!("{{id: {id}, note: 'row {id}', extra: undefined,}}"))
        .collect();
    format!("{{data: [{}], totalRecords: {total},}};", rows.join(", "))
}

/// A payload delivered as a JSON string containing JSON.
pub fn double_encoded_payload(rows: &[Value], total: u64) -> String {
    Value::String(payload(PayloadShape::DataArray, rows, total)).to_string()
}

/// [`QueryService`] that records every dispatched ticket. The test decides
/// when and how each request completes.
#[derive(Debug, Default)]
pub struct ScriptedService {
    pub sent: Vec<(String, FetchTicket)>,
    pub refuse: bool,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tickets(&self) -> impl Iterator<Item = &FetchTicket> {
        self.sent.iter().map(|(_, ticket)| ticket)
    }

    pub fn last(&self) -> Option<&FetchTicket> {
        self.sent.last().map(|(_, ticket)| ticket)
    }

    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}

impl QueryService for ScriptedService {
    fn dispatch(&mut self, endpoint: &str, ticket: &FetchTicket) -> Result<()> {
        if self.refuse {
            bail!("scripted service refused {}", ticket.request_id);
        }
        self.sent.push((endpoint.to_owned(), ticket.clone()));
        Ok(())
    }
}

/// Collects everything a controller reports through its callbacks.
#[derive(Debug, Clone, Default)]
pub struct CallbackLog {
    results: Rc<RefCell<Vec<TableResult>>>,
    errors: Rc<RefCell<Vec<FailureKind>>>,
}

impl CallbackLog {
    pub fn attach<S: QueryService>(controller: &mut Controller<S>) -> Self {
        let log = Self::default();
        let results = Rc::clone(&log.results);
        controller.on_result(move |result| results.borrow_mut().push(result.clone()));
        let errors = Rc::clone(&log.errors);
        controller.on_error(move |failure| errors.borrow_mut().push(failure.clone()));
        log
    }

    pub fn results(&self) -> Vec<TableResult> {
        self.results.borrow().clone()
    }

    pub fn errors(&self) -> Vec<FailureKind> {
        self.errors.borrow().clone()
    }

    pub fn last_result(&self) -> Option<TableResult> {
        self.results.borrow().last().cloned()
    }
}
