// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use log::{debug, warn};
use std::time::{Duration, Instant};

use crate::{
    DEFAULT_DEBOUNCE, Debouncer, FailureKind, FetchGuard, FetchLifecycle, FetchTicket,
    FilterPatch, FilterState, RequestId, TableConfig, TableResult, TriggerOutcome, Verdict,
    normalize, normalize_body,
};

/// Raw response body of a finished fetch, or why there is none.
pub type FetchOutcome = std::result::Result<String, FailureKind>;

/// Sends table queries somewhere. Implementations only start the request;
/// whoever drives the controller reports the outcome through
/// [`Controller::complete`] with the ticket's request id.
pub trait QueryService {
    fn dispatch(&mut self, endpoint: &str, ticket: &FetchTicket) -> Result<()>;
}

type ResultCallback = Box<dyn FnMut(&TableResult)>;
type ErrorCallback = Box<dyn FnMut(&FailureKind)>;

/// Query orchestration for one table screen.
///
/// Search text is debounced; every other change applies immediately. All
/// queries go through a [`FetchGuard`], so one request is outstanding at a
/// time and only the newest query's rows reach `on_result`. Fetch failures
/// of the outstanding request are reported through `on_error`, even when a
/// newer query is already waiting, and are never returned.
pub struct Controller<S> {
    config: TableConfig,
    filter: FilterState,
    search: Debouncer<String>,
    guard: FetchGuard,
    result: TableResult,
    service: S,
    on_result: Option<ResultCallback>,
    on_error: Option<ErrorCallback>,
    disposed: bool,
}

impl<S: QueryService> Controller<S> {
    pub fn new(config: TableConfig, service: S) -> Self {
        Self {
            filter: config.default_filter(),
            search: Debouncer::new(DEFAULT_DEBOUNCE),
            guard: FetchGuard::new(config.name()),
            result: TableResult::empty(),
            config,
            service,
            on_result: None,
            on_error: None,
            disposed: false,
        }
    }

    pub fn with_debounce(mut self, delay: Duration) -> Self {
        self.search = Debouncer::new(delay);
        self
    }

    /// Starts from a snapshot produced elsewhere, e.g. by a deep link.
    pub fn with_initial_filter(mut self, filter: FilterState) -> Self {
        self.filter = filter;
        self
    }

    pub fn on_result(&mut self, callback: impl FnMut(&TableResult) + 'static) {
        self.on_result = Some(Box::new(callback));
    }

    pub fn on_error(&mut self, callback: impl FnMut(&FailureKind) + 'static) {
        self.on_error = Some(Box::new(callback));
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn result(&self) -> &TableResult {
        &self.result
    }

    pub fn lifecycle(&self) -> &FetchLifecycle {
        self.guard.lifecycle()
    }

    /// Search text typed but not yet applied.
    pub fn pending_search(&self) -> Option<&str> {
        self.search.pending_value().map(String::as_str)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.search.next_deadline()
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    pub const fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Requests the current snapshot.
    pub fn trigger_fetch(&mut self) -> Option<TriggerOutcome> {
        if self.disposed {
            return None;
        }
        let params = normalize(&self.filter, &self.config);
        let outcome = self.guard.trigger(params);
        if let TriggerOutcome::Issued(ticket) = &outcome {
            self.send(ticket.clone());
        }
        Some(outcome)
    }

    pub fn update_filter(&mut self, patch: FilterPatch) -> Result<()> {
        self.update_filter_at(patch, Instant::now())
    }

    pub fn update_filter_at(&mut self, patch: FilterPatch, now: Instant) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        if let FilterPatch::SearchText(text) = patch {
            self.search.schedule(text, now);
            return Ok(());
        }
        self.filter = self.filter.apply(&patch, &self.config)?;
        self.trigger_fetch();
        Ok(())
    }

    /// Restores the table defaults and fetches them right away, discarding
    /// any search text still waiting on the debounce timer.
    pub fn reset(&mut self) {
        if self.disposed {
            return;
        }
        if let Some(text) = self.search.cancel() {
            debug!("[FETCH] {} reset discards pending search {text:?}", self.config.name());
        }
        self.filter = self.filter.reset(&self.config);
        self.trigger_fetch();
    }

    pub fn poll(&mut self) -> bool {
        self.poll_at(Instant::now())
    }

    /// Applies settled search text. Returns whether the filter changed.
    pub fn poll_at(&mut self, now: Instant) -> bool {
        if self.disposed {
            return false;
        }
        let Some(text) = self.search.poll(now) else {
            return false;
        };
        if text == self.filter.search_text() {
            return false;
        }
        self.filter = self.filter.with_search_text(text);
        self.trigger_fetch();
        true
    }

    /// Reports how request `request_id` ended.
    pub fn complete(&mut self, request_id: RequestId, outcome: FetchOutcome) {
        if self.disposed {
            return;
        }
        let resolution = self.guard.resolve(request_id);
        match (resolution.verdict, outcome) {
            (Verdict::Apply, outcome) => self.apply(outcome),
            (Verdict::Superseded, Err(failure)) => self.apply(Err(failure)),
            (Verdict::Superseded, Ok(_)) => debug!(
                "[FETCH] {} dropping rows of superseded {request_id}",
                self.config.name()
            ),
            (Verdict::Stale | Verdict::Unknown, Err(failure)) => debug!(
                "[FETCH] {} ignoring failure of replaced {request_id}: {failure}",
                self.config.name()
            ),
            (Verdict::Stale | Verdict::Unknown, Ok(_)) => {}
        }
        if let Some(ticket) = resolution.follow_up {
            self.send(ticket);
        }
    }

    /// Stops all further work: the debounce timer is cancelled, late
    /// responses are ignored and the callbacks are dropped.
    pub fn dispose(&mut self) {
        self.search.cancel();
        self.guard.abandon();
        self.on_result = None;
        self.on_error = None;
        self.disposed = true;
    }

    fn send(&mut self, ticket: FetchTicket) {
        if let Err(error) = self.service.dispatch(self.config.endpoint(), &ticket) {
            warn!(
                "[FETCH] {} could not send {}: {error:#}",
                self.config.name(),
                ticket.request_id
            );
            self.complete(ticket.request_id, Err(FailureKind::Network(format!("{error:#}"))));
        }
    }

    fn apply(&mut self, outcome: FetchOutcome) {
        let failure = match outcome {
            Ok(body) => {
                let normalized = normalize_body(&body);
                self.result = normalized.result;
                normalized.shape.is_none().then_some(FailureKind::MalformedResponse)
            }
            Err(failure) => {
                warn!("[FETCH] {} fetch failed: {failure}", self.config.name());
                self.result = TableResult::empty();
                Some(failure)
            }
        };

        if let Some(callback) = self.on_result.as_mut() {
            callback(&self.result);
        }
        if let Some(failure) = failure
            && let Some(callback) = self.on_error.as_mut()
        {
            callback(&failure);
        }
    }
}
