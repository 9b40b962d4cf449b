// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use log::debug;
use std::mem;

use crate::{RequestId, RequestParameters};

/// A request the guard has decided to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub request_id: RequestId,
    pub params: RequestParameters,
}

/// Where a table's fetching stands. Each variant is one valid combination
/// of "request outstanding" and "newer query waiting".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FetchLifecycle {
    #[default]
    Idle,
    InFlight(FetchTicket),
    Superseded {
        active: FetchTicket,
        next: RequestParameters,
    },
}

impl FetchLifecycle {
    pub fn active(&self) -> Option<&FetchTicket> {
        match self {
            Self::Idle => None,
            Self::InFlight(active) | Self::Superseded { active, .. } => Some(active),
        }
    }

    pub fn pending(&self) -> Option<&RequestParameters> {
        match self {
            Self::Superseded { next, .. } => Some(next),
            Self::Idle | Self::InFlight(_) => None,
        }
    }

    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Nothing was outstanding; send this now.
    Issued(FetchTicket),
    /// A different query is outstanding; these params wait as the pending
    /// snapshot, replacing any earlier one.
    Coalesced,
    /// Identical to the outstanding query; nothing to do.
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The response belongs to the latest query and may be shown.
    Apply,
    /// The outstanding request, but a newer query is waiting. Its rows are
    /// not shown; a failure still is.
    Superseded,
    /// Already replaced by a later request or abandoned.
    Stale,
    /// Not an outstanding request of this guard.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub verdict: Verdict,
    /// Pending snapshot promoted to a fresh request, to be sent now.
    pub follow_up: Option<FetchTicket>,
}

/// Single-flight gate for one table: at most one outstanding request,
/// later queries collapse into one pending snapshot, and only the response
/// to the most recently issued request is ever applied.
#[derive(Debug, Clone)]
pub struct FetchGuard {
    label: String,
    lifecycle: FetchLifecycle,
    last_issued: Option<RequestId>,
    next_id: RequestId,
}

impl FetchGuard {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            lifecycle: FetchLifecycle::Idle,
            last_issued: None,
            next_id: RequestId::new(1),
        }
    }

    pub fn lifecycle(&self) -> &FetchLifecycle {
        &self.lifecycle
    }

    pub const fn last_issued(&self) -> Option<RequestId> {
        self.last_issued
    }

    pub fn trigger(&mut self, params: RequestParameters) -> TriggerOutcome {
        match mem::take(&mut self.lifecycle) {
            FetchLifecycle::Idle => {
                let ticket = self.issue(params);
                self.lifecycle = FetchLifecycle::InFlight(ticket.clone());
                TriggerOutcome::Issued(ticket)
            }
            FetchLifecycle::InFlight(active) | FetchLifecycle::Superseded { active, .. }
                if active.params == params =>
            {
                debug!(
                    "[FETCH] {} {} already in flight with identical params",
                    self.label, active.request_id
                );
                self.lifecycle = FetchLifecycle::InFlight(active);
                TriggerOutcome::Duplicate
            }
            FetchLifecycle::InFlight(active) | FetchLifecycle::Superseded { active, .. } => {
                debug!(
                    "[FETCH] {} {} in flight; holding newer query as pending",
                    self.label, active.request_id
                );
                self.lifecycle = FetchLifecycle::Superseded {
                    active,
                    next: params,
                };
                TriggerOutcome::Coalesced
            }
        }
    }

    /// Records that `request_id` finished, successfully or not.
    pub fn resolve(&mut self, request_id: RequestId) -> Resolution {
        let is_active = self
            .lifecycle
            .active()
            .is_some_and(|active| active.request_id == request_id);
        if !is_active {
            let verdict = if self.last_issued.is_some_and(|last| request_id <= last) {
                Verdict::Stale
            } else {
                Verdict::Unknown
            };
            debug!(
                "[FETCH] {} dropping resolution of {} ({verdict:?})",
                self.label, request_id
            );
            return Resolution {
                verdict,
                follow_up: None,
            };
        }

        match mem::take(&mut self.lifecycle) {
            FetchLifecycle::Superseded { next, .. } => {
                debug!(
                    "[FETCH] {} {} resolved with a newer query pending",
                    self.label, request_id
                );
                let ticket = self.issue(next);
                self.lifecycle = FetchLifecycle::InFlight(ticket.clone());
                Resolution {
                    verdict: Verdict::Superseded,
                    follow_up: Some(ticket),
                }
            }
            _ => {
                let verdict = if self.last_issued == Some(request_id) {
                    Verdict::Apply
                } else {
                    Verdict::Stale
                };
                debug!("[FETCH] {} {} resolved ({verdict:?})", self.label, request_id);
                Resolution {
                    verdict,
                    follow_up: None,
                }
            }
        }
    }

    /// Forgets the outstanding request and any pending snapshot. A later
    /// resolution of the forgotten request is reported as stale.
    pub fn abandon(&mut self) {
        if let Some(active) = self.lifecycle.active() {
            debug!("[FETCH] {} abandoning {}", self.label, active.request_id);
        }
        self.lifecycle = FetchLifecycle::Idle;
    }

    fn issue(&mut self, params: RequestParameters) -> FetchTicket {
        let request_id = self.next_id;
        self.next_id = request_id.next();
        self.last_issued = Some(request_id);
        debug!(
            "[FETCH] {} issuing {} (page {})",
            self.label, request_id, params.page
        );
        FetchTicket { request_id, params }
    }
}
