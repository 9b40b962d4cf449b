// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::time::{Duration, Instant};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, PartialEq, Eq)]
struct Scheduled<T> {
    value: T,
    due: Instant,
}

/// Delays one channel of input until it settles. Scheduling replaces
/// whatever was pending, so only the latest value can ever fire.
///
/// The debouncer owns no thread or timer: the event loop asks for
/// [`Debouncer::next_deadline`], sleeps until then, and calls
/// [`Debouncer::poll`].
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<Scheduled<T>>,
}

impl<T> Debouncer<T> {
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub const fn delay(&self) -> Duration {
        self.delay
    }

    pub fn schedule(&mut self, value: T, now: Instant) -> Instant {
        self.schedule_after(value, self.delay, now)
    }

    pub fn schedule_after(&mut self, value: T, delay: Duration, now: Instant) -> Instant {
        let due = now + delay;
        self.pending = Some(Scheduled { value, due });
        due
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|scheduled| scheduled.value)
    }

    /// Returns the pending value once its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        let due = self.next_deadline()?;
        if due <= now { self.cancel() } else { None }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|scheduled| scheduled.due)
    }

    pub fn pending_value(&self) -> Option<&T> {
        self.pending.as_ref().map(|scheduled| &scheduled.value)
    }

    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl<T> Default for Debouncer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

#[cfg(test)]
mod tests {
    use super::Debouncer;
    use std::time::{Duration, Instant};

    #[test]
    fn rapid_schedules_fire_once_with_last_value() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(300));

        debouncer.schedule("a", start);
        debouncer.schedule("ab", start + Duration::from_millis(40));
        debouncer.schedule("abc", start + Duration::from_millis(90));

        assert_eq!(debouncer.poll(start + Duration::from_millis(300)), None);
        assert_eq!(debouncer.poll(start + Duration::from_millis(390)), Some("abc"));
        assert_eq!(debouncer.poll(start + Duration::from_secs(5)), None);
    }

    #[test]
    fn each_schedule_restarts_the_window() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(300));

        debouncer.schedule(1, start);
        let due = debouncer.schedule(2, start + Duration::from_millis(250));
        assert_eq!(due, start + Duration::from_millis(550));
        assert_eq!(debouncer.next_deadline(), Some(due));
        assert_eq!(debouncer.poll(start + Duration::from_millis(500)), None);
        assert_eq!(debouncer.poll(due), Some(2));
    }

    #[test]
    fn cancel_drops_pending_value() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(10));
        debouncer.schedule("gone", start);

        assert_eq!(debouncer.cancel(), Some("gone"));
        assert!(!debouncer.is_pending());
        assert_eq!(debouncer.next_deadline(), None);
        assert_eq!(debouncer.poll(start + Duration::from_secs(1)), None);
    }

    #[test]
    fn explicit_delay_overrides_channel_delay() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(500));
        debouncer.schedule_after("fast", Duration::ZERO, start);
        assert_eq!(debouncer.pending_value(), Some(&"fast"));
        assert_eq!(debouncer.poll(start), Some("fast"));
    }
}
