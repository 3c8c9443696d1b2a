// Trailing-edge throttle and debounce - deadline state machines driven by the pipeline actor
use std::time::Duration;
use tokio::time::Instant;

/// What the caller should do after offering a value.
#[derive(Debug, PartialEq)]
pub enum Offer<T> {
    /// Enough time has passed; publish this value now.
    Emit(T),
    /// The value is held until the returned deadline.
    Deferred(Instant),
}

/// Rate limiter that always eventually emits the most recent value. A
/// pending value is replaced, never queued.
#[derive(Debug)]
pub struct Throttle<T> {
    interval: Duration,
    last_emit: Option<Instant>,
    pending: Option<(T, Instant)>,
}

impl<T> Throttle<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            pending: None,
        }
    }

    pub fn offer(&mut self, value: T, now: Instant) -> Offer<T> {
        let elapsed = self
            .last_emit
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or(self.interval);

        if elapsed >= self.interval {
            self.pending = None;
            self.last_emit = Some(now);
            return Offer::Emit(value);
        }

        let deadline = now + (self.interval - elapsed);
        self.pending = Some((value, deadline));
        Offer::Deferred(deadline)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, deadline)| *deadline)
    }

    /// Release the pending value if its deadline has passed.
    pub fn poll_due(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, deadline)) if *deadline <= now => {
                self.last_emit = Some(now);
                self.pending.take().map(|(value, _)| value)
            }
            _ => None,
        }
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }
}

/// Coalesces bursts of triggers into one firing `delay` after the last.
#[derive(Debug)]
pub struct Debounce {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    pub fn new(delay: Duration) -> Self {
        Self { delay, deadline: None }
    }

    pub fn trigger(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn poll_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}
