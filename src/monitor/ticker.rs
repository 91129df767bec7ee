use std::fmt;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::{StreamExt, StreamMap};
use tracing::debug;

/// Handle for one periodic timer created with `set_tick_interval`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TickerId(pub(crate) u64);

impl fmt::Display for TickerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ticker-{}", self.0)
    }
}

/// Active periodic timers, keyed by id
///
/// Timers registered before the event loop starts are parked and armed by
/// [`activate`](Self::activate), since tokio intervals need a running runtime.
pub(crate) struct Tickers {
    pending: Vec<(TickerId, Duration)>,
    active: StreamMap<TickerId, IntervalStream>,
    running: bool,
}

impl Default for Tickers {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            active: StreamMap::new(),
            running: false,
        }
    }
}

impl Tickers {
    pub fn insert(&mut self, id: TickerId, period: Duration) {
        debug!(%id, period_ms = period.as_millis() as u64, "ticker started");
        if self.running {
            self.active.insert(id, Self::stream(period));
        } else {
            self.pending.push((id, period));
        }
    }

    fn stream(period: Duration) -> IntervalStream {
        let mut ticks = interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        IntervalStream::new(ticks)
    }

    /// Arm parked timers; call from inside the runtime
    pub fn activate(&mut self) {
        self.running = true;
        for (id, period) in std::mem::take(&mut self.pending) {
            self.active.insert(id, Self::stream(period));
        }
    }

    /// Cancel one timer; `false` if it was not registered
    pub fn remove(&mut self, id: TickerId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|(pending, _)| *pending != id);
        let removed = self.active.remove(&id).is_some() || self.pending.len() != before;
        if removed {
            debug!(%id, "ticker stopped");
        }
        removed
    }

    /// Cancel every timer, returning how many were running
    pub fn clear(&mut self) -> usize {
        let count = self.len();
        self.pending.clear();
        self.active.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.pending.len() + self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for the next tick of any timer; never resolves while none are armed
    pub async fn next_tick(&mut self) -> TickerId {
        if self.active.is_empty() {
            return std::future::pending().await;
        }
        match self.active.next().await {
            Some((id, _)) => id,
            None => std::future::pending().await,
        }
    }
}
