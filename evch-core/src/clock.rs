use time::OffsetDateTime;
use tokio::time::Instant;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall clock driven by the tokio timer.
///
/// The wall time is read once and then advanced with tokio's monotonic
/// [`Instant`], so a paused test runtime moves `now()` and pending timers in
/// lockstep.
#[derive(Debug, Clone)]
pub struct TokioClock {
    wall: OffsetDateTime,
    anchor: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::starting_at(OffsetDateTime::now_utc())
    }

    /// A clock that reads `wall` right now.
    pub fn starting_at(wall: OffsetDateTime) -> Self {
        Self {
            wall,
            anchor: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> OffsetDateTime {
        self.wall + self.anchor.elapsed()
    }
}
