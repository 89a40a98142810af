use std::{
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use parking_lot::Mutex;

use crate::{
    base::{TempoError, TempoResult},
    ctrl::hlc::ClockTimestamp,
};

/// A source of physical time, in nanoseconds since the Unix epoch.
pub trait PhysicalClock: Send + Sync {
    fn now_nanos(&self) -> i64;
}

/// The operating system's wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl PhysicalClock for SystemClock {
    fn now_nanos(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
            Err(e) => i64::try_from(e.duration().as_nanos()).map_or(i64::MIN, |n| -n),
        }
    }
}

/// A physical clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicI64>);

impl ManualClock {
    pub fn new(nanos: i64) -> Self {
        Self(Arc::new(AtomicI64::new(nanos)))
    }

    pub fn set(&self, nanos: i64) {
        self.0.store(nanos, Ordering::Release);
    }

    pub fn advance(&self, by: Duration) {
        let nanos = duration_nanos(by);
        // `fetch_update` only fails if the closure returns `None`
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_add(nanos))
            });
    }
}

impl PhysicalClock for ManualClock {
    fn now_nanos(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone)]
pub struct ClockConfig {
    /// The maximum tolerated offset between the physical clocks of two nodes. Remote timestamps
    /// further ahead than this are rejected. A zero offset disables the check.
    pub max_offset: Duration,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            max_offset: Duration::from_millis(500),
        }
    }
}

impl ClockConfig {
    #[cfg(test)]
    pub(crate) fn for_testing() -> Self {
        Self {
            max_offset: Duration::from_millis(10),
        }
    }
}

#[derive(Debug)]
struct ClockState {
    last: ClockTimestamp,
    last_physical: i64,
}

/// # Hybrid Logical Clock
///
/// Hands out strictly increasing [`ClockTimestamp`]s, which stay close to the physical time of
/// the underlying [`PhysicalClock`] while also capturing causality: after observing a remote
/// timestamp through [`Clock::update`], every following reading is greater than it.
///
/// The clock is safe to share between threads.
#[derive(Debug)]
pub struct Clock<P: PhysicalClock = SystemClock> {
    physical: P,
    config: ClockConfig,
    state: Mutex<ClockState>,
}

impl Clock<SystemClock> {
    pub fn system(config: ClockConfig) -> Self {
        Self::new(SystemClock, config)
    }
}

impl<P: PhysicalClock> Clock<P> {
    pub fn new(physical: P, config: ClockConfig) -> Self {
        Self {
            physical,
            config,
            state: Mutex::new(ClockState {
                last: ClockTimestamp::ZERO,
                last_physical: i64::MIN,
            }),
        }
    }

    #[inline]
    pub fn max_offset(&self) -> Duration {
        self.config.max_offset
    }

    /// Reads the physical clock, without touching the logical state.
    pub fn physical_now(&self) -> i64 {
        self.physical.now_nanos()
    }

    /// Returns a timestamp that is strictly greater than every timestamp previously returned by
    /// or passed to this clock. Once the clock reaches `(i64::MAX, i32::MAX)` there is nothing
    /// greater left, and every further reading returns that same value.
    pub fn now(&self) -> ClockTimestamp {
        let mut state = self.state.lock();
        let physical = self.physical.now_nanos();
        Self::observe_physical(&mut state, physical);

        let last = state.last;
        state.last = if physical > last.wall_time() {
            ClockTimestamp::new(physical, 0)
        } else if last.logical() != i32::MAX {
            ClockTimestamp::new(last.wall_time(), last.logical() + 1)
        } else if let Some(wall_time) = last.wall_time().checked_add(1) {
            ClockTimestamp::new(wall_time, 0)
        } else {
            warn!(%last, "clock exhausted the timestamp range");
            last
        };
        state.last
    }

    /// Forwards the clock to a timestamp observed from another node, so that all following
    /// readings are greater than it.
    pub fn update(&self, observed: ClockTimestamp) {
        let mut state = self.state.lock();
        if state.last.less(&observed) {
            trace!(%observed, last = %state.last, "forwarding clock");
            state.last = observed;
        }
    }

    /// Like [`Clock::update`], but first verifies that the remote wall time is not further ahead
    /// of the local physical clock than [`ClockConfig::max_offset`]. An untrustworthy remote
    /// leaves the clock untouched.
    pub fn update_and_check_max_offset(&self, observed: ClockTimestamp) -> TempoResult<()> {
        let max_offset = self.config.max_offset;
        if !max_offset.is_zero() {
            let physical_now = self.physical.now_nanos();
            let ahead = observed.wall_time().saturating_sub(physical_now);
            if ahead > duration_nanos(max_offset) {
                warn!(
                    remote_wall_time = observed.wall_time(),
                    physical_now,
                    ?max_offset,
                    "rejecting remote timestamp beyond max clock offset"
                );
                return Err(TempoError::UntrustworthyRemote {
                    remote_wall_time: observed.wall_time(),
                    physical_now,
                    max_offset,
                });
            }
        }
        self.update(observed);
        Ok(())
    }

    fn observe_physical(state: &mut ClockState, physical: i64) {
        if physical < state.last_physical {
            warn!(
                previous = state.last_physical,
                current = physical,
                jump_nanos = state.last_physical.saturating_sub(physical),
                "physical clock jumped backwards"
            );
        }
        state.last_physical = physical;
    }
}

fn duration_nanos(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}
