//! Monotonic clock abstraction and the two-phase sample wait.
//!
//! Sampling deadlines are met by sleeping for most of the remaining time and
//! then spinning until the deadline. The split is computed by [`plan_wait`],
//! which is a pure function so it can be tested without a real clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source used by the sampling loop and the radio simulator.
///
/// `now` is measured from an arbitrary origin fixed when the clock is created.
pub trait Clock {
    fn now(&self) -> Duration;

    fn sleep(&self, duration: Duration);

    /// One iteration of a busy-wait.
    fn spin(&self) {
        std::hint::spin_loop();
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }

    fn spin(&self) {
        (**self).spin()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }

    fn spin(&self) {
        (**self).spin()
    }
}

/// Wall clock backed by [`Instant`] and [`std::thread::sleep`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Manually driven clock for tests and simulations.
///
/// Sleeping advances time instantly. Every `now` call also advances time by
/// `read_step` so spin loops terminate; with a zero step, each spin
/// iteration advances one microsecond instead. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
    read_step_micros: u64,
    slept_micros: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::with_read_step(Duration::from_micros(10))
    }

    pub fn with_read_step(read_step: Duration) -> Self {
        Self {
            micros: Arc::new(AtomicU64::new(0)),
            read_step_micros: read_step.as_micros() as u64,
            slept_micros: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Move time forward without sleeping.
    pub fn advance(&self, duration: Duration) {
        self.micros
            .fetch_add(duration.as_micros() as u64, Ordering::SeqCst);
    }

    /// Current time without the per-read advance.
    pub fn peek(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::SeqCst))
    }

    /// Total time spent in `sleep` since creation.
    pub fn total_slept(&self) -> Duration {
        Duration::from_micros(self.slept_micros.load(Ordering::SeqCst))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        let micros = self
            .micros
            .fetch_add(self.read_step_micros, Ordering::SeqCst);
        Duration::from_micros(micros)
    }

    fn sleep(&self, duration: Duration) {
        let micros = duration.as_micros() as u64;
        self.slept_micros.fetch_add(micros, Ordering::SeqCst);
        self.micros.fetch_add(micros, Ordering::SeqCst);
    }

    fn spin(&self) {
        // A frozen clock would never reach the deadline
        if self.read_step_micros == 0 {
            self.micros.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// How to wait for a sample deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPlan {
    /// The deadline has already passed.
    Elapsed,
    /// Too close to sleep; busy-wait until the deadline.
    Spin,
    /// Sleep for the given duration, then busy-wait until the deadline.
    SleepThenSpin(Duration),
}

/// Split the time until `deadline` into a coarse sleep and a spin.
///
/// The sleep is the remaining time floored to `granularity`, minus one
/// granularity step, so a late wake-up never overshoots the deadline.
pub fn plan_wait(deadline: Duration, now: Duration, granularity: Duration) -> WaitPlan {
    let remaining = match deadline.checked_sub(now) {
        Some(r) if !r.is_zero() => r,
        _ => return WaitPlan::Elapsed,
    };

    let step = granularity.as_nanos();
    if step == 0 {
        return WaitPlan::Spin;
    }

    let steps = remaining.as_nanos() / step;
    if steps <= 1 {
        return WaitPlan::Spin;
    }

    let sleep_nanos = (steps - 1) * step;
    WaitPlan::SleepThenSpin(Duration::from_nanos(sleep_nanos as u64))
}

/// Block until `deadline` using the two-phase wait.
pub fn wait_until<C: Clock + ?Sized>(clock: &C, deadline: Duration, granularity: Duration) {
    match plan_wait(deadline, clock.now(), granularity) {
        WaitPlan::Elapsed => return,
        WaitPlan::Spin => {}
        WaitPlan::SleepThenSpin(coarse) => clock.sleep(coarse),
    }

    while clock.now() < deadline {
        clock.spin();
    }
}
