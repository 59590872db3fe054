use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep; a stop request is noticed within this slice.
const SLICE: Duration = Duration::from_millis(100);

/// Source of monotonic time and blocking waits.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, d: Duration) {
        thread::sleep(d);
    }
}

/// Shared stop flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Sleep for `d` in short slices. Returns false if `stop` fired first.
pub fn pause(clock: &dyn Clock, d: Duration, stop: &StopToken) -> bool {
    let deadline = clock.now() + d;
    loop {
        if stop.is_cancelled() {
            return false;
        }
        let now = clock.now();
        if now >= deadline {
            return true;
        }
        clock.sleep((deadline - now).min(SLICE));
    }
}

/// Clock that only moves when slept on.
#[cfg(test)]
#[derive(Clone)]
pub struct FakeClock {
    start: Instant,
    elapsed: std::rc::Rc<std::cell::Cell<Duration>>,
}

#[cfg(test)]
impl FakeClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Default::default(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }

    pub fn advance(&self, d: Duration) {
        self.elapsed.set(self.elapsed.get() + d);
    }
}

#[cfg(test)]
impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed.get()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_runs_to_deadline() {
        let clock = FakeClock::new();
        assert!(pause(&clock, Duration::from_secs(5), &StopToken::new()));
        assert_eq!(clock.elapsed(), Duration::from_secs(5));
    }

    #[test]
    fn test_pause_stops_early() {
        let clock = FakeClock::new();
        let stop = StopToken::new();
        stop.clone().cancel();
        assert!(!pause(&clock, Duration::from_secs(5), &stop));
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_system_pause_is_sliced() {
        let stop = StopToken::new();
        let remote = stop.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });
        let started = Instant::now();
        assert!(!pause(&SystemClock, Duration::from_secs(30), &stop));
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }
}
