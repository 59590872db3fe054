use std::time::{Duration, Instant};

use crate::logger;
use crate::matcher::Locate;
use crate::settings::{Settings, TemplateConfig, Timing};
use crate::sleep::{pause, Clock, StopToken};
use crate::types::*;

/// Where the two-stage click sequence currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the cooldown since the last full success to run out.
    Throttled,
    /// Looking for the primary template.
    SeekPrimary,
    /// Primary was clicked; looking for the follow-up dialog.
    SeekDialog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    None,
    IdleTick,
    Settle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: Phase,
    pub wait: Wait,
    /// Record a completed sequence and restart the cooldown.
    pub rearm: bool,
}

/// Next phase given whether the current one succeeded.
/// For `Throttled`, success means the cooldown has elapsed.
pub fn transition(phase: Phase, ok: bool) -> Transition {
    let (next, wait, rearm) = match (phase, ok) {
        (Phase::Throttled, true) => (Phase::SeekPrimary, Wait::None, false),
        (Phase::Throttled, false) => (Phase::Throttled, Wait::IdleTick, false),
        (Phase::SeekPrimary, true) => (Phase::SeekDialog, Wait::Settle, false),
        (Phase::SeekPrimary, false) => (Phase::Throttled, Wait::IdleTick, false),
        (Phase::SeekDialog, true) => (Phase::Throttled, Wait::None, true),
        // Cooldown stays unarmed, so the primary is sought again right away.
        (Phase::SeekDialog, false) => (Phase::SeekPrimary, Wait::None, false),
    };
    Transition { next, wait, rearm }
}

/// Why `run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    InvalidMonitor,
    Stopped,
}

/// Display at `index`, if it is a real display (index 0 is the union).
pub fn select_monitor(monitors: &[MonitorInfo], index: usize) -> Option<&MonitorInfo> {
    if index == 0 {
        return None;
    }
    monitors.get(index)
}

/// Polls for the primary template, then the dialog, at most once per cooldown.
pub struct MonitorLoop<L: Locate, C: Clock> {
    locator: L,
    clock: C,
    primary: TemplateConfig,
    dialog: TemplateConfig,
    confidence: f32,
    timing: Timing,
    region: CaptureRegion,
    offset: ScreenOffset,
    phase: Phase,
    last_success: Option<Instant>,
}

impl<L: Locate, C: Clock> MonitorLoop<L, C> {
    pub fn new(locator: L, clock: C, settings: &Settings, monitor: &MonitorInfo) -> Self {
        Self {
            locator,
            clock,
            primary: settings.primary.clone(),
            dialog: settings.dialog.clone(),
            confidence: settings.confidence,
            timing: settings.timing(),
            region: monitor.region,
            offset: ScreenOffset::from(&monitor.region),
            phase: Phase::Throttled,
            last_success: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_success(&self) -> Option<Instant> {
        self.last_success
    }

    fn cooldown_elapsed(&self) -> bool {
        self.last_success
            .map_or(true, |t| self.clock.now().duration_since(t) >= self.timing.cooldown)
    }

    fn seek(&mut self, dialog: bool) -> bool {
        let which = if dialog { &self.dialog } else { &self.primary };
        self.locator.locate_and_click(
            &which.path,
            self.confidence,
            &self.region,
            self.offset,
            which.click_offset,
        )
    }

    /// Run the current phase once. Returns how long to wait before the next step.
    pub fn step(&mut self) -> Duration {
        let ok = match self.phase {
            Phase::Throttled => self.cooldown_elapsed(),
            Phase::SeekPrimary => {
                logger::info_p("monitor", "looking for the primary template");
                let ok = self.seek(false);
                if !ok {
                    logger::info_p("monitor", "primary template not found");
                }
                ok
            }
            Phase::SeekDialog => {
                logger::info_p("monitor", "looking for the dialog template");
                let ok = self.seek(true);
                if ok {
                    logger::info_p("monitor", "clicked the dialog");
                } else {
                    logger::warn_p("monitor", "dialog not found, cooldown not restarted");
                }
                ok
            }
        };

        let t = transition(self.phase, ok);
        if t.rearm {
            self.last_success = Some(self.clock.now());
        }
        self.phase = t.next;

        match t.wait {
            Wait::None => Duration::ZERO,
            Wait::IdleTick => self.timing.idle_tick,
            Wait::Settle => self.timing.settle,
        }
    }

    /// Step until `stop` fires.
    pub fn run(&mut self, stop: &StopToken) -> Exit {
        loop {
            if stop.is_cancelled() {
                logger::info_p("monitor", "stopping");
                return Exit::Stopped;
            }
            let wait = self.step();
            if !wait.is_zero() && !pause(&self.clock, wait, stop) {
                logger::info_p("monitor", "stopping");
                return Exit::Stopped;
            }
        }
    }
}

/// Validate the configured display, then poll until stopped.
pub fn run<L: Locate, C: Clock>(
    settings: &Settings,
    monitors: &[MonitorInfo],
    locator: L,
    clock: C,
    stop: &StopToken,
) -> Exit {
    let index = settings.monitor_index;
    let Some(monitor) = select_monitor(monitors, index) else {
        logger::error_p(
            "monitor",
            &format!(
                "invalid monitor index {}; only {} display(s) available",
                index,
                monitors.len().saturating_sub(1)
            ),
        );
        return Exit::InvalidMonitor;
    };
    logger::info_p(
        "monitor",
        &format!("using monitor {} ({}): {:?}", index, monitor.name, monitor.region),
    );

    MonitorLoop::new(locator, clock, settings, monitor).run(stop)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};
    use std::rc::Rc;

    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;
    use crate::sleep::FakeClock;

    #[derive(Debug, Clone, PartialEq)]
    struct Call {
        template: PathBuf,
        sub_offset: Option<Offset>,
        at: Duration,
        ok: bool,
    }

    /// Answers from queued results (false once drained) and logs each call.
    struct Scripted {
        clock: FakeClock,
        answers: VecDeque<bool>,
        fallback: Option<Box<dyn FnMut() -> bool>>,
        calls: Rc<RefCell<Vec<Call>>>,
        stop_at: Option<(Duration, StopToken)>,
    }

    impl Scripted {
        fn new(clock: &FakeClock, answers: &[bool]) -> (Self, Rc<RefCell<Vec<Call>>>) {
            let calls = Rc::new(RefCell::new(Vec::new()));
            let s = Self {
                clock: clock.clone(),
                answers: answers.iter().copied().collect(),
                fallback: None,
                calls: Rc::clone(&calls),
                stop_at: None,
            };
            (s, calls)
        }
    }

    impl Locate for Scripted {
        fn locate_and_click(
            &mut self,
            template: &Path,
            _confidence: f32,
            _region: &CaptureRegion,
            _offset: ScreenOffset,
            sub_offset: Option<Offset>,
        ) -> bool {
            let ok = match self.answers.pop_front() {
                Some(ok) => ok,
                None => self.fallback.as_mut().map_or(false, |f| f()),
            };
            self.calls.borrow_mut().push(Call {
                template: template.to_path_buf(),
                sub_offset,
                at: self.clock.elapsed(),
                ok,
            });
            if let Some((limit, stop)) = &self.stop_at {
                if self.clock.elapsed() >= *limit {
                    stop.cancel();
                }
            }
            ok
        }
    }

    fn monitors(count: usize) -> Vec<MonitorInfo> {
        let physical: Vec<MonitorInfo> = (0..count)
            .map(|i| MonitorInfo {
                name: format!("d{}", i),
                region: Region::new(1920 * i as i32, 0, 1920, 1080),
            })
            .collect();
        crate::platform::display_list(physical)
    }

    fn looper(answers: &[bool]) -> (MonitorLoop<Scripted, FakeClock>, FakeClock, Rc<RefCell<Vec<Call>>>) {
        let clock = FakeClock::new();
        let (locator, calls) = Scripted::new(&clock, answers);
        let settings = Settings::default();
        let list = monitors(2);
        let lp = MonitorLoop::new(locator, clock.clone(), &settings, &list[2]);
        (lp, clock, calls)
    }

    /// Step like `run` does, with the fake clock absorbing every wait.
    fn drive(lp: &mut MonitorLoop<Scripted, FakeClock>, clock: &FakeClock, steps: usize) {
        for _ in 0..steps {
            let wait = lp.step();
            clock.advance(wait);
        }
    }

    #[test]
    fn test_select_monitor_bounds() {
        let list = monitors(1);
        assert_eq!(list.len(), 2);
        assert!(select_monitor(&list, 0).is_none());
        assert_eq!(select_monitor(&list, 1).map(|m| m.name.as_str()), Some("d0"));
        assert!(select_monitor(&list, 2).is_none());
    }

    #[test]
    fn test_invalid_monitor_never_polls() {
        let clock = FakeClock::new();
        let (locator, calls) = Scripted::new(&clock, &[true, true]);
        let settings = Settings { monitor_index: 2, ..Settings::default() };

        let exit = run(&settings, &monitors(1), locator, clock.clone(), &StopToken::new());
        assert_eq!(exit, Exit::InvalidMonitor);
        assert!(calls.borrow().is_empty());
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_transition_table() {
        use Phase::*;
        let t = |next, wait, rearm| Transition { next, wait, rearm };
        assert_eq!(transition(Throttled, true), t(SeekPrimary, Wait::None, false));
        assert_eq!(transition(Throttled, false), t(Throttled, Wait::IdleTick, false));
        assert_eq!(transition(SeekPrimary, true), t(SeekDialog, Wait::Settle, false));
        assert_eq!(transition(SeekPrimary, false), t(Throttled, Wait::IdleTick, false));
        assert_eq!(transition(SeekDialog, true), t(Throttled, Wait::None, true));
        assert_eq!(transition(SeekDialog, false), t(SeekPrimary, Wait::None, false));
    }

    #[test]
    fn test_full_sequence_clicks_dialog_after_settle() {
        let (mut lp, clock, calls) = looper(&[true, true]);
        drive(&mut lp, &clock, 3);

        let settings = Settings::default();
        assert_eq!(
            *calls.borrow(),
            vec![
                Call {
                    template: settings.primary.path.clone(),
                    sub_offset: None,
                    at: Duration::ZERO,
                    ok: true,
                },
                Call {
                    template: settings.dialog.path.clone(),
                    sub_offset: Some(Offset::new(0, 200)),
                    at: Duration::from_secs(3),
                    ok: true,
                },
            ]
        );
        assert_eq!(lp.phase(), Phase::Throttled);
        assert_eq!(lp.last_success(), Some(clock.now()));

        // Cooling down: only idle ticks, no searches.
        drive(&mut lp, &clock, 10);
        assert_eq!(calls.borrow().len(), 2);
        assert_eq!(clock.elapsed(), Duration::from_secs(3 + 10 * 5));
    }

    #[test]
    fn test_primary_miss_goes_idle_without_dialog() {
        let (mut lp, clock, calls) = looper(&[false]);
        drive(&mut lp, &clock, 2);

        assert_eq!(calls.borrow().len(), 1);
        assert_eq!(lp.phase(), Phase::Throttled);
        assert_eq!(clock.elapsed(), Duration::from_secs(5));
        assert_eq!(lp.last_success(), None);

        // Cooldown never armed, so the next step seeks the primary again.
        assert_eq!(lp.step(), Duration::ZERO);
        assert_eq!(lp.phase(), Phase::SeekPrimary);
    }

    #[test]
    fn test_dialog_miss_retries_primary_immediately() {
        let (mut lp, clock, calls) = looper(&[true, false, true, true]);
        drive(&mut lp, &clock, 3);
        assert_eq!(lp.phase(), Phase::SeekPrimary);
        assert_eq!(lp.last_success(), None);

        drive(&mut lp, &clock, 2);
        let calls = calls.borrow();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[2].at, Duration::from_secs(3));
        assert_eq!(calls[2].sub_offset, None);
        assert_eq!(calls[3].at, Duration::from_secs(6));
        assert_eq!(lp.last_success(), Some(clock.now()));
    }

    fn completions(calls: &[Call]) -> Vec<Duration> {
        let dialog = Settings::default().dialog.path;
        calls
            .iter()
            .filter(|c| c.ok && c.template == dialog)
            .map(|c| c.at)
            .collect()
    }

    fn assert_spaced(done: &[Duration], cooldown: Duration) {
        for pair in done.windows(2) {
            assert!(pair[1] - pair[0] >= cooldown, "{:?} then {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_run_keeps_successes_an_hour_apart() {
        let clock = FakeClock::new();
        let stop = StopToken::new();
        let (mut locator, calls) = Scripted::new(&clock, &[]);
        locator.fallback = Some(Box::new(|| true));
        locator.stop_at = Some((Duration::from_secs(5 * 3600), stop.clone()));

        let exit = run(&Settings::default(), &monitors(2), locator, clock.clone(), &stop);
        assert_eq!(exit, Exit::Stopped);

        let done = completions(&calls.borrow());
        assert!(done.len() >= 5, "only {} completions", done.len());
        assert_spaced(&done, Duration::from_secs(3600));
    }

    #[test]
    fn test_throttle_holds_under_random_outcomes() {
        let clock = FakeClock::new();
        let stop = StopToken::new();
        let (mut locator, calls) = Scripted::new(&clock, &[]);
        let mut rng = StdRng::seed_from_u64(4242);
        locator.fallback = Some(Box::new(move || rng.gen_bool(0.4)));
        locator.stop_at = Some((Duration::from_secs(12 * 3600), stop.clone()));

        run(&Settings::default(), &monitors(2), locator, clock.clone(), &stop);

        let done = completions(&calls.borrow());
        assert!(done.len() >= 2);
        assert_spaced(&done, Duration::from_secs(3600));
    }

    #[test]
    fn test_stopped_loop_does_nothing() {
        let clock = FakeClock::new();
        let (locator, calls) = Scripted::new(&clock, &[true, true]);
        let stop = StopToken::new();
        stop.cancel();

        let exit = run(&Settings::default(), &monitors(2), locator, clock, &stop);
        assert_eq!(exit, Exit::Stopped);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_stop_interrupts_idle_wait() {
        let clock = FakeClock::new();
        let stop = StopToken::new();
        let (mut locator, calls) = Scripted::new(&clock, &[false]);
        locator.stop_at = Some((Duration::ZERO, stop.clone()));

        run(&Settings::default(), &monitors(2), locator, clock.clone(), &stop);
        assert_eq!(calls.borrow().len(), 1);
        assert!(clock.elapsed() < Duration::from_secs(5));
    }
}
