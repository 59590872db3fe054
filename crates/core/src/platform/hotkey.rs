use std::io::{self, BufRead};

use rdev::{EventType, Key};

use crate::logger;
use crate::sleep::StopToken;

/// Start every stop source available on this platform. Each one cancels `stop`.
pub fn start_stop_listeners(stop: &StopToken) {
    start_stdin_listener(stop.clone());
    start_hotkey_listener(stop.clone());
}

fn is_stop_command(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "q" | "quit")
}

/// Watch stdin for a `q` / `quit` line. EOF leaves the loop running.
fn start_stdin_listener(stop: StopToken) {
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { return };
            if is_stop_command(&line) {
                logger::info_p("stop", "stop requested from console");
                stop.cancel();
                return;
            }
        }
    });
}

/// Held-modifier state for the Ctrl+Shift+Q stop chord.
#[derive(Debug, Default)]
struct Chord {
    ctrl: bool,
    shift: bool,
}

impl Chord {
    /// Feed one keyboard event; true when it completes the chord.
    fn feed(&mut self, ev: &EventType) -> bool {
        let (key, down) = match ev {
            EventType::KeyPress(k) => (k, true),
            EventType::KeyRelease(k) => (k, false),
            _ => return false,
        };
        match key {
            Key::ControlLeft | Key::ControlRight => self.ctrl = down,
            Key::ShiftLeft | Key::ShiftRight => self.shift = down,
            Key::KeyQ => return down && self.ctrl && self.shift,
            _ => {}
        }
        false
    }
}

/// Global Ctrl+Shift+Q. Without a grabbable keyboard only stdin stops the loop.
fn start_hotkey_listener(stop: StopToken) {
    std::thread::spawn(move || {
        let mut chord = Chord::default();
        logger::info_p("stop", "press Ctrl+Shift+Q or type q to stop");
        if let Err(e) = rdev::listen(move |ev: rdev::Event| {
            if !stop.is_cancelled() && chord.feed(&ev.event_type) {
                logger::info_p("stop", "stop requested by hotkey");
                stop.cancel();
            }
        }) {
            logger::warn_p("stop", &format!("global hotkey unavailable ({:?}); type q to stop", e));
        }
    });
}
