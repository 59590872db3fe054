use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::Result;

use snapclick_core::matcher::Clicker;
use snapclick_core::monitor::{self, Exit};
use snapclick_core::platform::{create_platform, hotkey};
use snapclick_core::settings::Settings;
use snapclick_core::sleep::{StopToken, SystemClock};
use snapclick_core::logger;

fn fail(msg: &str) -> ! {
    logger::error(msg);
    process::exit(1);
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let force_stub = args.iter().any(|a| a == "--stub");

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let settings_path = args
        .iter()
        .position(|a| a == "--settings")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(|| cwd.join("settings.json"));

    logger::init(&cwd.join("logs"));

    let settings = Settings::load_or_init(&settings_path);
    if let Err(e) = settings.validate() {
        fail(&format!("bad settings in {}: {:#}", settings_path.display(), e));
    }

    let (screen, pointer) = match create_platform(force_stub) {
        Ok(p) => p,
        Err(e) => fail(&format!("{:#}", e)),
    };
    let monitors = match screen.monitors() {
        Ok(m) => m,
        Err(e) => fail(&format!("{:#}", e)),
    };

    let clicker = Clicker::new(
        screen,
        pointer,
        settings.click_bias_y,
        Duration::from_millis(settings.move_duration_ms),
    );

    let stop = StopToken::new();
    hotkey::start_stop_listeners(&stop);
    logger::info("snapclick started");

    match monitor::run(&settings, &monitors, clicker, SystemClock, &stop) {
        Exit::InvalidMonitor => process::exit(1),
        Exit::Stopped => Ok(()),
    }
}
