use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use chrono::Local;

static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();

/// Initialize the log file under `log_dir`. Clears any previous run's log.
/// Lines are printed to stdout whether or not this was called.
pub fn init(log_dir: &Path) {
    fs::create_dir_all(log_dir).ok();
    let log_path = log_dir.join("app.log");
    let file = match OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path)
    {
        Ok(f) => f,
        Err(e) => {
            eprintln!("failed to open log file {}: {}", log_path.display(), e);
            return;
        }
    };

    LOG_FILE.set(Mutex::new(file)).ok();
}

fn format_line(ts: &str, level: &str, prefix: &str, msg: &str) -> String {
    if prefix.is_empty() {
        format!("[{}] [{}] {}", ts, level, msg)
    } else {
        format!("[{}] [{}] [{}] {}", ts, level, prefix, msg)
    }
}

fn write_log(level: &str, prefix: &str, msg: &str) {
    let ts = Local::now().format("%H:%M:%S").to_string();
    let line = format_line(&ts, level, prefix, msg);

    println!("{}", line);

    if let Some(file) = LOG_FILE.get() {
        if let Ok(mut f) = file.lock() {
            writeln!(f, "{}", line).ok();
        }
    }
}

pub fn info(msg: &str) {
    write_log("INFO", "", msg);
}

pub fn warn(msg: &str) {
    write_log("WARN", "", msg);
}

pub fn error(msg: &str) {
    write_log("ERROR", "", msg);
}

/// Log tagged with a subsystem prefix.
pub fn info_p(prefix: &str, msg: &str) {
    write_log("INFO", prefix, msg);
}

pub fn warn_p(prefix: &str, msg: &str) {
    write_log("WARN", prefix, msg);
}

pub fn error_p(prefix: &str, msg: &str) {
    write_log("ERROR", prefix, msg);
}
