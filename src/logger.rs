//! Per-run log file for the editor and the batch converter.
//!
//! [`init`] opens `beadfe.log` in the user data folder, wiping the previous
//! run's output.  Before that, `log_info!`, `log_warn!` and `log_err!` drop
//! their message, so library code and unit tests can log freely.
//!
//! Where the file lives:
//!   Windows:  `%APPDATA%\BeadFE\beadfe.log`
//!   Linux:    `$XDG_DATA_HOME/BeadFE/beadfe.log`, else `~/.local/share/...`
//!   macOS:    `~/Library/Application Support/BeadFE/beadfe.log`

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Returns the path to the current session log file.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

/// Append one raw line.  Write failures are ignored.
pub fn write_line(line: &str) {
    if let Some(mutex) = LOG_FILE.get() {
        if let Ok(mut file) = mutex.lock() {
            let _ = writeln!(file, "{}", line);
        }
    }
}

/// Append `[HH:MM:SS] [LEVEL] msg`.
pub fn write(level: &str, msg: &str) {
    if LOG_FILE.get().is_none() {
        return;
    }
    write_line(&format!("[{}] [{}] {}", timestamp(), level, msg));
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write("INFO", &format!($($arg)*));
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write("WARN", &format!($($arg)*));
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write("ERROR", &format!($($arg)*));
    };
}

/// Start logging to the per-user `beadfe.log`.
pub fn init() {
    init_at(&log_file_path());
}

/// Start logging to `path`.  The first call wins; later calls are ignored.
/// Panics are recorded in the file before the previous hook runs.
pub fn init_at(path: &Path) {
    if LOG_FILE.get().is_some() {
        return;
    }
    let file = match open_fresh(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("[logger] cannot write {}: {}; continuing without a log", path.display(), e);
            return;
        }
    };
    let _ = LOG_PATH.set(path.to_path_buf());
    let _ = LOG_FILE.set(Mutex::new(file));

    write_line(&format!("=== BeadFE run at unix {} ===", unix_seconds()));
    write_line(&format!("Log file: {}", path.display()));
    write_line("");
    record_panics();
}

/// Create `path` (and its folder) empty.
fn open_fresh(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).write(true).truncate(true).open(path)
}

fn record_panics() {
    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write_line(&format!("[{}] [PANIC] {}", timestamp(), info));
        prev(info);
    }));
}

fn log_file_path() -> PathBuf {
    data_dir().join("BeadFE").join("beadfe.log")
}

/// Per-user data folder; the app folder is joined by the caller.
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

pub(crate) fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// `HH:MM:SS` within the current (UTC) day.
fn timestamp() -> String {
    let secs = unix_seconds();
    let h = (secs % 86400) / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}
