use crate::severity::LogSeverity;
use crate::systime::now;
use once_cell::sync::OnceCell;

static MIN_SEVERITY: OnceCell<LogSeverity> = OnceCell::new();

/// Sets the process-wide threshold. Only the first call takes effect;
/// returns false if a threshold was already set.
pub fn set_min_severity(severity: LogSeverity) -> bool {
    MIN_SEVERITY.set(severity).is_ok()
}

pub fn enabled(severity: LogSeverity) -> bool {
    severity >= *MIN_SEVERITY.get().unwrap_or(&LogSeverity::Info)
}

pub fn log(msg: String, log_severity: LogSeverity) {
    if !enabled(log_severity) {
        return;
    }
    if log_severity >= LogSeverity::Warning {
        eprintln!("[{}] {} {}", log_severity, now(), msg);
    } else {
        println!("[{}] {} {}", log_severity, now(), msg);
    }
}
