#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

impl Level {
    fn label(self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warn => "warn",
            Level::Info => "info",
            Level::Debug => "debug",
        }
    }
}

/// Maximum level enabled by `GLUE_LOG`; `None` means logging is off.
pub fn max_level() -> Option<Level> {
    parse_level(std::env::var("GLUE_LOG").ok().as_deref())
}

fn parse_level(raw: Option<&str>) -> Option<Level> {
    let Some(raw) = raw else {
        return Some(Level::Warn);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "off" | "0" | "none" => None,
        "error" => Some(Level::Error),
        "info" | "1" => Some(Level::Info),
        "debug" | "trace" => Some(Level::Debug),
        _ => Some(Level::Warn),
    }
}

pub fn enabled(level: Level) -> bool {
    max_level().is_some_and(|max| level <= max)
}

fn emit(level: Level, message: &str) {
    if enabled(level) {
        eprintln!("[{}] {message}", level.label());
    }
}

pub fn debug(message: &str) {
    emit(Level::Debug, message);
}

pub fn info(message: &str) {
    emit(Level::Info, message);
}

pub fn warn(message: &str) {
    emit(Level::Warn, message);
}

pub fn error(message: &str) {
    emit(Level::Error, message);
}
