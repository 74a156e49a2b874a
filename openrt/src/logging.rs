//! Env-gated diagnostics.
//!
//! `OPENRT_TRACE=1` shows traces and errors; `OPENRT_TRACE=full` adds
//! warnings and compile phases. Critical messages are always shown.
use std::env;
use std::fmt::Arguments;
use std::io::Write;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Verbosity {
    Off,
    Basic,
    Full,
}

#[doc(hidden)]
#[derive(Clone, Copy)]
pub enum Level {
    Critical,
    Error,
    Trace,
    Warning,
    Phase,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Critical => "CRITICAL",
            Level::Error => "ERROR",
            Level::Trace => "TRACE",
            Level::Warning => "WARNING",
            Level::Phase => "PHASE",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Level::Critical => "31",
            Level::Error => "91",
            Level::Trace => "34",
            Level::Warning => "33",
            Level::Phase => "32",
        }
    }

    fn needs(self) -> Verbosity {
        match self {
            Level::Critical => Verbosity::Off,
            Level::Error | Level::Trace => Verbosity::Basic,
            Level::Warning | Level::Phase => Verbosity::Full,
        }
    }
}

static VERBOSITY: OnceLock<Verbosity> = OnceLock::new();

fn verbosity() -> Verbosity {
    *VERBOSITY.get_or_init(|| match env::var("OPENRT_TRACE") {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" => Verbosity::Basic,
            "full" => Verbosity::Full,
            _ => Verbosity::Off,
        },
        Err(_) => Verbosity::Off,
    })
}

fn clock() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        % 86_400;
    format!("{:02}:{:02}:{:02}", secs / 3_600, (secs % 3_600) / 60, secs % 60)
}

#[doc(hidden)]
pub fn emit(level: Level, args: Arguments) {
    if verbosity() < level.needs() {
        return;
    }
    let mut out = std::io::stderr().lock();
    // Diagnostics never fail the caller.
    let _ = writeln!(
        out,
        "{} [\u{001b}[{}m{}\u{001b}[0m] -- {}",
        clock(),
        level.color(),
        level.tag(),
        args
    );
}

#[macro_export]
macro_rules! warning {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Warning, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Error, format_args!($($arg)*))
    };
}

/// Compile pipeline progress; `full` only.
#[macro_export]
macro_rules! phase {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Phase, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! critical {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Critical, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Trace, format_args!($($arg)*))
    };
}
