use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($arg:tt)+) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($arg)+)
    }};
}

/// Per-send events: one per attempt against the transport.
#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($arg:tt)+) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($arg)+)
    };

    ($($arg:tt)+) => {
        $crate::outgoing!(level = TRACE, $($arg)+)
    };
}

/// Engine lifecycle events: run start/stop, worker spawn, configuration.
#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($arg:tt)+) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($arg)+)
    };

    ($($arg:tt)+) => {
        $crate::internal!(level = TRACE, $($arg)+)
    };
}

/// Output format of the log subscriber, chosen by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Compact,
    Json,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {other}")),
        }
    }
}

fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    }
}

fn parse_level(raw: Option<&str>) -> LevelFilter {
    let default = default_level();
    raw.map_or(default, |level| {
        LevelFilter::from_str(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

fn parse_format(raw: Option<&str>) -> Format {
    raw.map_or(Format::Compact, |format| {
        Format::from_str(format).unwrap_or_else(|e| {
            eprintln!("Invalid log format specified ({e}), defaulting to compact");
            Format::Compact
        })
    })
}

/// Install the global subscriber.
///
/// Reads `LOG_LEVEL` and `LOG_FORMAT` from the environment and only lets
/// through events emitted by herald crates. Events go to stderr, leaving
/// stdout to reports.
pub fn init() {
    let level = parse_level(std::env::var("LOG_LEVEL").ok().as_deref());
    let format = parse_format(std::env::var("LOG_FORMAT").ok().as_deref());
    let only_herald = || FilterFn::new(|metadata| metadata.target().starts_with("herald"));

    let layer: Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync> = match format {
        Format::Compact => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_ansi(true)
            .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
            .with_filter(level)
            .with_filter(only_herald())
            .boxed(),
        Format::Json => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
            .with_filter(level)
            .with_filter(only_herald())
            .boxed(),
    };

    tracing_subscriber::Registry::default().with(layer).init();
}
