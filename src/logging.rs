//! Structured logging for trellis
//!
//! Library code only emits `tracing` events; installing a subscriber is left
//! to the binary (or to the embedding application) through [`init`].
//!
//! # Field conventions
//!
//! - `component`: where the event comes from ("runner", "cache.disk", ...)
//! - `operation`: what was attempted ("lookup", "store", "execute")
//! - `status`: the result ("hit", "miss", "success", "error")
//! - `node`: output name of the node involved
//! - `key`: cache key (`output` or `output::item`)
//! - `size_bytes`, `entry_count`, `duration_ms`: sizes, counts and timings
//!
//! ```rust
//! use tracing::debug;
//! use trellis::logging::status;
//!
//! debug!(
//!     node = "retrieval",
//!     key = "retrieval::q1",
//!     status = status::HIT,
//!     "cache lookup"
//! );
//! ```

use std::{fmt as std_fmt, io};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{
    fmt::{self, format::Writer},
    prelude::*,
    EnvFilter,
};

/// Prints `LEVEL(trellis): fields` instead of the full module path
struct TrellisFormatter {
    with_ansi: bool,
}

impl<S, N> FormatEvent<S, N> for TrellisFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std_fmt::Result {
        let level = *event.metadata().level();

        write!(
            writer,
            "{} ",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f")
        )?;

        if self.with_ansi {
            let color = match level {
                tracing::Level::ERROR => "\x1b[31m",
                tracing::Level::WARN => "\x1b[33m",
                tracing::Level::INFO => "\x1b[32m",
                tracing::Level::DEBUG => "\x1b[34m",
                tracing::Level::TRACE => "\x1b[35m",
            };
            write!(writer, "{}{:5}(trellis)\x1b[0m: ", color, level)?;
        } else {
            write!(writer, "{:5}(trellis): ", level)?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Colored, for terminals
    Pretty,
    /// Plain text, the default under CI
    Compact,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    /// Read `TRELLIS_LOG_FORMAT`, falling back to compact under `CI`
    pub fn from_env() -> Self {
        let requested = std::env::var("TRELLIS_LOG_FORMAT").unwrap_or_default();
        Self::parse(&requested).unwrap_or_else(|| {
            if std::env::var("CI").is_ok() {
                Self::Compact
            } else {
                Self::Pretty
            }
        })
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Install the global subscriber, writing to stderr
///
/// `RUST_LOG` controls the filter (default `info`, or `default_level` when
/// given); `TRELLIS_LOG_FORMAT` picks the format.
pub fn init(default_level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.unwrap_or("info")));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match LogFormat::from_env() {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .event_format(TrellisFormatter { with_ansi: true })
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .event_format(TrellisFormatter { with_ansi: false })
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(io::stderr)
                    .json(),
            )
            .try_init(),
    };

    if let Err(e) = result {
        tracing::debug!("subscriber already installed: {}", e);
    }
}

pub mod components {
    pub const RUNNER: &str = "runner";
    pub const CACHE_DISK: &str = "cache.disk";
    pub const BATCH: &str = "batch";
}

pub mod operations {
    pub const LOOKUP: &str = "lookup";
    pub const STORE: &str = "store";
    pub const EXECUTE: &str = "execute";
    pub const LOAD: &str = "load";
    pub const DELEGATE: &str = "delegate";
}

pub mod status {
    pub const HIT: &str = "hit";
    pub const MISS: &str = "miss";
    pub const SUCCESS: &str = "success";
    pub const ERROR: &str = "error";
}
