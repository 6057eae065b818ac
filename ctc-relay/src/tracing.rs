//! Provide tracing, tailored to this program.
//!
//! The binary calls [`init`] once at startup to install a subscriber. The
//! rest of the crate uses `use crate::tracing::prelude::*` for the
//! `trace!()`, `debug!()`, `info!()`, `warn!()`, and `error!()` macros.
//!
//! Logs go to stderr, or to journald when running under systemd, so that
//! stdout carries nothing but command results.

use std::env;
use time::OffsetDateTime;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer, time::FormatTime},
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

/// How much the user asked to see.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbosity {
    /// Number of `-v` flags
    pub level: u8,
    /// Trace every frame sent and received
    pub frames: bool,
}

impl Verbosity {
    fn default_level(self) -> LevelFilter {
        match self.level {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    fn env_filter(self) -> EnvFilter {
        let mut filter = EnvFilter::builder()
            .with_default_directive(self.default_level().into())
            .with_env_var("RUST_LOG")
            .from_env_lossy();

        if self.frames {
            if let Ok(directive) = "ctc_relay::protocol=debug".parse() {
                filter = filter.add_directive(directive);
            }
        }
        filter
    }
}

/// Initialize logging.
///
/// If running under systemd, use journald; otherwise fall back to stderr.
pub fn init(verbosity: Verbosity) {
    if env::var("JOURNAL_STREAM").is_ok() {
        if let Ok(layer) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(verbosity.env_filter())
                .with(layer)
                .init();
        } else {
            use_stderr(verbosity);
            error!("Failed to initialize journald logging, using stderr.");
        }
    } else {
        use_stderr(verbosity);
    }
}

// Log to stderr, filtering according to RUST_LOG on top of the level chosen
// on the command line.
fn use_stderr(verbosity: Verbosity) {
    tracing_subscriber::registry()
        .with(verbosity.env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(LocalTimer),
        )
        .init();
}

// Format timestamps in local time to the millisecond; frames on the wire are
// only a few milliseconds apart.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or(OffsetDateTime::now_utc());
        let formatted = now
            .format(time::macros::format_description!(
                "[hour]:[minute]:[second].[subsecond digits:3]"
            ))
            .map_err(|_| std::fmt::Error)?;
        write!(w, "{}", formatted)
    }
}
