//! Tracing initialisation for hdlforge binaries.
//!
//! The console log sink is the user-facing record; this subscriber carries
//! the diagnostic side. Console entries are mirrored to tracing at
//! [`CONSOLE_TARGET`], and a front end that already shows the console log
//! turns that mirror off so nothing is printed twice.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::log::CONSOLE_TARGET;

/// Default filter directives for `level`, with the console mirror on or off.
///
/// The mirror is kept at `info` when enabled so successes and progress lines
/// show up even when diagnostics are limited to warnings.
pub fn console_directives(level: Level, mirror_console: bool) -> String {
    let console = if mirror_console { "info" } else { "off" };
    format!("{},{CONSOLE_TARGET}={console}", level.as_str().to_ascii_lowercase())
}

/// Initialise the global tracing subscriber.
///
/// * `json` - emit newline-delimited JSON instead of human-readable lines.
///   JSON lines carry their target so the console mirror can be told apart.
/// * `level` - default verbosity when `RUST_LOG` is not set.
/// * `mirror_console` - whether console entries are also traced.
///
/// Only the first call in a process takes effect.
pub fn init_tracing(json: bool, level: Level, mirror_console: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_directives(level, mirror_console)));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}
