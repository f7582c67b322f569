//! Tracing configuration and initialization.

use std::io::IsTerminal as _;

use tracing_subscriber::{
    EnvFilter,
    fmt::format::FmtSpan,
    util::{SubscriberInitExt as _, TryInitError},
};

/// Output style of the subscriber.
enum TrcMode {
    /// Plain, verbose logging with span close events. Chosen when the user set a filter.
    Ugly,
    /// Compact, timeless output at `info`.
    Pretty,
}

pub struct Trc {
    mode: TrcMode,
    env_filter: EnvFilter,
}

impl Default for Trc {
    fn default() -> Self {
        let maybe_env_filter =
            EnvFilter::try_from_env("MACHE_LOG").or_else(|_| EnvFilter::try_from_default_env());

        match maybe_env_filter {
            // An explicit filter means someone is debugging; give them everything plainly.
            Ok(env_filter) => Self {
                mode: TrcMode::Ugly,
                env_filter,
            },
            Err(_) => Self {
                mode: TrcMode::Pretty,
                env_filter: EnvFilter::new("info"),
            },
        }
    }
}

/// Color unless `NO_COLOR` is set or stderr is not a terminal. `FORCE_COLOR` wins over both.
fn should_use_color() -> bool {
    let set = |var: &str| std::env::var_os(var).is_some_and(|v| !v.is_empty());
    set("FORCE_COLOR") || (std::io::stderr().is_terminal() && !set("NO_COLOR"))
}

impl Trc {
    pub fn init(self) -> Result<(), TryInitError> {
        let ansi = should_use_color();
        match self.mode {
            TrcMode::Ugly => tracing_subscriber::fmt()
                .with_env_filter(self.env_filter)
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(std::io::stderr)
                .with_ansi(ansi)
                .finish()
                .try_init(),
            TrcMode::Pretty => tracing_subscriber::fmt()
                .with_env_filter(self.env_filter)
                .with_writer(std::io::stderr)
                .with_ansi(ansi)
                .with_target(false)
                .without_time()
                .compact()
                .finish()
                .try_init(),
        }
    }
}
