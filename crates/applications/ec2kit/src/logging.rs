//! Tracing setup
//!
//! Diagnostics go to stderr; stdout is reserved for command results.
//! `RUST_LOG` overrides the directive derived from the verbosity flags.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How chatty the command is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only
    Silent,
    #[default]
    Normal,
    /// Debug output from every component
    Verbose,
}

impl Verbosity {
    /// `--silent` wins over `--verbose`
    pub fn from_flags(silent: bool, verbose: bool) -> Self {
        if silent {
            Self::Silent
        } else if verbose {
            Self::Verbose
        } else {
            Self::Normal
        }
    }

    /// Default filter directive
    pub fn directive(&self) -> &'static str {
        match self {
            Self::Silent => "error",
            Self::Normal => "ec2kit=info,ec2kit_core=info,warn",
            Self::Verbose => "debug",
        }
    }
}

/// Install the global subscriber
pub fn init_tracing(verbosity: Verbosity) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| verbosity.directive().into()))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}
