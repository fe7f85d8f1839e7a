use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Layer, Registry};

use crate::core::configuration::VerbosityConfiguration;
use crate::core::Error;

pub struct Fmt;

impl Fmt {
    /// Compact log lines on stderr, stdout is kept for command output
    pub fn layer<S>(verbosity: &VerbosityConfiguration) -> impl Layer<S>
    where
        S: for<'span> tracing_subscriber::registry::LookupSpan<'span> + tracing::Subscriber,
    {
        let filter = match verbosity {
            VerbosityConfiguration::Info => LevelFilter::INFO,
            VerbosityConfiguration::Debug => LevelFilter::DEBUG,
        };

        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .compact()
            .with_filter(filter)
    }

    pub fn install(verbosity: &VerbosityConfiguration) -> Result<(), Error> {
        let subscriber = Registry::default().with(Self::layer(verbosity));

        tracing::subscriber::set_global_default(subscriber).map_err(|e| Error::Configuration(e.to_string()))
    }
}
