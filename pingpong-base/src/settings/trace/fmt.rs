use serde::Deserialize;
use tracing::Subscriber;
use tracing_subscriber::{fmt, registry::LookupSpan, Layer};

/// Basic tracing configuration
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    /// Pretty print
    Pretty,
    /// JSON
    Json,
    /// Compact
    Compact,
    /// Default style
    #[serde(other)]
    #[default]
    Full,
}

impl Style {
    /// Build the stdout formatting layer for this style.
    pub fn layer<S>(self) -> Box<dyn Layer<S> + Send + Sync + 'static>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        match self {
            Style::Pretty => fmt::layer().pretty().boxed(),
            Style::Json => fmt::layer().json().boxed(),
            Style::Compact => fmt::layer().compact().boxed(),
            Style::Full => fmt::layer().boxed(),
        }
    }
}
