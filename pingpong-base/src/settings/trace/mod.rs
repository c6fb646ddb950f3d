use eyre::Result;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    prelude::*,
};

use self::fmt::Style;

/// Configure a `tracing_subscriber::fmt` Layer outputting to stdout
pub mod fmt;

/// Logging level. A "higher level" means more will be logged.
#[derive(Default, Debug, Clone, Copy, serde::Deserialize, PartialOrd, Ord, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Level {
    /// Off
    Off = 0,
    /// Error
    Error = 1,
    /// Warn
    Warn = 2,
    /// Debug
    Debug = 3,
    /// Trace
    Trace = 5,
    /// Info
    #[serde(other)]
    #[default]
    Info = 4,
}

impl From<Level> for LevelFilter {
    fn from(level: Level) -> LevelFilter {
        match level {
            Level::Off => LevelFilter::OFF,
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Debug => LevelFilter::DEBUG,
            Level::Trace => LevelFilter::TRACE,
            Level::Info => LevelFilter::INFO,
        }
    }
}

/// Configuration for the tracing subscribers used by the relayer
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct TracingConfig {
    /// Output format
    #[serde(default)]
    pub fmt: Style,
    /// Most verbose level that is logged
    #[serde(default)]
    pub level: Level,
}

impl TracingConfig {
    fn targets(&self) -> Targets {
        let mut target_layer = Targets::new().with_default(self.level);
        if self.level < Level::Trace {
            // only show these debug and trace logs at trace level
            target_layer = target_layer.with_target("hyper", Level::Info);
            target_layer = target_layer.with_target("reqwest", Level::Info);
            target_layer = target_layer.with_target("aws_config", Level::Info);
            target_layer = target_layer.with_target("aws_smithy_runtime", Level::Info);
            target_layer = target_layer.with_target("ethers_providers", Level::Info);
        }
        target_layer
    }

    /// Attempt to instantiate and register a tracing subscriber setup from
    /// settings.
    pub fn start_tracing(&self) -> Result<()> {
        let fmt_layer = self.fmt.layer();
        let err_layer = tracing_error::ErrorLayer::default();

        let subscriber = tracing_subscriber::Registry::default()
            .with(self.targets())
            .with(fmt_layer)
            .with(err_layer);

        subscriber.try_init()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn level_defaults_to_info_for_unknown_values() {
        let config: TracingConfig =
            serde_json::from_str(r#"{"fmt":"json","level":"verbose"}"#).unwrap();
        assert_eq!(config.level, Level::Info);
        assert_eq!(config.fmt, Style::Json);
    }

    #[test]
    fn noisy_crates_are_capped_below_trace() {
        let config = TracingConfig {
            fmt: Style::Full,
            level: Level::Debug,
        };
        let targets = config.targets();
        assert!(targets.would_enable("relayer", &tracing::Level::DEBUG));
        assert!(!targets.would_enable("hyper", &tracing::Level::DEBUG));

        let config = TracingConfig {
            fmt: Style::Full,
            level: Level::Trace,
        };
        assert!(config.targets().would_enable("hyper", &tracing::Level::TRACE));
    }
}
