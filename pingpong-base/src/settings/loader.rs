use std::collections::HashMap;
use std::env;

use config::{Config, Environment, File};
use eyre::{Context, Result};
use serde::de::DeserializeOwned;

/// Prefix of the environment variables read by [`load_settings_object`].
pub const ENV_PREFIX: &str = "PINGPONG";

/// Load a settings object from the files named in `CONFIG_FILES` and from
/// `PINGPONG_` prefixed environment variables.
pub fn load_settings_object<T: DeserializeOwned>() -> Result<T> {
    let config_file_paths: Vec<String> = env::var("CONFIG_FILES")
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    load_settings_from(&config_file_paths, None)
}

/// Load a settings object from explicit config files and, when given, an
/// explicit environment instead of the process environment.
pub fn load_settings_from<T: DeserializeOwned>(
    config_file_paths: &[String],
    env_source: Option<HashMap<String, String>>,
) -> Result<T> {
    let builder = config_file_paths
        .iter()
        .fold(Config::builder(), |builder, path| {
            builder.add_source(File::with_name(path))
        });

    let config_deserializer = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env_source),
        )
        .build()?;

    let settings = config_deserializer.try_deserialize::<T>();
    config_file_paths
        .iter()
        .fold(settings.context("Invalid settings"), |res, path| {
            res.with_context(|| format!("Config loaded: {path}"))
        })
}
