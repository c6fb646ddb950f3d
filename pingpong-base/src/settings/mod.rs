//! Settings and configuration for the relayer agent.
//!
//! ## Precedence
//!
//! Configuration keys are derived from the sources below, later sources
//! overriding earlier ones:
//!
//! 1. A `.env` file in the working directory, loaded into the process
//!    environment before anything else is read.
//! 2. The files listed, comma separated, in the `CONFIG_FILES` environment
//!    variable. JSON, TOML and YAML are recognised by extension.
//! 3. Environment variables prefixed with `PINGPONG_`, using `__` to descend
//!    into nested sections, e.g. `PINGPONG_CHAIN__RPC_URL` sets
//!    `chain.rpc_url`.
//!
//! Durations are written in human readable form, e.g. `"24h"` or `"500ms"`.
//! A bare number is read as seconds.

pub use loader::*;
pub use trace::*;

/// Helpers for deserializing human readable durations
pub mod duration;
mod loader;
/// Tracing subscriber management
pub mod trace;

/// Settings shared by every agent.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Settings {
    /// The tracing configuration
    #[serde(default)]
    pub tracing: TracingConfig,
}
