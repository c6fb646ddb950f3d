use async_trait::async_trait;
use eyre::Result;
use tracing::info;

use crate::settings::Settings;

/// Settings of an agent defined from configuration
pub trait LoadableFromSettings: AsRef<Settings> + Sized {
    /// Create a new instance of these settings by reading the configs and env
    /// vars.
    fn load() -> Result<Self>;
}

/// A fundamental agent which does not make any assumptions about the tools
/// which are used.
#[async_trait]
pub trait BaseAgent: Send + Sync {
    /// The agent's name
    const AGENT_NAME: &'static str;

    /// The settings object for this agent
    type Settings: LoadableFromSettings;

    /// Instantiate the agent from the standard settings object
    async fn from_settings(settings: Self::Settings) -> Result<Self>
    where
        Self: Sized;

    /// Start running this agent. Returns only when one of its tasks ends.
    async fn run(self) -> Result<()>;
}

/// Call this from `main` to fully initialize and run the agent for its entire
/// lifecycle. This assumes only a single agent is being run.
pub async fn agent_main<A: BaseAgent>() -> Result<()> {
    color_eyre::install()?;

    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            return Err(err.into());
        }
    }

    let settings = A::Settings::load()?;
    let core_settings: &Settings = settings.as_ref();
    core_settings.tracing.start_tracing()?;

    let agent = A::from_settings(settings).await?;
    info!(agent = A::AGENT_NAME, "Starting agent");

    let result = agent.run().await;
    info!(agent = A::AGENT_NAME, "Shutting down agent...");
    result
}
