//! Relayer configuration
//!
//! See [`pingpong_base::settings`] for where values are read from. Every
//! section except `chain` and `queue` has working defaults.

use std::fmt::{Debug, Formatter};
use std::time::Duration;

use derive_more::{AsRef, Deref};
use eyre::{ensure, Result};
use pingpong_base::{
    settings::{duration, load_settings_object, Settings},
    LoadableFromSettings,
};
use pingpong_core::Address;
use pingpong_ethereum::ConnectionConf;
use serde::Deserialize;

/// SQS refuses to return more than this many messages per receive.
const MAX_RECEIVE_BATCH: i32 = 10;
/// SQS caps long polling at this many seconds.
const MAX_WAIT_SECONDS: i32 = 20;

/// Settings for `Relayer`
#[derive(Debug, AsRef, Deref, Deserialize)]
pub struct RelayerSettings {
    #[as_ref]
    #[deref]
    #[serde(flatten)]
    base: Settings,

    /// Chain and contract connection
    pub chain: ChainSettings,
    /// Work queue and its dead-letter sibling
    pub queue: QueueSettings,
    /// Status store tables
    #[serde(default)]
    pub store: StoreSettings,
    /// Live event ingestion
    #[serde(default)]
    pub ingestor: IngestorSettings,
    /// Recovery scan
    #[serde(default)]
    pub scanner: ScannerSettings,
    /// Queue consumer
    #[serde(default)]
    pub dispatcher: DispatcherSettings,
    /// Dead-letter redirection
    #[serde(default)]
    pub redirector: RedirectorSettings,
}

/// Chain and contract connection
#[derive(Clone, Deserialize)]
pub struct ChainSettings {
    /// HTTP JSON-RPC endpoint
    pub rpc_url: String,
    /// Hex encoded private key of the relayer account
    pub signer_key: String,
    /// Address of the PingPong contract
    pub contract_address: Address,
    /// Chain id, fetched from the node when absent
    #[serde(default)]
    pub chain_id: Option<u64>,
    /// Interval between log and receipt polls
    #[serde(default = "default_poll_interval", deserialize_with = "duration::deserialize")]
    pub poll_interval: Duration,
    /// Blocks per `eth_getLogs` request
    #[serde(default = "default_event_page_size")]
    pub event_page_size: u64,
}

impl Debug for ChainSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainSettings")
            .field("rpc_url", &self.rpc_url)
            .field("signer_key", &"<redacted>")
            .field("contract_address", &self.contract_address)
            .field("chain_id", &self.chain_id)
            .field("poll_interval", &self.poll_interval)
            .field("event_page_size", &self.event_page_size)
            .finish()
    }
}

impl ChainSettings {
    /// Connection parameters for the ethers adapter.
    pub fn connection_conf(&self) -> ConnectionConf {
        ConnectionConf::new(
            self.rpc_url.clone(),
            self.signer_key.clone(),
            self.contract_address,
            self.chain_id,
            self.poll_interval,
            self.event_page_size,
        )
    }
}

/// Work queue and its dead-letter sibling
#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    /// URL of the main queue
    pub main_queue_url: String,
    /// URL of the dead-letter queue
    pub dead_letter_queue_url: String,
    /// Message group every work item is published in
    #[serde(default = "default_message_group_id")]
    pub message_group_id: String,
    /// Visibility timeout configured on the main queue
    #[serde(default = "default_visibility_timeout", deserialize_with = "duration::deserialize")]
    pub visibility_timeout: Duration,
}

/// Status store tables
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    /// Table holding one record per ping
    #[serde(default = "default_status_table")]
    pub status_table: String,
    /// Table holding the singleton markers
    #[serde(default = "default_marker_table")]
    pub marker_table: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            status_table: default_status_table(),
            marker_table: default_marker_table(),
        }
    }
}

/// Live event ingestion
#[derive(Debug, Clone, Deserialize)]
pub struct IngestorSettings {
    /// Run the ingestor in this process
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for IngestorSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Recovery scan
#[derive(Debug, Clone, Deserialize)]
pub struct ScannerSettings {
    /// Run the scanner in this process
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// RPC credits the provider grants per day
    #[serde(default = "default_daily_credit_budget")]
    pub daily_credit_budget: u64,
    /// Share of the daily credits the scanner may use
    #[serde(default = "default_budget_fraction")]
    pub budget_fraction: f64,
    /// Credits charged for one block fetch
    #[serde(default = "default_fetch_cost")]
    pub block_fetch_cost: u64,
    /// Credits charged for one transaction fetch
    #[serde(default = "default_fetch_cost")]
    pub transaction_fetch_cost: u64,
    /// Pause after the provider reports the quota as exhausted
    #[serde(default = "default_cooldown", deserialize_with = "duration::deserialize")]
    pub cooldown: Duration,
    /// Persist progress every this many blocks
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_credit_budget: default_daily_credit_budget(),
            budget_fraction: default_budget_fraction(),
            block_fetch_cost: default_fetch_cost(),
            transaction_fetch_cost: default_fetch_cost(),
            cooldown: default_cooldown(),
            checkpoint_interval: default_checkpoint_interval(),
        }
    }
}

/// Queue consumer
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherSettings {
    /// Run the dispatcher in this process
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Messages per receive
    #[serde(default = "default_dispatch_batch_size")]
    pub batch_size: i32,
    /// Long poll duration in seconds
    #[serde(default = "default_dispatch_wait_seconds")]
    pub wait_seconds: i32,
    /// Work items processed at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Subtracted from the visibility timeout to bound the mining wait
    #[serde(default = "default_mining_timeout_margin", deserialize_with = "duration::deserialize")]
    pub mining_timeout_margin: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: default_dispatch_batch_size(),
            wait_seconds: default_dispatch_wait_seconds(),
            concurrency: default_concurrency(),
            mining_timeout_margin: default_mining_timeout_margin(),
        }
    }
}

/// Dead-letter redirection
#[derive(Debug, Clone, Deserialize)]
pub struct RedirectorSettings {
    /// Run the redirector in this process
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Time between drains of the dead-letter queue
    #[serde(default = "default_redirect_interval", deserialize_with = "duration::deserialize")]
    pub interval: Duration,
    /// Messages per receive
    #[serde(default = "default_redirect_batch_size")]
    pub batch_size: i32,
    /// Long poll duration in seconds
    #[serde(default = "default_redirect_wait_seconds")]
    pub wait_seconds: i32,
}

impl Default for RedirectorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: default_redirect_interval(),
            batch_size: default_redirect_batch_size(),
            wait_seconds: default_redirect_wait_seconds(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_poll_interval() -> Duration {
    Duration::from_secs(4)
}
fn default_event_page_size() -> u64 {
    1_000
}
fn default_message_group_id() -> String {
    "PingMessages".to_owned()
}
fn default_visibility_timeout() -> Duration {
    Duration::from_secs(300)
}
fn default_status_table() -> String {
    "txStatus".to_owned()
}
fn default_marker_table() -> String {
    "Block".to_owned()
}
// Infura's free tier
fn default_daily_credit_budget() -> u64 {
    6_000_000
}
fn default_budget_fraction() -> f64 {
    0.8
}
fn default_fetch_cost() -> u64 {
    80
}
fn default_cooldown() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}
fn default_checkpoint_interval() -> u64 {
    100
}
fn default_dispatch_batch_size() -> i32 {
    10
}
fn default_dispatch_wait_seconds() -> i32 {
    20
}
fn default_concurrency() -> usize {
    1
}
fn default_mining_timeout_margin() -> Duration {
    Duration::from_secs(30)
}
fn default_redirect_interval() -> Duration {
    Duration::from_secs(60)
}
fn default_redirect_batch_size() -> i32 {
    10
}
fn default_redirect_wait_seconds() -> i32 {
    2
}

impl RelayerSettings {
    /// Reject values the relayer cannot run with.
    pub fn validate(&self) -> Result<()> {
        let scanner = &self.scanner;
        ensure!(
            scanner.budget_fraction > 0.0 && scanner.budget_fraction <= 1.0,
            "scanner.budget_fraction must be in (0, 1], got {}",
            scanner.budget_fraction
        );
        ensure!(
            scanner.daily_credit_budget > 0,
            "scanner.daily_credit_budget must be positive"
        );
        ensure!(
            scanner.block_fetch_cost > 0 && scanner.transaction_fetch_cost > 0,
            "scanner fetch costs must be positive"
        );
        ensure!(
            scanner.checkpoint_interval > 0,
            "scanner.checkpoint_interval must be positive"
        );

        for (name, batch_size, wait_seconds) in [
            (
                "dispatcher",
                self.dispatcher.batch_size,
                self.dispatcher.wait_seconds,
            ),
            (
                "redirector",
                self.redirector.batch_size,
                self.redirector.wait_seconds,
            ),
        ] {
            ensure!(
                (1..=MAX_RECEIVE_BATCH).contains(&batch_size),
                "{name}.batch_size must be between 1 and {MAX_RECEIVE_BATCH}, got {batch_size}"
            );
            ensure!(
                (0..=MAX_WAIT_SECONDS).contains(&wait_seconds),
                "{name}.wait_seconds must be between 0 and {MAX_WAIT_SECONDS}, got {wait_seconds}"
            );
        }
        ensure!(
            self.dispatcher.concurrency > 0,
            "dispatcher.concurrency must be positive"
        );
        ensure!(
            self.queue.visibility_timeout > self.dispatcher.mining_timeout_margin,
            "queue.visibility_timeout must exceed dispatcher.mining_timeout_margin"
        );
        Ok(())
    }

    /// How long the dispatcher waits for a response to be mined before
    /// leaving the message to be redelivered.
    pub fn mining_timeout(&self) -> Duration {
        self.queue
            .visibility_timeout
            .saturating_sub(self.dispatcher.mining_timeout_margin)
    }
}

impl LoadableFromSettings for RelayerSettings {
    fn load() -> Result<Self> {
        let settings: RelayerSettings = load_settings_object()?;
        settings.validate()?;
        Ok(settings)
    }
}
