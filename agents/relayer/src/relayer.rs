use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use eyre::{ensure, Result};
use futures::future::select_all;
use pingpong_base::{load_aws_config, BaseAgent, DynamoDbStatusStore, SqsWorkQueue};
use pingpong_core::{Marker, PingPongChain, StatusStore, WorkQueue};
use pingpong_ethereum::EthereumPingPong;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, instrument, Instrument};

use crate::{
    dispatcher::{DispatchConsumer, Dispatcher},
    emitter::WorkEmitter,
    ingestor::EventIngestor,
    redirector::DeadLetterRedirector,
    scanner::{pin_scan_start, QuotaBudget, RecoveryScanner},
    settings::RelayerSettings,
};

/// The ping/pong relayer agent. Runs the enabled tasks side by side until
/// one of them fails.
pub struct Relayer {
    settings: RelayerSettings,
    chain: Arc<dyn PingPongChain>,
    store: Arc<dyn StatusStore>,
    main_queue: Arc<dyn WorkQueue>,
    dead_letters: Arc<dyn WorkQueue>,
}

impl Debug for Relayer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relayer")
            .field("settings", &self.settings)
            .field("main_queue", &self.main_queue.name())
            .field("dead_letters", &self.dead_letters.name())
            .finish()
    }
}

#[async_trait]
impl BaseAgent for Relayer {
    const AGENT_NAME: &'static str = "relayer";

    type Settings = RelayerSettings;

    async fn from_settings(settings: Self::Settings) -> Result<Self>
    where
        Self: Sized,
    {
        let sdk_config = load_aws_config().await;
        let dynamodb = aws_sdk_dynamodb::Client::new(&sdk_config);
        let sqs = aws_sdk_sqs::Client::new(&sdk_config);

        let store = DynamoDbStatusStore::new(
            dynamodb,
            settings.store.status_table.clone(),
            settings.store.marker_table.clone(),
        );
        let main_queue = SqsWorkQueue::new(sqs.clone(), settings.queue.main_queue_url.clone());
        let dead_letters = SqsWorkQueue::new(sqs, settings.queue.dead_letter_queue_url.clone());
        let chain = EthereumPingPong::connect(settings.chain.connection_conf()).await?;

        Ok(Self::new(
            settings,
            Arc::new(chain),
            Arc::new(store),
            Arc::new(main_queue),
            Arc::new(dead_letters),
        ))
    }

    async fn run(self) -> Result<()> {
        let emitter = WorkEmitter::new(
            self.store.clone(),
            self.main_queue.clone(),
            self.settings.queue.message_group_id.clone(),
        );

        let mut tasks = vec![];
        if self.settings.ingestor.enabled {
            let start_block = self.establish_live_boundary().await?;
            tasks.push(self.run_ingestor(emitter.clone(), start_block));
        }
        if self.settings.scanner.enabled {
            tasks.push(self.run_scanner(emitter));
        }
        if self.settings.dispatcher.enabled {
            tasks.push(self.run_dispatcher());
        }
        if self.settings.redirector.enabled {
            tasks.push(self.run_redirector());
        }
        ensure!(!tasks.is_empty(), "Every relayer task is disabled");

        while !tasks.is_empty() {
            let (result, _, remaining) = select_all(tasks).await;
            tasks = remaining;
            let failure = match result {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(err) => eyre::Report::new(err),
            };
            error!(error = ?failure, "Relayer task failed, shutting down");
            for task in &tasks {
                task.abort();
            }
            return Err(failure);
        }
        Ok(())
    }
}

impl Relayer {
    /// Assemble a relayer from already constructed clients.
    pub fn new(
        settings: RelayerSettings,
        chain: Arc<dyn PingPongChain>,
        store: Arc<dyn StatusStore>,
        main_queue: Arc<dyn WorkQueue>,
        dead_letters: Arc<dyn WorkQueue>,
    ) -> Self {
        Self {
            settings,
            chain,
            store,
            main_queue,
            dead_letters,
        }
    }

    /// Record the first block live ingestion covers. The recovery scan stops
    /// right below it, and its start is pinned first so no record written by
    /// live ingestion can move it.
    #[instrument(skip(self))]
    async fn establish_live_boundary(&self) -> Result<u64> {
        let scan_start = pin_scan_start(&*self.chain, &*self.store, None).await?;
        let boundary = self.chain.get_block_number().await? + 1;
        self.store
            .put_marker(Marker::InitialBlockNumber, boundary)
            .await?;
        info!(boundary, ?scan_start, "Established live ingestion boundary");
        Ok(boundary)
    }

    fn run_ingestor(&self, emitter: WorkEmitter, start_block: u64) -> JoinHandle<Result<()>> {
        let ingestor = EventIngestor::new(self.chain.clone(), emitter);
        tokio::spawn(
            async move {
                ingestor.run(start_block).await?;
                Ok(())
            }
            .instrument(info_span!("EventIngestor")),
        )
    }

    fn run_scanner(&self, emitter: WorkEmitter) -> JoinHandle<Result<()>> {
        let conf = &self.settings.scanner;
        let scanner = RecoveryScanner::new(
            self.chain.clone(),
            self.store.clone(),
            emitter,
            self.settings.chain.contract_address,
            QuotaBudget::new(
                conf.daily_credit_budget,
                conf.budget_fraction,
                conf.block_fetch_cost,
                conf.transaction_fetch_cost,
            ),
            conf.cooldown,
            conf.checkpoint_interval,
        );
        tokio::spawn(
            async move {
                let report = scanner.run().await?;
                info!(?report, "Recovery scanner finished");
                Ok(())
            }
            .instrument(info_span!("RecoveryScanner")),
        )
    }

    fn run_dispatcher(&self) -> JoinHandle<Result<()>> {
        let conf = &self.settings.dispatcher;
        let dispatcher = Dispatcher::new(
            self.chain.clone(),
            self.store.clone(),
            self.settings.mining_timeout(),
        );
        let consumer = DispatchConsumer::new(
            Arc::new(dispatcher),
            self.main_queue.clone(),
            conf.batch_size,
            conf.wait_seconds,
            conf.concurrency,
        );
        tokio::spawn(consumer.run().instrument(info_span!("Dispatcher")))
    }

    fn run_redirector(&self) -> JoinHandle<Result<()>> {
        let conf = &self.settings.redirector;
        let redirector = DeadLetterRedirector::new(
            self.dead_letters.clone(),
            self.main_queue.clone(),
            self.settings.queue.message_group_id.clone(),
            conf.interval,
            conf.batch_size,
            conf.wait_seconds,
        );
        tokio::spawn(redirector.run().instrument(info_span!("DeadLetterRedirector")))
    }
}
