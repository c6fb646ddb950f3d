use std::fmt::{Debug, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::prelude::{
    BlockNumber, Http, LocalWallet, Middleware, PendingTransaction, Provider, Signer,
    SignerMiddleware, TransactionReceipt,
};
use pingpong_core::{
    ChainBlock, ChainCommunicationError, ChainResult, ChainTransaction, DecodedCall,
    PingEventStream, PingPongChain, SubmittedTx, TxOverrides, TxReceipt, H256, U256,
};
use tracing::{debug, info, instrument};

use crate::{
    contract::{decode_ping_pong_call, PingPong},
    error::classify,
    events::poll_ping_events,
    ConnectionConf,
};

type SignedClient = SignerMiddleware<Arc<Provider<Http>>, LocalWallet>;

/// The PingPong contract on an EVM chain, reached over HTTP JSON-RPC and
/// answered from a local signing key.
pub struct EthereumPingPong {
    provider: Arc<Provider<Http>>,
    client: Arc<SignedClient>,
    contract: PingPong<SignedClient>,
    conf: ConnectionConf,
}

impl Debug for EthereumPingPong {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EthereumPingPong")
            .field("url", &self.conf.url)
            .field("contract", &self.conf.contract_address)
            .field("signer", &self.client.address())
            .finish()
    }
}

impl EthereumPingPong {
    /// Build the provider and signer described by `conf`.
    pub async fn connect(conf: ConnectionConf) -> ChainResult<Self> {
        let provider = Provider::<Http>::try_from(conf.url.as_str())
            .map_err(ChainCommunicationError::from_other)?
            .interval(conf.poll_interval);
        let provider = Arc::new(provider);

        let chain_id = match conf.chain_id {
            Some(chain_id) => chain_id,
            None => provider.get_chainid().await.map_err(classify)?.low_u64(),
        };
        let wallet = LocalWallet::from_str(&conf.signer_key)
            .map_err(ChainCommunicationError::from_other)?
            .with_chain_id(chain_id);
        let client = Arc::new(SignerMiddleware::new(provider.clone(), wallet));
        let contract = PingPong::new(conf.contract_address, client.clone());

        info!(
            chain_id,
            contract = ?conf.contract_address,
            signer = ?client.address(),
            "Connected to PingPong contract"
        );
        Ok(Self {
            provider,
            client,
            contract,
            conf,
        })
    }
}

fn to_receipt(receipt: TransactionReceipt) -> TxReceipt {
    TxReceipt::new(
        receipt.transaction_hash,
        receipt.status.map(|status| status.as_u64()) == Some(1),
        receipt.block_number.map(|number| number.as_u64()),
    )
}

#[async_trait]
impl PingPongChain for EthereumPingPong {
    async fn ping_events(&self, from_block: u64) -> ChainResult<PingEventStream> {
        Ok(poll_ping_events(
            self.provider.clone(),
            self.conf.contract_address,
            from_block,
            self.conf.event_page_size,
            self.conf.poll_interval,
        ))
    }

    async fn get_transaction(&self, hash: H256) -> ChainResult<Option<ChainTransaction>> {
        let tx = self.provider.get_transaction(hash).await.map_err(classify)?;
        Ok(tx.map(|tx| ChainTransaction {
            hash: tx.hash,
            block_number: tx.block_number.map(|number| number.as_u64()),
            to: tx.to,
            input: tx.input.to_vec(),
            nonce: tx.nonce.low_u64(),
        }))
    }

    async fn get_block(&self, number: u64) -> ChainResult<Option<ChainBlock>> {
        let block = self
            .provider
            .get_block(BlockNumber::Number(number.into()))
            .await
            .map_err(classify)?;
        Ok(block.map(|block| ChainBlock::new(number, block.transactions)))
    }

    async fn get_block_number(&self) -> ChainResult<u64> {
        let head = self.provider.get_block_number().await.map_err(classify)?;
        Ok(head.as_u64())
    }

    #[instrument(skip(self), fields(ping_tx = ?ping_tx))]
    async fn submit_pong(&self, ping_tx: H256, overrides: TxOverrides) -> ChainResult<SubmittedTx> {
        let nonce = match overrides.nonce {
            Some(nonce) => U256::from(nonce),
            None => self
                .client
                .get_transaction_count(self.client.address(), Some(BlockNumber::Pending.into()))
                .await
                .map_err(classify)?,
        };
        let mut call = self
            .contract
            .pong(ping_tx.to_fixed_bytes())
            .legacy()
            .nonce(nonce);
        if let Some(gas_price) = overrides.gas_price {
            call = call.gas_price(gas_price);
        }

        let mut tx = call.tx;
        self.client
            .fill_transaction(&mut tx, None)
            .await
            .map_err(classify)?;
        let nonce = tx
            .nonce()
            .copied()
            .ok_or(ChainCommunicationError::MissingTransactionField("nonce"))?;
        let gas_price = tx
            .gas_price()
            .ok_or(ChainCommunicationError::MissingTransactionField("gas price"))?;

        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(classify)?;
        let hash = pending.tx_hash();
        info!(?hash, %nonce, %gas_price, "Submitted pong transaction");
        Ok(SubmittedTx::new(hash, nonce.low_u64(), gas_price))
    }

    #[instrument(skip(self))]
    async fn wait_mined(&self, hash: H256) -> ChainResult<TxReceipt> {
        let receipt = PendingTransaction::new(hash, self.provider.as_ref())
            .interval(self.conf.poll_interval)
            .confirmations(1)
            .await
            .map_err(classify)?;
        match receipt {
            Some(receipt) => {
                debug!(?hash, block = ?receipt.block_number, "Transaction mined");
                Ok(to_receipt(receipt))
            }
            None => Err(ChainCommunicationError::TransactionDropped(hash)),
        }
    }

    async fn transaction_receipt(&self, hash: H256) -> ChainResult<Option<TxReceipt>> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(classify)?;
        Ok(receipt.map(to_receipt))
    }

    async fn confirmed_nonce(&self) -> ChainResult<u64> {
        let count = self
            .provider
            .get_transaction_count(self.client.address(), Some(BlockNumber::Latest.into()))
            .await
            .map_err(classify)?;
        Ok(count.low_u64())
    }

    async fn gas_price(&self) -> ChainResult<U256> {
        self.provider.get_gas_price().await.map_err(classify)
    }

    fn decode_call(&self, data: &[u8]) -> Result<DecodedCall, ChainCommunicationError> {
        decode_ping_pong_call(data)
    }
}
