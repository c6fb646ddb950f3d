#![allow(non_snake_case)]

use async_trait::async_trait;
use mockall::*;

use pingpong_core::*;

mock! {
    pub PingPongChain {}

    #[async_trait]
    impl PingPongChain for PingPongChain {
        async fn ping_events(&self, from_block: u64) -> ChainResult<PingEventStream>;

        async fn get_transaction(&self, hash: H256) -> ChainResult<Option<ChainTransaction>>;

        async fn get_block(&self, number: u64) -> ChainResult<Option<ChainBlock>>;

        async fn get_block_number(&self) -> ChainResult<u64>;

        async fn submit_pong(
            &self,
            ping_tx: H256,
            overrides: TxOverrides,
        ) -> ChainResult<SubmittedTx>;

        async fn wait_mined(&self, hash: H256) -> ChainResult<TxReceipt>;

        async fn transaction_receipt(&self, hash: H256) -> ChainResult<Option<TxReceipt>>;

        async fn confirmed_nonce(&self) -> ChainResult<u64>;

        async fn gas_price(&self) -> ChainResult<U256>;

        fn decode_call(&self, data: &[u8]) -> Result<DecodedCall, ChainCommunicationError>;
    }
}
