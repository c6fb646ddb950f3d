use pingpong_core::{ChainBlock, ChainTransaction, Address, SubmittedTx, TxReceipt, H256, U256};

/// Hash of a ping transaction, readable in assertions.
pub fn tx_hash(n: u64) -> H256 {
    H256::from_low_u64_be(n)
}

/// A transaction calling the PingPong contract at `contract`.
pub fn contract_call(hash: H256, block: u64, contract: Address, input: &[u8]) -> ChainTransaction {
    ChainTransaction {
        hash,
        block_number: Some(block),
        to: Some(contract),
        input: input.to_vec(),
        nonce: 0,
    }
}

/// A block containing `transactions`.
pub fn block(number: u64, transactions: Vec<H256>) -> ChainBlock {
    ChainBlock::new(number, transactions)
}

/// A successful receipt for `hash`.
pub fn mined(hash: H256, block: u64) -> TxReceipt {
    TxReceipt::new(hash, true, Some(block))
}

/// A reverted receipt for `hash`.
pub fn reverted(hash: H256, block: u64) -> TxReceipt {
    TxReceipt::new(hash, false, Some(block))
}

/// The node's answer to a submission.
pub fn submitted(hash: H256, nonce: u64, gas_price: u64) -> SubmittedTx {
    SubmittedTx::new(hash, nonce, U256::from(gas_price))
}
