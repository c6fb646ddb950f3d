use pingpong_core::U256;
use tracing::debug;

const ESCALATION_MULTIPLIER: u32 = 2;

/// Gas price for replacing a stuck response: the larger of twice the old
/// price and the current estimate.
pub fn escalate_gas_price(old_gas_price: U256, estimated_gas_price: U256) -> U256 {
    let escalated = old_gas_price.saturating_mul(U256::from(ESCALATION_MULTIPLIER));
    let gas_price = escalated.max(estimated_gas_price);
    debug!(
        ?old_gas_price,
        ?estimated_gas_price,
        ?gas_price,
        "Escalation attempt outcome"
    );
    gas_price
}
