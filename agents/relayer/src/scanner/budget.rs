use std::time::Duration;

/// The window RPC credit quotas are granted over.
pub const BUDGET_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Paces the recovery scan so that it stays within a share of the provider's
/// daily credit quota. Each scanned block costs one block fetch plus one
/// transaction fetch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaBudget {
    daily_credits: u64,
    fraction: f64,
    credits_per_block: u64,
}

impl QuotaBudget {
    /// Budget `fraction` of `daily_credits`, charging the given fetch costs
    /// per block.
    pub fn new(
        daily_credits: u64,
        fraction: f64,
        block_fetch_cost: u64,
        tx_fetch_cost: u64,
    ) -> Self {
        Self {
            daily_credits,
            fraction,
            credits_per_block: block_fetch_cost.saturating_add(tx_fetch_cost).max(1),
        }
    }

    /// Credits charged for one scanned block.
    pub fn credits_per_block(&self) -> u64 {
        self.credits_per_block
    }

    /// Blocks that fit in one window.
    pub fn blocks_per_window(&self) -> u64 {
        let allowed = self.daily_credits as f64 * self.fraction;
        (allowed / self.credits_per_block as f64).floor() as u64
    }

    /// Pause before each block so that no window sees more than
    /// [`Self::blocks_per_window`] blocks. Rounded up to the nanosecond.
    pub fn iteration_delay(&self) -> Duration {
        let blocks = self.blocks_per_window();
        if blocks == 0 {
            return BUDGET_WINDOW;
        }
        let window = BUDGET_WINDOW.as_nanos();
        let nanos = window.div_ceil(u128::from(blocks));
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}
