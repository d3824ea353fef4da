//! Running detection statistics.
//!
//! Folded by the aggregation loop only. Everyone else reads a published
//! snapshot.

use ethers_core::types::U256;
use serde::{Deserialize, Serialize};

use super::event::{MevEvent, MevKind};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionStatistics {
    pub total_events: u64,
    pub sandwich_attacks: u64,
    pub front_running: u64,
    pub arbitrage: u64,
    /// Sum of placeholder profit estimates, in wei.
    pub total_value_extracted: U256,
    pub suspicious_transactions: u64,
    pub pending_observed: u64,
    pub blocks_observed: u64,
    /// Malformed notifications that were skipped.
    pub anomalies_skipped: u64,
}

impl DetectionStatistics {
    pub fn record_event(&mut self, event: &MevEvent) {
        self.total_events += 1;
        match event.kind {
            MevKind::Sandwich => self.sandwich_attacks += 1,
            MevKind::FrontRun => self.front_running += 1,
            MevKind::Arbitrage => self.arbitrage += 1,
        }
        self.total_value_extracted = self
            .total_value_extracted
            .saturating_add(event.estimated_profit);
    }

    pub fn count(&self, kind: MevKind) -> u64 {
        match kind {
            MevKind::Sandwich => self.sandwich_attacks,
            MevKind::FrontRun => self.front_running,
            MevKind::Arbitrage => self.arbitrage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers_core::types::{Address, H256};

    fn event(kind: MevKind, profit: u64) -> MevEvent {
        MevEvent::new(
            kind,
            Address::repeat_byte(1),
            None,
            U256::from(profit),
            Some(1),
            vec![H256::repeat_byte(2)],
        )
    }

    #[test]
    fn fold_counts_by_kind_and_sums_profit() {
        let mut stats = DetectionStatistics::default();
        stats.record_event(&event(MevKind::Sandwich, 50));
        stats.record_event(&event(MevKind::Sandwich, 50));
        stats.record_event(&event(MevKind::Arbitrage, 100));
        stats.record_event(&event(MevKind::FrontRun, 0));

        assert_eq!(stats.total_events, 4);
        assert_eq!(stats.count(MevKind::Sandwich), 2);
        assert_eq!(stats.arbitrage, 1);
        assert_eq!(stats.front_running, 1);
        assert_eq!(stats.total_value_extracted, U256::from(200));
    }

    #[test]
    fn profit_sum_saturates() {
        let mut stats = DetectionStatistics {
            total_value_extracted: U256::MAX,
            ..Default::default()
        };
        stats.record_event(&event(MevKind::Arbitrage, 1));
        assert_eq!(stats.total_value_extracted, U256::MAX);
    }
}
