// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use prometheus::core::{AtomicF64, GenericCounter, GenericGauge};
use prometheus::{opts, Encoder, Registry, TextEncoder};

/// A struct definition for collecting metrics of the crowdfunding client.
///
/// Every instance owns its own [`Registry`], so several contexts (and tests)
/// can live in one process.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Transactions handed to the signer and accepted by the node.
    pub transactions_submitted: GenericCounter<AtomicF64>,
    /// Transactions whose receipt reported success.
    pub transactions_confirmed: GenericCounter<AtomicF64>,
    /// Transactions whose receipt reported a revert.
    pub transactions_failed: GenericCounter<AtomicF64>,
    /// Transactions we stopped waiting for.
    pub transactions_dropped: GenericCounter<AtomicF64>,
    /// Dry-runs that reverted before anything was submitted.
    pub simulations_reverted: GenericCounter<AtomicF64>,
    /// Contract events delivered to subscribers.
    pub events_reconciled: GenericCounter<AtomicF64>,
    /// Re-announced logs filtered by the dedup check.
    pub duplicate_events_skipped: GenericCounter<AtomicF64>,
    /// How many times an event subscription backed off.
    pub resubscribe_back_off: GenericCounter<AtomicF64>,
    /// Transactions currently pending.
    pub in_flight_transactions: GenericGauge<AtomicF64>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish()
    }
}

impl Metrics {
    /// Instantiates the various metrics and their counters, also creates a registry for the counters and
    /// registers the counters
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("crowdfund".into()), None)?;

        let transactions_submitted = counter(
            &registry,
            "transactions_submitted",
            "The total number of transactions submitted",
        )?;
        let transactions_confirmed = counter(
            &registry,
            "transactions_confirmed",
            "The total number of transactions confirmed with success",
        )?;
        let transactions_failed = counter(
            &registry,
            "transactions_failed",
            "The total number of transactions reverted on chain",
        )?;
        let transactions_dropped = counter(
            &registry,
            "transactions_dropped",
            "The total number of transactions dropped while awaiting confirmation",
        )?;
        let simulations_reverted = counter(
            &registry,
            "simulations_reverted",
            "The total number of dry-runs that reverted",
        )?;
        let events_reconciled = counter(
            &registry,
            "events_reconciled",
            "The total number of contract events delivered to subscribers",
        )?;
        let duplicate_events_skipped = counter(
            &registry,
            "duplicate_events_skipped",
            "The total number of duplicated logs ignored",
        )?;
        let resubscribe_back_off = counter(
            &registry,
            "resubscribe_back_off",
            "How many times an event subscription backed off",
        )?;

        let in_flight_transactions = prometheus::Gauge::with_opts(opts!(
            "in_flight_transactions",
            "Transactions waiting for a receipt"
        ))?;
        registry.register(Box::new(in_flight_transactions.clone()))?;

        Ok(Self {
            registry,
            transactions_submitted,
            transactions_confirmed,
            transactions_failed,
            transactions_dropped,
            simulations_reverted,
            events_reconciled,
            duplicate_events_skipped,
            resubscribe_back_off,
            in_flight_transactions,
        })
    }

    /// Gathers all the metrics in the prometheus text format.
    pub fn gather_metrics(&self) -> crate::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|_| crate::Error::Generic("metrics are not valid utf-8"))
    }
}

fn counter(
    registry: &Registry,
    name: &str,
    help: &str,
) -> Result<GenericCounter<AtomicF64>, prometheus::Error> {
    let counter = prometheus::Counter::with_opts(opts!(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_instances_do_not_collide() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.transactions_submitted.inc();
        assert_eq!(a.transactions_submitted.get(), 1.0);
        assert_eq!(b.transactions_submitted.get(), 0.0);
    }

    #[test]
    fn gathers_prefixed_text() {
        let metrics = Metrics::new().unwrap();
        metrics.events_reconciled.inc_by(3.0);
        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("crowdfund_events_reconciled 3"));
    }
}
