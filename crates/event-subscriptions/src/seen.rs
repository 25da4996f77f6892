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

use std::collections::{HashSet, VecDeque};

use crowdfund_ledger_gateway::EventKey;

/// A bounded set of delivered logs. When full, the oldest key is evicted.
#[derive(Debug, Clone)]
pub struct SeenSet {
    capacity: usize,
    keys: HashSet<EventKey>,
    order: VecDeque<EventKey>,
}

impl SeenSet {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            keys: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Records `key`. Returns false if it was already seen.
    pub fn insert(&mut self, key: EventKey) -> bool {
        if !self.keys.insert(key) {
            return false;
        }
        self.order.push_back(key);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.keys.remove(&oldest);
            }
        }
        true
    }

    pub fn contains(&self, key: &EventKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::TxHash;

    fn key(i: u64) -> EventKey {
        EventKey {
            tx_hash: TxHash::from_low_u64_be(i),
            log_index: 0,
        }
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut seen = SeenSet::new(4);
        assert!(seen.insert(key(1)));
        assert!(!seen.insert(key(1)));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn oldest_key_is_evicted() {
        let mut seen = SeenSet::new(2);
        seen.insert(key(1));
        seen.insert(key(2));
        seen.insert(key(3));
        assert!(!seen.contains(&key(1)));
        assert!(seen.contains(&key(2)));
        assert!(seen.contains(&key(3)));
        assert_eq!(seen.len(), 2);
    }
}
