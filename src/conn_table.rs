//! Capacity-bounded connection table with least-recently-used eviction
//!
//! Keeps at most `capacity` live connections. Every lookup or insert counts
//! as an access, so connections that keep producing events stay resident
//! while idle ones age out. Evicting a connection that was never finalized
//! silently discards its accumulated events; that loss is the price of
//! bounded memory under a burst of concurrently-open connections.

use crate::aggregate::ConnAggregate;
use std::collections::{HashMap, VecDeque};

pub struct ConnTable {
    capacity: usize,
    entries: HashMap<i64, ConnAggregate>,
    // Front is least recently used, back is most recently used.
    recency: VecDeque<i64>,
}

impl ConnTable {
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "connection table capacity must be positive");
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            recency: VecDeque::with_capacity(capacity),
        }
    }

    /// Look up the entry for `conn_id`, creating it with default state on
    /// first access. Either way the entry becomes the most recently used.
    pub fn get_or_create(&mut self, conn_id: i64) -> &mut ConnAggregate {
        if self.entries.contains_key(&conn_id) {
            self.touch(conn_id);
        } else {
            if self.entries.len() >= self.capacity {
                self.evict_lru();
            }
            self.entries.insert(conn_id, ConnAggregate::new(conn_id));
            self.recency.push_back(conn_id);
        }
        self.entries
            .get_mut(&conn_id)
            .expect("entry inserted or found above")
    }

    fn touch(&mut self, conn_id: i64) {
        self.recency.retain(|id| *id != conn_id);
        self.recency.push_back(conn_id);
    }

    fn evict_lru(&mut self) {
        if let Some(evicted_id) = self.recency.pop_front() {
            if let Some(entry) = self.entries.remove(&evicted_id) {
                if entry.finalized {
                    log::debug!("Evicting finalized connection {}", evicted_id);
                } else {
                    log::debug!(
                        "Evicting connection {} under capacity pressure, {} events discarded",
                        evicted_id,
                        entry.total_events
                    );
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, conn_id: i64) -> bool {
        self.entries.contains_key(&conn_id)
    }
}
