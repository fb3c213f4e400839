//! Consumer Groups
//!
//! Consumer groups give at-least-once delivery tracking over a stream.
//!
//! ## What is a Consumer Group?
//!
//! A group remembers the last ID it delivered, plus every delivered record that
//! has not been acknowledged yet (the *pending entries list*, or PEL):
//!
//! - **Group PEL**: `StreamId -> Nack` (delivery time, delivery count, owner)
//! - **Consumer PEL**: the set of IDs that consumer currently owns
//!
//! The group PEL is the only owner of a NACK. A consumer's PEL holds plain IDs,
//! and every change goes through the group so both sides stay in step:
//!
//! ```text
//!  group "billing"
//!  ├── last_delivered_id: 1700-4
//!  ├── pel: { 1700-2 → Nack{worker-a, 1x}, 1700-3 → Nack{worker-b, 2x} }
//!  └── consumers
//!      ├── worker-a  pel: { 1700-2 }
//!      └── worker-b  pel: { 1700-3 }
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! stream.create_group("billing", StreamId::MIN)?;
//! stream.record_delivery("billing", "worker-a", id)?;
//! stream.acknowledge("billing", &[id])?;
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use streamlog_core::StreamId;
use tracing::debug;

use crate::error::{Error, Result};
use crate::stream::Stream;

/// A delivered, unacknowledged record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nack {
    /// Milliseconds timestamp of the latest delivery
    pub delivery_time: u64,
    pub delivery_count: u64,
    /// Name of the consumer the record was last delivered to
    pub consumer: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumer {
    name: String,
    seen_time: u64,
    pel: BTreeSet<StreamId>,
}

impl Consumer {
    fn new(name: &str, now: u64) -> Self {
        Self {
            name: name.to_string(),
            seen_time: now,
            pel: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Milliseconds timestamp of the last time this consumer was looked up.
    pub fn seen_time(&self) -> u64 {
        self.seen_time
    }

    /// IDs currently pending for this consumer, in order.
    pub fn pending(&self) -> impl Iterator<Item = StreamId> + '_ {
        self.pel.iter().copied()
    }

    pub fn pending_count(&self) -> usize {
        self.pel.len()
    }
}

/// Overview of a group's pending entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSummary {
    pub count: u64,
    pub min: Option<StreamId>,
    pub max: Option<StreamId>,
    /// Consumers with at least one pending entry, by name
    pub consumers: Vec<(String, u64)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerGroup {
    last_delivered_id: StreamId,
    pel: BTreeMap<StreamId, Nack>,
    consumers: BTreeMap<String, Consumer>,
}

impl ConsumerGroup {
    pub fn new(last_delivered_id: StreamId) -> Self {
        Self {
            last_delivered_id,
            pel: BTreeMap::new(),
            consumers: BTreeMap::new(),
        }
    }

    /// Rebuild a group from its group PEL, deriving every consumer PEL from
    /// the NACK owners. Fails if a NACK names a consumer that is not listed.
    pub fn restore(
        last_delivered_id: StreamId,
        pel: BTreeMap<StreamId, Nack>,
        consumers: impl IntoIterator<Item = (String, u64)>,
    ) -> std::result::Result<Self, String> {
        let mut consumers: BTreeMap<String, Consumer> = consumers
            .into_iter()
            .map(|(name, seen_time)| {
                let consumer = Consumer::new(&name, seen_time);
                (name, consumer)
            })
            .collect();

        for (id, nack) in &pel {
            let owner = consumers
                .get_mut(&nack.consumer)
                .ok_or_else(|| format!("pending entry {id} owned by unknown consumer {}", nack.consumer))?;
            owner.pel.insert(*id);
        }

        Ok(Self {
            last_delivered_id,
            pel,
            consumers,
        })
    }

    pub fn last_delivered_id(&self) -> StreamId {
        self.last_delivered_id
    }

    pub fn set_last_delivered_id(&mut self, id: StreamId) {
        self.last_delivered_id = id;
    }

    pub fn pending(&self) -> &BTreeMap<StreamId, Nack> {
        &self.pel
    }

    pub fn consumers(&self) -> impl Iterator<Item = &Consumer> {
        self.consumers.values()
    }

    pub fn consumer(&self, name: &str) -> Option<&Consumer> {
        self.consumers.get(name)
    }

    /// Find a consumer, optionally creating it, and mark it as seen at `now`.
    pub fn lookup_consumer(&mut self, name: &str, create: bool, now: u64) -> Option<&mut Consumer> {
        if create && !self.consumers.contains_key(name) {
            self.consumers
                .insert(name.to_string(), Consumer::new(name, now));
            debug!(consumer = %name, "Created consumer");
        }
        let consumer = self.consumers.get_mut(name)?;
        consumer.seen_time = now;
        Some(consumer)
    }

    /// Record that `id` was delivered to `consumer` at `now`.
    ///
    /// A first delivery creates a NACK with count 1. Delivering an ID that is
    /// already pending moves it to `consumer` and bumps its count.
    pub fn record_delivery(&mut self, consumer: &str, id: StreamId, now: u64) -> &Nack {
        self.lookup_consumer(consumer, true, now);

        let previous_owner = self.pel.get(&id).map(|nack| nack.consumer.clone());
        if let Some(owner) = previous_owner {
            if let Some(previous) = self.consumers.get_mut(&owner) {
                previous.pel.remove(&id);
            }
        }
        if let Some(owner) = self.consumers.get_mut(consumer) {
            owner.pel.insert(id);
        }

        let nack = self
            .pel
            .entry(id)
            .and_modify(|nack| {
                nack.delivery_time = now;
                nack.delivery_count += 1;
                nack.consumer = consumer.to_string();
            })
            .or_insert_with(|| Nack {
                delivery_time: now,
                delivery_count: 1,
                consumer: consumer.to_string(),
            });
        nack
    }

    /// Acknowledge IDs. Returns how many were pending.
    pub fn acknowledge(&mut self, ids: &[StreamId]) -> u64 {
        let mut acked = 0;
        for id in ids {
            if let Some(nack) = self.pel.remove(id) {
                if let Some(owner) = self.consumers.get_mut(&nack.consumer) {
                    owner.pel.remove(id);
                }
                acked += 1;
            }
        }
        acked
    }

    /// Remove a consumer and every entry pending for it. Returns how many
    /// entries were dropped, or `None` if there is no such consumer.
    pub fn delete_consumer(&mut self, name: &str) -> Option<u64> {
        let consumer = self.consumers.remove(name)?;
        for id in &consumer.pel {
            self.pel.remove(id);
        }
        debug!(consumer = %name, dropped = consumer.pel.len(), "Deleted consumer");
        Some(consumer.pel.len() as u64)
    }

    pub fn pending_summary(&self) -> PendingSummary {
        PendingSummary {
            count: self.pel.len() as u64,
            min: self.pel.keys().next().copied(),
            max: self.pel.keys().next_back().copied(),
            consumers: self
                .consumers
                .values()
                .filter(|c| !c.pel.is_empty())
                .map(|c| (c.name.clone(), c.pel.len() as u64))
                .collect(),
        }
    }

    /// Up to `count` pending entries in `[start, end]`, optionally only those
    /// owned by `consumer`.
    pub fn pending_range(
        &self,
        start: StreamId,
        end: StreamId,
        count: usize,
        consumer: Option<&str>,
    ) -> Vec<(StreamId, Nack)> {
        if start > end {
            return Vec::new();
        }
        self.pel
            .range(start..=end)
            .filter(|(_, nack)| consumer.map_or(true, |name| nack.consumer == name))
            .take(count)
            .map(|(id, nack)| (*id, nack.clone()))
            .collect()
    }
}

impl Stream {
    fn group_mut(&mut self, name: &str) -> Result<&mut ConsumerGroup> {
        self.groups
            .as_mut()
            .and_then(|groups| groups.get_mut(name))
            .ok_or_else(|| Error::GroupNotFound(name.to_string()))
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &ConsumerGroup)> {
        self.groups
            .iter()
            .flat_map(|groups| groups.iter())
            .map(|(name, group)| (name.as_str(), group))
    }

    pub fn create_group(&mut self, name: &str, start_id: StreamId) -> Result<&mut ConsumerGroup> {
        let groups = self.groups.get_or_insert_with(BTreeMap::new);
        if groups.contains_key(name) {
            return Err(Error::DuplicateGroup(name.to_string()));
        }
        debug!(group = %name, start = %start_id, "Created consumer group");
        Ok(groups
            .entry(name.to_string())
            .or_insert_with(|| ConsumerGroup::new(start_id)))
    }

    pub fn lookup_group(&self, name: &str) -> Option<&ConsumerGroup> {
        self.groups.as_ref()?.get(name)
    }

    pub fn lookup_group_mut(&mut self, name: &str) -> Option<&mut ConsumerGroup> {
        self.groups.as_mut()?.get_mut(name)
    }

    /// Remove a group together with its consumers and pending entries.
    pub fn delete_group(&mut self, name: &str) -> Result<ConsumerGroup> {
        let group = self
            .groups
            .as_mut()
            .and_then(|groups| groups.remove(name))
            .ok_or_else(|| Error::GroupNotFound(name.to_string()))?;
        debug!(group = %name, pending = group.pel.len(), "Deleted consumer group");
        Ok(group)
    }

    /// Look up a consumer, refreshing its seen time. With `create` a missing
    /// consumer is added; without it `Ok(None)` is returned.
    pub fn lookup_consumer(
        &mut self,
        group: &str,
        name: &str,
        create: bool,
    ) -> Result<Option<&mut Consumer>> {
        let now = self.clock.now_ms();
        Ok(self.group_mut(group)?.lookup_consumer(name, create, now))
    }

    pub fn record_delivery(&mut self, group: &str, consumer: &str, id: StreamId) -> Result<&Nack> {
        let now = self.clock.now_ms();
        Ok(self.group_mut(group)?.record_delivery(consumer, id, now))
    }

    pub fn acknowledge(&mut self, group: &str, ids: &[StreamId]) -> Result<u64> {
        Ok(self.group_mut(group)?.acknowledge(ids))
    }

    /// Remove a consumer, returning how many pending entries it owned.
    pub fn delete_consumer(&mut self, group: &str, name: &str) -> Result<u64> {
        self.group_mut(group)?
            .delete_consumer(name)
            .ok_or_else(|| Error::ConsumerNotFound {
                group: group.to_string(),
                consumer: name.to_string(),
            })
    }

    pub fn set_last_delivered_id(&mut self, group: &str, id: StreamId) -> Result<()> {
        self.group_mut(group)?.set_last_delivered_id(id);
        Ok(())
    }

    pub fn pending_summary(&self, group: &str) -> Result<PendingSummary> {
        self.lookup_group(group)
            .map(ConsumerGroup::pending_summary)
            .ok_or_else(|| Error::GroupNotFound(group.to_string()))
    }

    pub fn pending_range(
        &self,
        group: &str,
        start: StreamId,
        end: StreamId,
        count: usize,
        consumer: Option<&str>,
    ) -> Result<Vec<(StreamId, Nack)>> {
        self.lookup_group(group)
            .map(|g| g.pending_range(start, end, count, consumer))
            .ok_or_else(|| Error::GroupNotFound(group.to_string()))
    }
}
