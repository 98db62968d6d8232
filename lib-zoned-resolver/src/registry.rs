//! The registry of published zones.
//!
//! A query fetches the current `Arc<Zone>` snapshot for its name and
//! completes against it, however long it takes; reloads build fresh
//! zones off to the side and only take the write lock for the swap.
//! Per-zone counters are handed from the outgoing zone to its
//! replacement, so reloads never reset stats.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use zoned_types::protocol::types::DomainName;
use zoned_types::zones::types::Zone;

const LOCK_POISON_MESSAGE: &str =
    "[INTERNAL ERROR] zone registry lock poisoned, cannot recover from this - aborting";

/// The origin → zone mapping, swappable while queries are in flight.
#[derive(Debug, Default)]
pub struct ZoneRegistry {
    zones: RwLock<HashMap<DomainName, Arc<Zone>>>,
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The zone responsible for a name: the longest origin the name is a
    /// subdomain of.
    pub fn find(&self, name: &DomainName) -> Option<Arc<Zone>> {
        let zones = self.zones.read().expect(LOCK_POISON_MESSAGE);
        for i in 0..name.labels.len() {
            if let Some(origin) = DomainName::from_labels(name.labels[i..].to_vec()) {
                if let Some(zone) = zones.get(&origin) {
                    return Some(zone.clone());
                }
            }
        }
        None
    }

    pub fn get(&self, origin: &DomainName) -> Option<Arc<Zone>> {
        self.zones
            .read()
            .expect(LOCK_POISON_MESSAGE)
            .get(origin)
            .cloned()
    }

    /// Publish one zone, replacing any predecessor with the same origin
    /// and carrying its counters over.
    pub fn publish(&self, mut zone: Zone) {
        let mut zones = self.zones.write().expect(LOCK_POISON_MESSAGE);
        if let Some(old) = zones.get(zone.origin()) {
            zone.adopt_metrics(old);
        }
        zones.insert(zone.origin().clone(), Arc::new(zone));
    }

    /// Publish a full set of zones, retiring every origin not in the new
    /// set.  Counter transfer happens per-origin; the write lock is held
    /// only for the swap.
    pub fn publish_all(&self, new_zones: Vec<Zone>) {
        let mut prepared = HashMap::with_capacity(new_zones.len());
        {
            let zones = self.zones.read().expect(LOCK_POISON_MESSAGE);
            for mut zone in new_zones {
                if let Some(old) = zones.get(zone.origin()) {
                    zone.adopt_metrics(old);
                }
                prepared.insert(zone.origin().clone(), Arc::new(zone));
            }

            for origin in zones.keys() {
                if !prepared.contains_key(origin) {
                    tracing::info!(zone = %origin, "retiring zone");
                }
            }
        }

        *self.zones.write().expect(LOCK_POISON_MESSAGE) = prepared;
    }

    pub fn origins(&self) -> Vec<DomainName> {
        self.zones
            .read()
            .expect(LOCK_POISON_MESSAGE)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.zones.read().expect(LOCK_POISON_MESSAGE).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
