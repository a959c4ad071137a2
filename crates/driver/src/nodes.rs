//! In-process node table
//!
//! Implements node publication and minor-range reservation for the driver.
//! Reservations follow the dynamic character-device scheme: every range
//! gets a major number of its own from the dynamic pool, starting at minor 0.
//! A major is only handed out again once its range is released and every
//! node that used it has been unpublished.

use crate::device::EndpointDevice;
use crate::host::{HostError, MinorRegistry, NodeHandle, NodeRegistry};
use protocol::{DevNumber, NodeInfo};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, warn};

/// Majors available for dynamic allocation
const DYNAMIC_MAJORS: [RangeInclusive<u32>; 2] = [234..=254, 384..=511];

/// Largest range a single reservation may cover (single-byte count)
pub const MAX_MINORS_PER_RANGE: usize = 256;

struct Reservation {
    name: String,
    count: usize,
}

struct PublishedNode {
    name: String,
    class: String,
    address: u8,
    endpoint: Weak<EndpointDevice>,
}

#[derive(Default)]
struct Inner {
    classes: HashSet<String>,
    reservations: HashMap<u32, Reservation>,
    nodes: BTreeMap<(u32, u32), PublishedNode>,
}

impl Inner {
    fn major_busy(&self, major: u32) -> bool {
        self.reservations.contains_key(&major)
            || self.nodes.range((major, 0)..=(major, u32::MAX)).next().is_some()
    }
}

/// Registry of node classes, minor ranges and published nodes
#[derive(Default)]
pub struct NodeTable {
    inner: Mutex<Inner>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Device number of the node called `name`
    pub fn dev_by_name(&self, name: &str) -> Option<DevNumber> {
        self.lock()
            .nodes
            .iter()
            .find(|(_, node)| node.name == name)
            .map(|(&(major, minor), _)| DevNumber::new(major, minor))
    }

    /// Every published node, ordered by device number
    pub fn list(&self) -> Vec<NodeInfo> {
        self.lock()
            .nodes
            .iter()
            .map(|(&(major, minor), node)| NodeInfo {
                name: node.name.clone(),
                class: node.class.clone(),
                dev: DevNumber::new(major, minor),
                endpoint: node.address,
            })
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.lock().classes.contains(name)
    }

    pub fn reserved_ranges(&self) -> usize {
        self.lock().reservations.len()
    }
}

impl NodeRegistry for NodeTable {
    fn create_class(&self, name: &str) -> Result<(), HostError> {
        let mut inner = self.lock();
        if !inner.classes.insert(name.to_string()) {
            return Err(HostError::ClassExists(name.to_string()));
        }
        Ok(())
    }

    fn destroy_class(&self, name: &str) {
        if !self.lock().classes.remove(name) {
            warn!("Destroying unknown class {}", name);
        }
    }

    fn publish(
        &self,
        class: &str,
        dev: DevNumber,
        name: &str,
        endpoint: Weak<EndpointDevice>,
    ) -> Result<NodeHandle, HostError> {
        // Upgrade outside the lock: dropping an endpoint unpublishes it
        let address = endpoint.upgrade().map(|e| e.address()).unwrap_or_default();

        let mut inner = self.lock();

        if !inner.classes.contains(class) {
            return Err(HostError::UnknownClass(class.to_string()));
        }

        let reserved = inner
            .reservations
            .get(&dev.major)
            .is_some_and(|r| (dev.minor as usize) < r.count);
        if !reserved {
            return Err(HostError::Unreserved(dev));
        }

        if inner.nodes.contains_key(&(dev.major, dev.minor)) {
            return Err(HostError::DevNumberInUse(dev));
        }

        if inner.nodes.values().any(|node| node.name == name) {
            return Err(HostError::NameInUse(name.to_string()));
        }

        inner.nodes.insert(
            (dev.major, dev.minor),
            PublishedNode {
                name: name.to_string(),
                class: class.to_string(),
                address,
                endpoint,
            },
        );

        debug!("Published {} at {}", name, dev);
        Ok(NodeHandle {
            dev,
            name: name.to_string(),
        })
    }

    fn unpublish(&self, node: &NodeHandle) {
        let removed = self.lock().nodes.remove(&(node.dev.major, node.dev.minor));
        if removed.is_none() {
            warn!("Unpublishing unknown node {} at {}", node.name, node.dev);
        }
    }

    fn lookup(&self, dev: DevNumber) -> Option<Arc<EndpointDevice>> {
        let endpoint = self.lock().nodes.get(&(dev.major, dev.minor))?.endpoint.clone();
        endpoint.upgrade()
    }

    fn node_info(&self, dev: DevNumber) -> Option<NodeInfo> {
        self.lock()
            .nodes
            .get(&(dev.major, dev.minor))
            .map(|node| NodeInfo {
                name: node.name.clone(),
                class: node.class.clone(),
                dev,
                endpoint: node.address,
            })
    }
}

impl MinorRegistry for NodeTable {
    fn reserve(&self, count: usize, name: &str) -> Result<DevNumber, HostError> {
        if count > MAX_MINORS_PER_RANGE {
            return Err(HostError::RangeTooLarge {
                count,
                max: MAX_MINORS_PER_RANGE,
            });
        }

        let mut inner = self.lock();
        let major = DYNAMIC_MAJORS
            .iter()
            .cloned()
            .flatten()
            .find(|&major| !inner.major_busy(major))
            .ok_or_else(|| HostError::NoMajor {
                name: name.to_string(),
            })?;

        inner.reservations.insert(
            major,
            Reservation {
                name: name.to_string(),
                count,
            },
        );
        Ok(DevNumber::new(major, 0))
    }

    fn release(&self, base: DevNumber, count: usize) {
        let mut inner = self.lock();
        let known = base.minor == 0
            && inner
                .reservations
                .get(&base.major)
                .is_some_and(|r| r.count == count);

        match known.then(|| inner.reservations.remove(&base.major)).flatten() {
            Some(r) => debug!("Released major {} of {}", base.major, r.name),
            None => warn!("Releasing unknown minor range {} (+{})", base, count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reservations_get_distinct_majors() {
        let table = NodeTable::new();

        let a = table.reserve(4, "hp-gadget0").unwrap();
        let b = table.reserve(2, "hp-gadget1").unwrap();

        assert_eq!(a, DevNumber::new(234, 0));
        assert_eq!(b, DevNumber::new(235, 0));
        assert_eq!(table.reserved_ranges(), 2);

        table.release(a, 4);
        assert_eq!(table.reserve(1, "hp-gadget2").unwrap(), a);
    }

    #[test]
    fn test_reservation_too_large() {
        let table = NodeTable::new();
        assert_eq!(
            table.reserve(257, "big"),
            Err(HostError::RangeTooLarge {
                count: 257,
                max: 256
            })
        );
    }

    #[test]
    fn test_major_pool_exhaustion() {
        let table = NodeTable::new();
        let pool: usize = DYNAMIC_MAJORS.iter().map(|r| r.clone().count()).sum();

        for i in 0..pool {
            table.reserve(1, &format!("r{}", i)).unwrap();
        }
        assert!(matches!(
            table.reserve(1, "one-too-many"),
            Err(HostError::NoMajor { .. })
        ));
    }

    #[test]
    fn test_publish_requires_class_and_reservation() {
        let table = NodeTable::new();
        let base = table.reserve(1, "hp-gadget0").unwrap();

        assert_eq!(
            table.publish("hp-gadget0", base, "n", Weak::new()),
            Err(HostError::UnknownClass("hp-gadget0".to_string()))
        );

        table.create_class("hp-gadget0").unwrap();
        assert_eq!(
            table.publish("hp-gadget0", base.offset(1), "n", Weak::new()),
            Err(HostError::Unreserved(base.offset(1)))
        );

        let node = table.publish("hp-gadget0", base, "n", Weak::new()).unwrap();
        assert_eq!(table.dev_by_name("n"), Some(base));
        assert_eq!(table.node_count(), 1);

        table.unpublish(&node);
        assert_eq!(table.node_count(), 0);
    }

    #[test]
    fn test_duplicate_class_rejected() {
        let table = NodeTable::new();
        table.create_class("hp-gadget0").unwrap();
        assert_eq!(
            table.create_class("hp-gadget0"),
            Err(HostError::ClassExists("hp-gadget0".to_string()))
        );
        table.destroy_class("hp-gadget0");
        assert!(!table.has_class("hp-gadget0"));
        assert!(table.create_class("hp-gadget0").is_ok());
    }

    #[test]
    fn test_major_with_live_node_not_reused() {
        let table = NodeTable::new();
        table.create_class("c").unwrap();
        let base = table.reserve(1, "c").unwrap();
        let node = table.publish("c", base, "c-node", Weak::new()).unwrap();

        // Range released while the node is still published
        table.release(base, 1);
        let next = table.reserve(1, "d").unwrap();
        assert_ne!(next.major, base.major);

        table.unpublish(&node);
        assert_eq!(table.reserve(1, "e").unwrap().major, base.major);
    }

    #[test]
    fn test_lookup_of_dead_endpoint_is_none() {
        let table = NodeTable::new();
        table.create_class("c").unwrap();
        let base = table.reserve(1, "c").unwrap();
        table.publish("c", base, "c-node", Weak::new()).unwrap();

        assert!(table.lookup(base).is_none());
        assert!(table.node_info(base).is_some());
    }
}
