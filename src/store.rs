//! Replicated Object Store
//!
//! The protocol's view of the state being replicated. The active side
//! only enumerates; the standby side applies and removes. Keys are the
//! composite identity of each record (see the codec's key rules), so a
//! Modify for an existing key overwrites in place.

use std::collections::BTreeMap;

use crate::codec::{EntityKind, ReplicatedEntity};

/// State container the sync protocol reads from and writes to.
pub trait ObjectStore {
    /// All records of one kind, in stable key order.
    fn enumerate(&self, kind: EntityKind) -> Vec<ReplicatedEntity>;

    /// Insert or overwrite one record.
    fn apply(&mut self, entity: ReplicatedEntity);

    /// Remove one record by kind and key; false when absent.
    fn remove(&mut self, kind: EntityKind, key: &str) -> bool;

    /// Total record count across kinds.
    fn len(&self) -> usize;

    /// Whether the store holds no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory store, ordered by (kind, key).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemoryStore {
    records: BTreeMap<(EntityKind, String), ReplicatedEntity>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up one record.
    pub fn get(&self, kind: EntityKind, key: &str) -> Option<&ReplicatedEntity> {
        self.records.get(&(kind, key.to_string()))
    }

    /// Drop every record, e.g. before adopting a cold-sync snapshot.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl ObjectStore for MemoryStore {
    fn enumerate(&self, kind: EntityKind) -> Vec<ReplicatedEntity> {
        self.records
            .range((kind, String::new())..)
            .take_while(|((k, _), _)| *k == kind)
            .map(|(_, entity)| entity.clone())
            .collect()
    }

    fn apply(&mut self, entity: ReplicatedEntity) {
        self.records
            .insert((entity.kind(), entity.key()), entity);
    }

    fn remove(&mut self, kind: EntityKind, key: &str) -> bool {
        self.records.remove(&(kind, key.to_string())).is_some()
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{NodeRecord, ServiceUnitRecord};

    fn node(name: &str, node_id: u32) -> ReplicatedEntity {
        ReplicatedEntity::Node(NodeRecord {
            name: name.to_string(),
            node_id,
            oper_state: 1,
        })
    }

    #[test]
    fn test_apply_overwrites_same_key() {
        let mut store = MemoryStore::new();
        store.apply(node("PL-3", 1));
        store.apply(node("PL-3", 2));

        assert_eq!(store.len(), 1);
        match store.get(EntityKind::Node, "PL-3").unwrap() {
            ReplicatedEntity::Node(r) => assert_eq!(r.node_id, 2),
            other => panic!("wrong kind: {:?}", other),
        }
    }

    #[test]
    fn test_enumerate_filters_by_kind_in_key_order() {
        let mut store = MemoryStore::new();
        store.apply(node("PL-4", 4));
        store.apply(node("PL-3", 3));
        store.apply(ReplicatedEntity::ServiceUnit(ServiceUnitRecord {
            name: "su1".to_string(),
            rank: 1,
            oper_state: 1,
        }));

        let nodes = store.enumerate(EntityKind::Node);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].key(), "PL-3");
        assert_eq!(nodes[1].key(), "PL-4");
        assert_eq!(store.enumerate(EntityKind::Component).len(), 0);
    }

    #[test]
    fn test_remove() {
        let mut store = MemoryStore::new();
        store.apply(node("PL-3", 1));

        assert!(store.remove(EntityKind::Node, "PL-3"));
        assert!(!store.remove(EntityKind::Node, "PL-3"));
        assert!(store.is_empty());
    }
}
