//! SnapshotStore: redb-backed persistence for simulation snapshots.
//!
//! A snapshot is the resource graph plus the network topology, saved under
//! a caller-chosen name. Values are JSON-serialized into redb's `&[u8]`
//! value column. Both on-disk and in-memory backends are supported.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::graph::ResourceGraph;
use crate::tables::SNAPSHOTS;
use crate::topology::NetworkTopologyIndex;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphSnapshot {
    pub graph: ResourceGraph,
    pub topology: NetworkTopologyIndex,
    /// Simulated seconds elapsed when the snapshot was taken.
    pub saved_at_secs: u64,
}

/// Thread-safe snapshot store backed by redb.
#[derive(Clone)]
pub struct SnapshotStore {
    db: Arc<Database>,
}

impl SnapshotStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "snapshot store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory snapshot store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert or overwrite a snapshot.
    pub fn put(&self, name: &str, snapshot: &GraphSnapshot) -> StateResult<()> {
        if name.trim().is_empty() {
            return Err(StateError::Validation("snapshot name must not be empty".to_string()));
        }
        let value = serde_json::to_vec(snapshot).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
            table
                .insert(name, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%name, bytes = value.len(), "snapshot stored");
        Ok(())
    }

    pub fn get(&self, name: &str) -> StateResult<Option<GraphSnapshot>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
        match table.get(name).map_err(map_err!(Read))? {
            Some(guard) => {
                let snapshot: GraphSnapshot =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// Snapshot names in key order.
    pub fn list(&self) -> StateResult<Vec<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
        let mut names = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            names.push(key.value().to_string());
        }
        Ok(names)
    }

    /// Delete a snapshot. Returns true if it existed.
    pub fn delete(&self, name: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
            existed = table.remove(name).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%name, existed, "snapshot deleted");
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClusterKind, ClusterSpec, NodeSpec, ServiceSpec};

    fn snapshot() -> GraphSnapshot {
        let mut graph = ResourceGraph::new();
        let cid = graph
            .add_cluster(ClusterSpec {
                name: "prod".to_string(),
                region: "eu-west-1".to_string(),
                version: "1.29".to_string(),
                kind: ClusterKind::Managed,
            })
            .unwrap();
        graph
            .add_node(NodeSpec {
                name: "node-1".to_string(),
                cluster_id: cid,
                node_type: "m5.large".to_string(),
                zone: "b".to_string(),
                cpu_usage: 30.0,
                memory_usage: 45.0,
            })
            .unwrap();
        graph.deploy_service(ServiceSpec::new("api", cid)).unwrap();
        GraphSnapshot {
            graph,
            topology: NetworkTopologyIndex::new(),
            saved_at_secs: 12,
        }
    }

    #[test]
    fn put_and_get() {
        let store = SnapshotStore::open_in_memory().unwrap();
        let snap = snapshot();
        store.put("baseline", &snap).unwrap();
        assert_eq!(store.get("baseline").unwrap(), Some(snap));
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn list_and_delete() {
        let store = SnapshotStore::open_in_memory().unwrap();
        store.put("b", &snapshot()).unwrap();
        store.put("a", &snapshot()).unwrap();
        assert_eq!(store.list().unwrap(), vec!["a".to_string(), "b".to_string()]);

        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert_eq!(store.list().unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn overwrite_in_place() {
        let store = SnapshotStore::open_in_memory().unwrap();
        let mut snap = snapshot();
        store.put("run", &snap).unwrap();
        snap.saved_at_secs = 99;
        store.put("run", &snap).unwrap();
        assert_eq!(store.get("run").unwrap().unwrap().saved_at_secs, 99);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn empty_name_rejected() {
        let store = SnapshotStore::open_in_memory().unwrap();
        assert!(matches!(
            store.put("  ", &snapshot()),
            Err(StateError::Validation(_))
        ));
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("snapshots.redb");

        {
            let store = SnapshotStore::open(&db_path).unwrap();
            store.put("prod", &snapshot()).unwrap();
        }

        let store = SnapshotStore::open(&db_path).unwrap();
        let snap = store.get("prod").unwrap().unwrap();
        assert_eq!(snap.graph.find_service("api").unwrap().current_replicas, 1);
    }
}
