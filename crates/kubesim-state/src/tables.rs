//! redb table definitions for the snapshot store.
//!
//! Values are JSON-serialized `GraphSnapshot` blobs; the store never looks
//! inside them.

use redb::TableDefinition;

/// Graph snapshots keyed by snapshot name.
pub const SNAPSHOTS: TableDefinition<&str, &[u8]> = TableDefinition::new("snapshots");
