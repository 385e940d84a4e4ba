//! kubesim-state: the simulated cluster model.
//!
//! Holds the two collaborators the load-test engine reads from and writes
//! to: the [`ResourceGraph`] (clusters, nodes, services) and the
//! [`NetworkTopologyIndex`] (load balancers, cluster services, ingresses,
//! network policies). Both are plain in-memory structures owned by a single
//! writer; the engine mutates them between ticks.
//!
//! # Persistence
//!
//! [`SnapshotStore`] saves named snapshots of both structures into
//! [redb](https://docs.rs/redb) as JSON blobs. It is `Clone` + `Send` +
//! `Sync` (backed by `Arc<Database>`) and has an in-memory backend for tests.

pub mod error;
pub mod graph;
pub mod seed;
pub mod store;
pub mod tables;
pub mod topology;
pub mod types;

pub use error::{StateError, StateResult};
pub use graph::{GraphTotals, ResourceGraph, ResourceUsage, validate_resource_name};
pub use seed::from_scenario;
pub use store::{GraphSnapshot, SnapshotStore};
pub use topology::*;
pub use types::*;
