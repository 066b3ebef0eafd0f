//! aleph-core library.
//!
//! Node arena, closure-preserving DAG container, communication-history
//! validity rules and the Aleph linear ordering.
//!
//! ```
//! use aleph_core::dag::{AlephDag, FixedHeads};
//! use aleph_core::node::NodeStore;
//!
//! let store: NodeStore<&str, u32> = NodeStore::new();
//! let a = store.create_root("alice", 1);
//! let b = store.create_root("bob", 2);
//! let c = store.create_node("alice", 3, [a, b]).unwrap();
//!
//! let heads: FixedHeads = [(0, a)].into_iter().collect();
//! let mut aleph = AlephDag::new(&store, heads);
//! aleph.add(c);
//! assert!(aleph.is_consistent());
//! assert_eq!(aleph.order_units().as_slice(), &[a]);
//! ```
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums with a stable [`error::ErrorCode`].
//!   Container mutations report partial outcomes as `bool`, never panic.
//! - **Logging**: `tracing` macros (`warn!`, `debug!`, `trace!`); the library
//!   never installs a subscriber.
//! - **Threading**: a store and the graphs over it belong to one task. None
//!   of these types are `Sync`.

pub mod dag;
pub mod error;
pub mod node;

pub use dag::{AlephDag, ChDag, Dag, FixedHeads, HeadSelector, LinearOrder, NoHead, Round};
pub use error::{ErrorCode, NodeError};
pub use node::{Generation, NodeId, NodeKind, NodeStore, TieBreakKey};
