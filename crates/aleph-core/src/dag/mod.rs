//! Communication-history DAG and its linearization.
//!
//! Three layers, each wrapping the previous one:
//!
//! - **Container**: a closure-preserving set of nodes. A node is present only
//!   if all its ancestors are present, and every mutation keeps it that way.
//! - **History**: creator bookkeeping on top of the container. Computes the
//!   Byzantine fault bound `f = (N - 1) / 3` and flags creators that break the
//!   diversity, dissemination or chain rules.
//! - **Ordering**: per-round head selection, ancestor collection and a
//!   deterministic sort, producing a growing linear order.
//!
//! Derived state in the upper layers is memoized against the container's
//! revision counter and recomputed on demand after any mutation.
//!
//! # Sub-modules
//!
//! - [`graph`]: the container. ([`Dag`])
//! - [`history`]: validity rules and fault bounds. ([`ChDag`],
//!   [`max_tolerable_faulty`], [`minimum_young_parents_for`])
//! - [`head`]: the head-selection contract. ([`HeadSelector`], [`NoHead`],
//!   [`FixedHeads`])
//! - [`order`]: the ordering engine. ([`AlephDag`], [`LinearOrder`])

pub mod graph;
pub mod head;
pub mod history;
pub mod order;

pub use graph::Dag;
pub use head::{FixedHeads, HeadSelector, NoHead, Round};
pub use history::{ChDag, max_tolerable_faulty, minimum_young_parents_for};
pub use order::{AlephDag, LinearOrder};
