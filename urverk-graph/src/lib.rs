//! # urverk-graph
//!
//! Static topology of the simulated system: atomic and coupled models,
//! ports, and the three connection relations (internal, external-in,
//! external-out). The graph is an arena of nodes addressed by [`ModelId`];
//! parents and children are indices, never owning pointers, so the executive
//! bridge can rewire it mid-run without fighting ownership.
//!
//! ### Key Submodules:
//! - `model`: the arena, node kinds, ports and the mutation surface
//! - `routing`: flattened output-port → atomic-input-port tables with a
//!   revision-checked cache

pub mod error;
pub mod model;
pub mod routing;

pub use error::GraphError;
pub use model::{
    AtomicSpec, Connection, ConnectionKind, ModelGraph, ModelId, ModelKind, ModelNode,
};
pub use routing::{RouteCache, RouteTarget};
