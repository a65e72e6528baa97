//! # urverk-core
//!
//! Foundation layer for the urverk DEVS kernel: simulation time, typed
//! payload values, and per-bag buffer pooling.
//!
//! ### Key Submodules:
//! - `time`: totally ordered simulation time with a distinguished `+∞`
//! - `value`: closed sum of payload values carried by events and observations
//! - `pool`: recycled event buffers, bulk-dropped at the end of each bag
//! - `error`: value coercion errors shared by kernel and model code

pub mod error;
pub mod pool;
pub mod time;
pub mod value;

pub mod prelude {
    pub use crate::error::ValueError;
    pub use crate::pool::BufferPool;
    pub use crate::time::Time;
    pub use crate::value::{Map, Matrix, Set, Table, Tuple, Value, ValueKind};
}
