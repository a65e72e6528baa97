//! ## urverk-kernel::simulator
//! **Per-atomic-model live instance**
//!
//! Owns the dynamics exclusively, tracks `t_last`/`t_next`, and carries the
//! creation order used for every deterministic tie-break. The external
//! inbox lives in the event table, keyed by this simulator.

use std::fmt;

use urverk_core::time::Time;
use urverk_graph::ModelId;
use urverk_output::{ViewId, ViewKind};

use crate::dynamics::{Dynamics, ObservationSink};

/// Slab key of a simulator in the coordinator's roster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimulatorId(pub(crate) usize);

impl SimulatorId {
    /// Builds an id from a raw roster index. Hosts driving a bare
    /// [`crate::EventTable`] (tests, benches) need this; inside a
    /// coordinator the roster assigns keys itself.
    pub fn from_index(index: usize) -> Self {
        SimulatorId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SimulatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

pub struct Simulator {
    pub(crate) model: ModelId,
    pub(crate) path: String,
    pub(crate) dynamics: Box<dyn Dynamics>,
    pub(crate) t_last: Time,
    pub(crate) t_next: Time,
    /// Monotonic creation order; never reused, unlike the slab key.
    pub(crate) order: u64,
    pub(crate) executive: bool,
    /// Event-view snapshots pushed by the observer wrapper, drained by the
    /// coordinator after each lifecycle call.
    pub(crate) observations: Option<ObservationSink>,
    /// Every `(view, port)` pair observing this simulator, with the view
    /// kind cached for rescheduling and teardown.
    pub(crate) bindings: Vec<(ViewId, String, ViewKind)>,
}

impl Simulator {
    pub fn model(&self) -> ModelId {
        self.model
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn t_last(&self) -> Time {
        self.t_last
    }

    pub fn t_next(&self) -> Time {
        self.t_next
    }

    pub fn order(&self) -> u64 {
        self.order
    }

    pub fn is_executive(&self) -> bool {
        self.executive
    }
}

impl fmt::Debug for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulator")
            .field("model", &self.model)
            .field("path", &self.path)
            .field("t_last", &self.t_last)
            .field("t_next", &self.t_next)
            .field("order", &self.order)
            .field("executive", &self.executive)
            .finish_non_exhaustive()
    }
}
