//! # urverk-kernel
//!
//! The DEVS simulation kernel: a single-threaded cooperative simulator that
//! advances the clock by draining the soonest bag of events. Atomic-model
//! behaviours plug in through the [`dynamics::Dynamics`] trait; the
//! [`coordinator::Coordinator`] owns the graph, the simulator roster and
//! the event table exclusively, and executives rewire all of them mid-run
//! through deferred structural commands.
//!
//! ### Key Submodules:
//! - `dynamics`: the model contract, observer and trace wrappers, factories
//! - `simulator`: per-atomic live instance (`t_last`, `t_next`, dynamics)
//! - `event_table`: the three-source scheduler with lazy invalidation
//! - `coordinator`: the bag loop, routing and the executive bridge
//! - `executive`: deferred structural-change commands
//! - `event`: output and external event values

pub mod coordinator;
pub mod dynamics;
pub mod error;
pub mod event;
pub mod event_table;
pub mod executive;
pub mod simulator;

pub use coordinator::{
    Catalogues, Coordinator, DynamicsRef, KernelSettings, Observable, RunStatus, RunSummary,
    REQUEST_PORT,
};
pub use dynamics::{
    dynamics_factory, Dynamics, DynamicsContext, DynamicsInit, DynamicsKind, ModuleSymbol,
    ObservationRequest,
};
pub use error::{KernelError, ModellingError};
pub use event::{ExternalEvent, OutputEvent, OutputEvents};
pub use event_table::{Bag, BagEntry, BagKind, EventTable};
pub use executive::{StructuralChange, StructuralChanges};
pub use simulator::{Simulator, SimulatorId};
