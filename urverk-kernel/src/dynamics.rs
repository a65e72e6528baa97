//! ## urverk-kernel::dynamics
//! **The contract every atomic model honours**
//!
//! One narrow polymorphic interface with a tagged sub-kind probed when the
//! scheduler needs executive privileges. Wrappers compose by delegation:
//! [`ObserverDynamics`] snapshots bound ports around each lifecycle call and
//! [`TracedDynamics`] logs them.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use urverk_core::time::Time;
use urverk_core::value::{Map, Value};
use urverk_output::ViewId;

use crate::error::ModellingError;
use crate::event::{ExternalEvent, OutputEvents};
use crate::executive::StructuralChanges;

/// Capability tag of a dynamics instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DynamicsKind {
    Plain,
    /// May mutate the surrounding graph through the context.
    Executive,
    /// Runs pre/post hooks of its own around each transition.
    Observer,
}

/// One observation query: which view asks, on which port, at what time.
#[derive(Clone, Debug)]
pub struct ObservationRequest<'a> {
    pub view: &'a str,
    pub port: &'a str,
    pub time: Time,
}

/// Handed to every lifecycle call. Plain models read the clock and their
/// own path; executives additionally obtain the structural-change recorder.
pub struct DynamicsContext<'a> {
    time: Time,
    path: &'a str,
    changes: Option<&'a mut StructuralChanges>,
}

impl<'a> DynamicsContext<'a> {
    /// Assembles a context. The coordinator does this for every lifecycle
    /// call; test harnesses driving a dynamics directly do the same.
    pub fn new(
        time: Time,
        path: &'a str,
        changes: Option<&'a mut StructuralChanges>,
    ) -> Self {
        Self {
            time,
            path,
            changes,
        }
    }

    pub fn time(&self) -> Time {
        self.time
    }

    /// Full path of the model this dynamics animates.
    pub fn model_path(&self) -> &str {
        self.path
    }

    /// The restricted coordinator handle. Denied unless the simulator was
    /// built from an executive module.
    pub fn executive(&mut self) -> Result<&mut StructuralChanges, ModellingError> {
        match self.changes.as_deref_mut() {
            Some(changes) => Ok(changes),
            None => Err(ModellingError::new(format!(
                "model '{}' is not an executive",
                self.path
            ))),
        }
    }
}

/// The DEVS-with-ports contract.
///
/// `init` returns the first duration; `time_advance` the remaining duration
/// to the next internal event. `output` runs just before the internal
/// transition. The default confluent order is internal-then-external;
/// models preferring the other order override [`Dynamics::confluent_transition`].
pub trait Dynamics {
    fn kind(&self) -> DynamicsKind {
        DynamicsKind::Plain
    }

    /// Initialise state and return the first τ.
    fn init(&mut self, ctx: &mut DynamicsContext<'_>) -> Result<Time, ModellingError>;

    /// Remaining time to the next internal event, `[0, ∞]`.
    fn time_advance(&self) -> Time;

    /// λ: emit events bound to output ports. Called just before δ_int.
    fn output(
        &mut self,
        ctx: &mut DynamicsContext<'_>,
        output: &mut OutputEvents,
    ) -> Result<(), ModellingError> {
        let _ = (ctx, output);
        Ok(())
    }

    /// δ_int: consume "I am firing".
    fn internal_transition(&mut self, ctx: &mut DynamicsContext<'_>) -> Result<(), ModellingError>;

    /// δ_ext: consume a non-empty bag of inbound events.
    fn external_transition(
        &mut self,
        ctx: &mut DynamicsContext<'_>,
        events: &[ExternalEvent],
    ) -> Result<(), ModellingError>;

    /// δ_con: internal and external at the same instant.
    fn confluent_transition(
        &mut self,
        ctx: &mut DynamicsContext<'_>,
        events: &[ExternalEvent],
    ) -> Result<(), ModellingError> {
        self.internal_transition(ctx)?;
        self.external_transition(ctx, events)
    }

    /// Produce a snapshot value for a view; `None` means nothing to record.
    fn observation(&self, request: &ObservationRequest<'_>) -> Option<Value> {
        let _ = request;
        None
    }

    /// Called once when the run ends (or when the model is deleted).
    fn finish(&mut self) {}

    fn is_executive(&self) -> bool {
        self.kind() == DynamicsKind::Executive
    }

    fn is_observer(&self) -> bool {
        self.kind() == DynamicsKind::Observer
    }
}

/// Arguments handed to a dynamics factory when a simulator is built.
pub struct DynamicsInit<'a> {
    /// Full path of the model being instantiated.
    pub path: &'a str,
    /// Merged condition payload.
    pub conditions: &'a Map,
}

pub type DynamicsFactory =
    Arc<dyn Fn(&DynamicsInit<'_>) -> Result<Box<dyn Dynamics>, ModellingError> + Send + Sync>;

pub type OutputFactory =
    Arc<dyn Fn(&Map) -> Box<dyn urverk_output::OutputPlugin> + Send + Sync>;

/// The factory symbols a module may expose: exactly one of
/// `make_dynamics`, `make_executive`, `make_observer`, `make_output`.
#[derive(Clone)]
pub enum ModuleSymbol {
    Dynamics(DynamicsFactory),
    Executive(DynamicsFactory),
    Observer(DynamicsFactory),
    Output(OutputFactory),
}

impl ModuleSymbol {
    pub fn symbol_name(&self) -> &'static str {
        match self {
            ModuleSymbol::Dynamics(_) => "make_dynamics",
            ModuleSymbol::Executive(_) => "make_executive",
            ModuleSymbol::Observer(_) => "make_observer",
            ModuleSymbol::Output(_) => "make_output",
        }
    }
}

/// Convenience for registering a dynamics factory from a closure.
pub fn dynamics_factory<F>(f: F) -> DynamicsFactory
where
    F: Fn(&DynamicsInit<'_>) -> Result<Box<dyn Dynamics>, ModellingError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// One snapshot produced by an event view.
#[derive(Clone, Debug)]
pub struct Observation {
    pub view: ViewId,
    pub port: String,
    pub time: Time,
    pub value: Option<Value>,
}

/// Shared buffer between an [`ObserverDynamics`] wrapper and the simulator
/// record that drains it after each lifecycle call.
pub type ObservationSink = Rc<RefCell<Vec<Observation>>>;

/// Wraps another dynamics to serve *event* views: after every lifecycle
/// call it queries `observation` for each bound `(view, port)` pair and
/// pushes the snapshot into the shared sink.
pub struct ObserverDynamics {
    inner: Box<dyn Dynamics>,
    bindings: Vec<(ViewId, String, String)>, // (view, view name, port)
    sink: ObservationSink,
    last_time: Time,
}

impl ObserverDynamics {
    pub fn new(
        inner: Box<dyn Dynamics>,
        bindings: Vec<(ViewId, String, String)>,
        sink: ObservationSink,
    ) -> Self {
        Self {
            inner,
            bindings,
            sink,
            last_time: Time::ZERO,
        }
    }

    fn snapshot(&mut self, time: Time) {
        self.last_time = time;
        for (view, view_name, port) in &self.bindings {
            let request = ObservationRequest {
                view: view_name,
                port,
                time,
            };
            let value = self.inner.observation(&request);
            self.sink.borrow_mut().push(Observation {
                view: *view,
                port: port.clone(),
                time,
                value,
            });
        }
    }
}

impl Dynamics for ObserverDynamics {
    fn kind(&self) -> DynamicsKind {
        self.inner.kind()
    }

    fn init(&mut self, ctx: &mut DynamicsContext<'_>) -> Result<Time, ModellingError> {
        let tau = self.inner.init(ctx)?;
        self.snapshot(ctx.time());
        Ok(tau)
    }

    fn time_advance(&self) -> Time {
        self.inner.time_advance()
    }

    fn output(
        &mut self,
        ctx: &mut DynamicsContext<'_>,
        output: &mut OutputEvents,
    ) -> Result<(), ModellingError> {
        self.inner.output(ctx, output)
    }

    fn internal_transition(&mut self, ctx: &mut DynamicsContext<'_>) -> Result<(), ModellingError> {
        self.inner.internal_transition(ctx)?;
        self.snapshot(ctx.time());
        Ok(())
    }

    fn external_transition(
        &mut self,
        ctx: &mut DynamicsContext<'_>,
        events: &[ExternalEvent],
    ) -> Result<(), ModellingError> {
        self.inner.external_transition(ctx, events)?;
        self.snapshot(ctx.time());
        Ok(())
    }

    fn confluent_transition(
        &mut self,
        ctx: &mut DynamicsContext<'_>,
        events: &[ExternalEvent],
    ) -> Result<(), ModellingError> {
        self.inner.confluent_transition(ctx, events)?;
        self.snapshot(ctx.time());
        Ok(())
    }

    fn observation(&self, request: &ObservationRequest<'_>) -> Option<Value> {
        self.inner.observation(request)
    }

    fn finish(&mut self) {
        self.inner.finish();
        self.snapshot(self.last_time);
    }
}

/// Logs every lifecycle call with the current time and model path, the way
/// a debug build of a model library would.
pub struct TracedDynamics {
    inner: Box<dyn Dynamics>,
}

impl TracedDynamics {
    pub fn new(inner: Box<dyn Dynamics>) -> Self {
        Self { inner }
    }
}

impl Dynamics for TracedDynamics {
    fn kind(&self) -> DynamicsKind {
        self.inner.kind()
    }

    fn init(&mut self, ctx: &mut DynamicsContext<'_>) -> Result<Time, ModellingError> {
        let tau = self.inner.init(ctx)?;
        debug!(model = ctx.model_path(), t = %ctx.time(), tau = %tau, "init");
        Ok(tau)
    }

    fn time_advance(&self) -> Time {
        self.inner.time_advance()
    }

    fn output(
        &mut self,
        ctx: &mut DynamicsContext<'_>,
        output: &mut OutputEvents,
    ) -> Result<(), ModellingError> {
        debug!(model = ctx.model_path(), t = %ctx.time(), "output");
        self.inner.output(ctx, output)
    }

    fn internal_transition(&mut self, ctx: &mut DynamicsContext<'_>) -> Result<(), ModellingError> {
        debug!(model = ctx.model_path(), t = %ctx.time(), "internal transition");
        self.inner.internal_transition(ctx)
    }

    fn external_transition(
        &mut self,
        ctx: &mut DynamicsContext<'_>,
        events: &[ExternalEvent],
    ) -> Result<(), ModellingError> {
        debug!(
            model = ctx.model_path(),
            t = %ctx.time(),
            events = events.len(),
            "external transition"
        );
        self.inner.external_transition(ctx, events)
    }

    fn confluent_transition(
        &mut self,
        ctx: &mut DynamicsContext<'_>,
        events: &[ExternalEvent],
    ) -> Result<(), ModellingError> {
        debug!(
            model = ctx.model_path(),
            t = %ctx.time(),
            events = events.len(),
            "confluent transition"
        );
        self.inner.confluent_transition(ctx, events)
    }

    fn observation(&self, request: &ObservationRequest<'_>) -> Option<Value> {
        self.inner.observation(request)
    }

    fn finish(&mut self) {
        self.inner.finish();
    }
}
