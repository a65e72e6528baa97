//! ## urverk-kernel::coordinator
//! **The driver loop**
//!
//! Repeatedly pops the soonest bag, collects λ outputs, routes them through
//! the graph into external inboxes, folds those back into the bag (internal
//! plus external at one instant is a single confluent activation), applies
//! transitions in bag order, then fires due observations. Executives record
//! structural changes during their transition; the changes are applied as
//! soon as the transition returns, still inside the bag.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use slab::Slab;
use tracing::{debug, info, instrument, warn};

use urverk_core::time::Time;
use urverk_core::value::{Map, Matrix};
use urverk_graph::{AtomicSpec, ModelGraph, ModelId, RouteCache};
use urverk_loader::ModuleRegistry;
use urverk_output::{OutputPlugin, Record, ViewKind, ViewSet};
use urverk_telemetry::MetricsRecorder;

use crate::dynamics::{
    DynamicsContext, DynamicsInit, ModuleSymbol, ObservationRequest, ObserverDynamics,
    TracedDynamics,
};
use crate::error::KernelError;
use crate::event::{ExternalEvent, OutputEvent, OutputEvents};
use crate::event_table::{Bag, BagKind, EventTable, ObservationDue};
use crate::executive::{StructuralChange, StructuralChanges};
use crate::simulator::{Simulator, SimulatorId};

/// Input ports with this name take the synchronous-request path.
pub const REQUEST_PORT: &str = "request";

/// Resolution of a dynamics catalogue entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DynamicsRef {
    pub package: String,
    pub library: String,
}

/// Port → view-name bindings of one observable catalogue entry.
pub type Observable = BTreeMap<String, Vec<String>>;

/// The scenario catalogues the kernel needs at build time.
#[derive(Clone, Debug, Default)]
pub struct Catalogues {
    pub dynamics: BTreeMap<String, DynamicsRef>,
    pub conditions: BTreeMap<String, Map>,
    pub observables: BTreeMap<String, Observable>,
}

#[derive(Clone, Copy, Debug)]
pub struct KernelSettings {
    pub t_begin: Time,
    pub t_end: Time,
    /// Wrap every dynamics in a call-logging shell.
    pub trace_models: bool,
}

impl Default for KernelSettings {
    fn default() -> Self {
        Self {
            t_begin: Time::ZERO,
            t_end: Time::INFINITY,
            trace_models: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Stopped,
    Failed { error: String },
}

/// What a run hands back: counters, final status, the observation-stream
/// digest and each view's aggregated result.
#[derive(Debug)]
pub struct RunSummary {
    pub t_final: Time,
    pub bags: u64,
    pub transitions: u64,
    pub observations: u64,
    pub status: RunStatus,
    pub digest: String,
    pub results: Vec<(String, Option<Matrix>)>,
}

impl RunSummary {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

pub struct Coordinator {
    graph: ModelGraph,
    catalogues: Catalogues,
    registry: Arc<ModuleRegistry<ModuleSymbol>>,
    settings: KernelSettings,
    sims: Slab<Simulator>,
    by_model: HashMap<ModelId, SimulatorId>,
    table: EventTable,
    routes: RouteCache,
    views: ViewSet,
    metrics: MetricsRecorder,
    next_order: u64,
    t_current: Time,
    bags: u64,
    transitions: u64,
    initialised: bool,
    stop_requested: bool,
    status: Option<RunStatus>,
}

impl Coordinator {
    pub fn new(
        graph: ModelGraph,
        catalogues: Catalogues,
        registry: Arc<ModuleRegistry<ModuleSymbol>>,
        settings: KernelSettings,
        metrics: MetricsRecorder,
    ) -> Self {
        let t_begin = settings.t_begin;
        Self {
            graph,
            catalogues,
            registry,
            settings,
            sims: Slab::new(),
            by_model: HashMap::new(),
            table: EventTable::new(t_begin),
            routes: RouteCache::new(),
            views: ViewSet::new(),
            metrics,
            next_order: 0,
            t_current: t_begin,
            bags: 0,
            transitions: 0,
            initialised: false,
            stop_requested: false,
            status: None,
        }
    }

    /// Attaches a view before the run starts. Returns the id models'
    /// observables will bind against.
    pub fn add_view(
        &mut self,
        name: impl Into<String>,
        kind: ViewKind,
        plugin: Box<dyn OutputPlugin>,
        config: &Map,
    ) -> urverk_output::ViewId {
        self.views.add_view(name, kind, plugin, config)
    }

    pub fn graph(&self) -> &ModelGraph {
        &self.graph
    }

    pub fn current_time(&self) -> Time {
        self.t_current
    }

    pub fn simulator_count(&self) -> usize {
        self.sims.len()
    }

    /// The recorder this run feeds; `gather` renders it as Prometheus text.
    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    pub fn scheduled_event_count(&self) -> usize {
        self.table.event_count()
    }

    pub fn find_simulator(&self, path: &str) -> Option<SimulatorId> {
        let model = self.graph.find(path).ok()?;
        self.by_model.get(&model).copied()
    }

    /// Asks the kernel to stop after the bag in flight; honoured by the
    /// next [`Coordinator::step`].
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// Rebounds how many idle event buffers the scheduler pool keeps
    /// between bags.
    pub fn set_pool_retention(&mut self, retention: usize) {
        self.table.set_pool_retention(retention);
    }

    /// Builds a simulator for every atomic model and schedules the timed
    /// views. Load-time failures abort here, before any bag runs.
    #[instrument(skip(self), fields(t_begin = %self.settings.t_begin))]
    pub fn initialise(&mut self) -> Result<(), KernelError> {
        if self.initialised {
            return Ok(());
        }
        info!("initialising simulators");
        for model in self.graph.atomics() {
            self.build_simulator(model, None)?;
        }
        self.initialised = true;
        debug!(simulators = self.sims.len(), "initialisation complete");
        Ok(())
    }

    /// Executes one bag. `Ok(true)` means there is more work before
    /// `t_end`; `Ok(false)` means the loop is done.
    pub fn step(&mut self) -> Result<bool, KernelError> {
        if !self.initialised {
            return Err(KernelError::InternalInvariant(
                "step before initialise".into(),
            ));
        }
        if self.stop_requested {
            self.status = Some(RunStatus::Stopped);
            return Ok(false);
        }
        let t = self.table.next_time();
        if t.is_infinite() || t > self.settings.t_end {
            return Ok(false);
        }
        let mut bag = self.table.pop_bag();
        self.bags += 1;
        self.metrics.bags_total.inc();
        self.t_current = t;

        if bag.is_observation_only() {
            let due = std::mem::take(&mut bag.observations);
            for obs in due {
                self.fire_observation(obs)?;
            }
            self.views.flush_bag();
            return Ok(true);
        }

        self.run_lambda_phase(&bag)?;
        self.table.absorb_pending(&mut bag);
        self.metrics.bag_size.observe(bag.transitions.len() as f64);
        self.run_transition_phase(&mut bag)?;

        for obs in self.table.pop_observations_due(t) {
            self.fire_observation(obs)?;
        }
        self.views.flush_bag();
        Ok(true)
    }

    /// Batch run to completion: initialise, drain bags, finalise. Run-time
    /// model failures produce a `Failed` summary with partial results;
    /// anything else propagates as an error.
    pub fn run(&mut self) -> Result<RunSummary, KernelError> {
        self.initialise()?;
        loop {
            match self.step() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(err) if err.is_run_failure() => {
                    warn!(%err, "run failed, abandoning current bag");
                    self.status = Some(RunStatus::Failed {
                        error: err.to_string(),
                    });
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(self.finalise())
    }

    /// Fires finish views, calls `finish` on every surviving simulator and
    /// collects plug-in results.
    pub fn finalise(&mut self) -> RunSummary {
        let status = self.status.clone().unwrap_or(RunStatus::Completed);
        let t_final = if status == RunStatus::Completed && self.settings.t_end.is_finite() {
            self.settings.t_end
        } else {
            self.t_current
        };

        let mut order: Vec<SimulatorId> = self
            .sims
            .iter()
            .map(|(key, _)| SimulatorId(key))
            .collect();
        order.sort_by_key(|id| self.sims[id.index()].order);

        for &id in &order {
            self.fire_finish_views(id, t_final);
        }
        for &id in &order {
            self.sims[id.index()].dynamics.finish();
            self.drain_observer(id);
        }
        self.views.flush_bag();
        let results = self.views.finish(t_final);

        info!(
            bags = self.bags,
            transitions = self.transitions,
            observations = self.views.records_flushed(),
            t_final = %t_final,
            "run finalised"
        );
        RunSummary {
            t_final,
            bags: self.bags,
            transitions: self.transitions,
            observations: self.views.records_flushed(),
            status,
            digest: self.views.digest_hex(),
            results,
        }
    }

    // ---- simulator construction -------------------------------------------

    fn merged_conditions(
        &self,
        spec: &AtomicSpec,
        extra: Option<&Map>,
    ) -> Result<Map, KernelError> {
        let mut merged = Map::new();
        for name in &spec.conditions {
            let condition = self.catalogues.conditions.get(name).ok_or_else(|| {
                KernelError::Binding(format!("condition catalogue has no entry '{name}'"))
            })?;
            for (key, value) in condition.iter() {
                merged.insert(key, value.clone());
            }
        }
        if let Some(extra) = extra {
            for (key, value) in extra.iter() {
                merged.insert(key, value.clone());
            }
        }
        Ok(merged)
    }

    /// Resolves the behaviour descriptor, constructs and wraps the
    /// dynamics, registers the simulator and schedules its first internal.
    fn build_simulator(
        &mut self,
        model: ModelId,
        extra_conditions: Option<&Map>,
    ) -> Result<SimulatorId, KernelError> {
        let spec = self
            .graph
            .node(model)?
            .atomic_spec()
            .cloned()
            .ok_or_else(|| {
                KernelError::InternalInvariant(format!("{model} is not an atomic model"))
            })?;
        let path = self.graph.path_of(model)?;

        let dynamics_ref = self
            .catalogues
            .dynamics
            .get(&spec.dynamics)
            .cloned()
            .ok_or_else(|| {
                KernelError::Binding(format!(
                    "dynamics catalogue has no entry '{}' (model '{path}')",
                    spec.dynamics
                ))
            })?;
        let module = self
            .registry
            .resolve(&dynamics_ref.package, &dynamics_ref.library)?;

        let conditions = self.merged_conditions(&spec, extra_conditions)?;
        let init_args = DynamicsInit {
            path: &path,
            conditions: &conditions,
        };
        let (built, mut executive) = match &module.symbol {
            ModuleSymbol::Dynamics(factory) | ModuleSymbol::Observer(factory) => {
                (factory(&init_args), false)
            }
            ModuleSymbol::Executive(factory) => (factory(&init_args), true),
            ModuleSymbol::Output(_) => {
                return Err(KernelError::Load(urverk_loader::LoadError::SymbolMissing {
                    package: dynamics_ref.package.clone(),
                    library: dynamics_ref.library.clone(),
                    symbol: "make_dynamics".into(),
                }))
            }
        };
        let mut dynamics = built.map_err(|source| KernelError::Modelling {
            model: path.clone(),
            source,
        })?;
        executive = executive || dynamics.is_executive();

        if self.settings.trace_models {
            dynamics = Box::new(TracedDynamics::new(dynamics));
        }

        // resolve observable bindings before wrapping, so event views get
        // their observer shell
        let mut bindings: Vec<(urverk_output::ViewId, String, ViewKind)> = Vec::new();
        let mut event_bindings = Vec::new();
        if let Some(observable) = &spec.observables {
            let ports = self
                .catalogues
                .observables
                .get(observable)
                .cloned()
                .ok_or_else(|| {
                    KernelError::Binding(format!(
                        "observable catalogue has no entry '{observable}' (model '{path}')"
                    ))
                })?;
            for (port, view_names) in ports {
                for view_name in view_names {
                    let view = self.views.lookup(&view_name).ok_or_else(|| {
                        KernelError::Binding(format!(
                            "observable '{observable}' references unknown view '{view_name}'"
                        ))
                    })?;
                    let kind = self.views.view(view).kind();
                    if kind == ViewKind::Event {
                        event_bindings.push((view, view_name.clone(), port.clone()));
                    }
                    bindings.push((view, port.clone(), kind));
                }
            }
        }

        let mut observations = None;
        if !event_bindings.is_empty() {
            let sink: crate::dynamics::ObservationSink = Default::default();
            observations = Some(std::rc::Rc::clone(&sink));
            dynamics = Box::new(ObserverDynamics::new(dynamics, event_bindings, sink));
        }

        let order = self.next_order;
        self.next_order += 1;
        let t = self.t_current;
        let key = self.sims.insert(Simulator {
            model,
            path: path.clone(),
            dynamics,
            t_last: t,
            t_next: Time::INFINITY,
            order,
            executive,
            observations,
            bindings: bindings.clone(),
        });
        let id = SimulatorId(key);
        self.by_model.insert(model, id);
        self.table.register(id, order, executive);

        for (view, port, _) in &bindings {
            self.views.declare_observable(*view, &path, port);
        }

        // init: obtain the first τ, then schedule
        let (tau, changes) = {
            let sim = &mut self.sims[key];
            let mut changes = StructuralChanges::default();
            let recorder = if sim.executive {
                Some(&mut changes)
            } else {
                None
            };
            let Simulator { dynamics, path, .. } = sim;
            let mut ctx = DynamicsContext::new(t, path.as_str(), recorder);
            let tau = dynamics.init(&mut ctx).map_err(|source| {
                KernelError::Modelling {
                    model: path.clone(),
                    source,
                }
            })?;
            (tau, changes)
        };
        let t_next = t + tau;
        self.sims[key].t_next = t_next;
        self.table.schedule_internal(id, t_next)?;
        self.drain_observer(id);
        debug!(model = %path, order, %t_next, executive, "simulator built");

        self.schedule_timed_views(id, &bindings, t)?;
        if !changes.is_empty() {
            self.apply_structural(id, changes)?;
        }
        Ok(id)
    }

    /// Timed firings start at `t_begin`; a model created later joins at the
    /// first grid point strictly after its creation time.
    fn schedule_timed_views(
        &mut self,
        id: SimulatorId,
        bindings: &[(urverk_output::ViewId, String, ViewKind)],
        t: Time,
    ) -> Result<(), KernelError> {
        let t_begin = self.settings.t_begin;
        for (view, port, kind) in bindings {
            if let ViewKind::Timed { step } = kind {
                let first = if t <= t_begin {
                    t_begin
                } else {
                    let elapsed = (t - t_begin).as_f64();
                    let k = (elapsed / step.as_f64()).floor() + 1.0;
                    t_begin + Time::new(k * step.as_f64())
                };
                if first <= self.settings.t_end {
                    self.table.schedule_observation(first, id, *view, port)?;
                }
            }
        }
        Ok(())
    }

    // ---- bag phases -------------------------------------------------------

    fn run_lambda_phase(&mut self, bag: &Bag) -> Result<(), KernelError> {
        let t = bag.time;
        for entry in &bag.transitions {
            if entry.kind == BagKind::External {
                continue;
            }
            let outputs = self.collect_outputs(entry.sim, t)?;
            if !outputs.is_empty() {
                let mut in_flight = vec![entry.sim];
                self.route_outputs(entry.sim, outputs, t, &mut in_flight)?;
            }
        }
        Ok(())
    }

    fn collect_outputs(
        &mut self,
        id: SimulatorId,
        t: Time,
    ) -> Result<Vec<OutputEvent>, KernelError> {
        let Some(sim) = self.sims.get_mut(id.index()) else {
            // destroyed earlier in this bag
            return Ok(Vec::new());
        };
        let Simulator { dynamics, path, .. } = sim;
        let mut collector = OutputEvents::new();
        let mut ctx = DynamicsContext::new(t, path.as_str(), None);
        dynamics
            .output(&mut ctx, &mut collector)
            .map_err(|source| KernelError::Modelling {
                model: path.clone(),
                source,
            })?;
        Ok(collector.into_vec())
    }

    /// Routes λ emissions into external inboxes. Destination ports named
    /// `request` are synchronous: the target's output runs immediately and
    /// its emissions route back before the delivery is queued.
    fn route_outputs(
        &mut self,
        src: SimulatorId,
        outputs: Vec<OutputEvent>,
        t: Time,
        in_flight: &mut Vec<SimulatorId>,
    ) -> Result<(), KernelError> {
        let (src_model, src_path) = {
            let sim = &self.sims[src.index()];
            (sim.model, sim.path.clone())
        };
        for output in outputs {
            let targets = self
                .routes
                .targets(&self.graph, src_model, &output.port)?;
            for target in targets.iter() {
                let Some(&dst) = self.by_model.get(&target.model) else {
                    continue;
                };
                let event = ExternalEvent {
                    port: target.port.clone(),
                    source: Some(src_path.clone()),
                    attributes: output.attributes.clone(),
                };
                if target.port == REQUEST_PORT {
                    if in_flight.contains(&dst) {
                        return Err(KernelError::RoutingCycle(
                            self.sims[dst.index()].path.clone(),
                        ));
                    }
                    in_flight.push(dst);
                    let nested = self.collect_outputs(dst, t)?;
                    self.route_outputs(dst, nested, t, in_flight)?;
                    in_flight.pop();
                    self.table.schedule_external(dst, vec![event], true)?;
                } else {
                    self.table.schedule_external(dst, vec![event], false)?;
                }
                self.metrics.events_routed_total.inc();
            }
        }
        Ok(())
    }

    fn run_transition_phase(&mut self, bag: &mut Bag) -> Result<(), KernelError> {
        let t = bag.time;
        for entry in &mut bag.transitions {
            let events = std::mem::take(&mut entry.events);
            self.apply_transition(entry.sim, entry.kind, events, t)?;
        }
        Ok(())
    }

    fn apply_transition(
        &mut self,
        id: SimulatorId,
        kind: BagKind,
        events: Vec<ExternalEvent>,
        t: Time,
    ) -> Result<(), KernelError> {
        let (tau, changes) = {
            let Some(sim) = self.sims.get_mut(id.index()) else {
                // deleted by an earlier executive in this bag
                return Ok(());
            };
            let executive = sim.executive;
            let mut changes = StructuralChanges::default();
            let recorder = if executive { Some(&mut changes) } else { None };
            let Simulator { dynamics, path, .. } = sim;
            let mut ctx = DynamicsContext::new(t, path.as_str(), recorder);
            let result = match kind {
                BagKind::Internal => dynamics.internal_transition(&mut ctx),
                BagKind::External => dynamics.external_transition(&mut ctx, &events),
                BagKind::Confluent => dynamics.confluent_transition(&mut ctx, &events),
            };
            result.map_err(|source| KernelError::Modelling {
                model: path.clone(),
                source,
            })?;
            (dynamics.time_advance(), changes)
        };

        let t_next = t + tau;
        {
            let sim = &mut self.sims[id.index()];
            sim.t_last = t;
            sim.t_next = t_next;
        }
        self.table.recycle(events);
        self.table.schedule_internal(id, t_next)?;
        self.transitions += 1;
        self.metrics.transitions_total.inc();
        self.drain_observer(id);
        if !changes.is_empty() {
            self.apply_structural(id, changes)?;
        }
        Ok(())
    }

    // ---- observations -----------------------------------------------------

    /// Moves event-view snapshots out of the observer wrapper's sink into
    /// the view buffers.
    fn drain_observer(&mut self, id: SimulatorId) {
        let Some(sim) = self.sims.get(id.index()) else {
            return;
        };
        let Some(sink) = sim.observations.clone() else {
            return;
        };
        let path = sim.path.clone();
        for obs in sink.borrow_mut().drain(..) {
            if let Some(value) = obs.value {
                self.metrics.observations_total.inc();
                self.views.record(
                    obs.view,
                    Record {
                        model: path.clone(),
                        port: obs.port,
                        time: obs.time,
                        value,
                    },
                );
            }
        }
    }

    fn fire_observation(&mut self, due: ObservationDue) -> Result<(), KernelError> {
        let view_name = self.views.view(due.view).name().to_string();
        let kind = self.views.view(due.view).kind();

        let observed = {
            let Some(sim) = self.sims.get(due.sim.index()) else {
                return Ok(());
            };
            let request = ObservationRequest {
                view: &view_name,
                port: &due.port,
                time: due.time,
            };
            sim.dynamics
                .observation(&request)
                .map(|value| (sim.path.clone(), value))
        };
        if let Some((path, value)) = observed {
            self.metrics.observations_total.inc();
            self.views.record(
                due.view,
                Record {
                    model: path,
                    port: due.port.clone(),
                    time: due.time,
                    value,
                },
            );
        }

        if let ViewKind::Timed { step } = kind {
            let next = due.time + step;
            if next <= self.settings.t_end {
                self.table
                    .schedule_observation(next, due.sim, due.view, due.port)?;
            }
        }
        Ok(())
    }

    fn fire_finish_views(&mut self, id: SimulatorId, t_final: Time) {
        let bindings = self.sims[id.index()].bindings.clone();
        for (view, port, kind) in bindings {
            if kind != ViewKind::Finish {
                continue;
            }
            let view_name = self.views.view(view).name().to_string();
            let observed = {
                let sim = &self.sims[id.index()];
                let request = ObservationRequest {
                    view: &view_name,
                    port: &port,
                    time: t_final,
                };
                sim.dynamics
                    .observation(&request)
                    .map(|value| (sim.path.clone(), value))
            };
            if let Some((path, value)) = observed {
                self.metrics.observations_total.inc();
                self.views.record(
                    view,
                    Record {
                        model: path,
                        port: port.clone(),
                        time: t_final,
                        value,
                    },
                );
            }
        }
    }

    // ---- executive bridge -------------------------------------------------

    fn resolve_in_scope(
        &self,
        parent: ModelId,
        parent_name: &str,
        name: &str,
    ) -> Result<ModelId, KernelError> {
        if name.is_empty() || name == parent_name {
            return Ok(parent);
        }
        for &child in self.graph.children(parent)? {
            if self.graph.node(child)?.name() == name {
                return Ok(child);
            }
        }
        Err(KernelError::Graph(urverk_graph::GraphError::NotFound(
            format!("{name} under {parent_name}"),
        )))
    }

    /// Applies the structural commands an executive recorded, in order.
    #[instrument(skip_all)]
    fn apply_structural(
        &mut self,
        exec: SimulatorId,
        mut changes: StructuralChanges,
    ) -> Result<(), KernelError> {
        let parent = {
            let model = self.sims[exec.index()].model;
            self.graph.node(model)?.parent().ok_or_else(|| {
                KernelError::InternalInvariant("executive with no parent coupled model".into())
            })?
        };
        let parent_name = self.graph.node(parent)?.name().to_string();

        for change in changes.drain() {
            match change {
                StructuralChange::CreateModel {
                    name,
                    dynamics,
                    conditions,
                    observables,
                    input_ports,
                    output_ports,
                    parameters,
                } => {
                    debug!(model = %name, "executive creates model");
                    let id = self.graph.add_atomic(
                        parent,
                        &name,
                        AtomicSpec {
                            dynamics,
                            conditions,
                            observables,
                        },
                    )?;
                    for port in &input_ports {
                        self.graph.add_input_port(id, port)?;
                    }
                    for port in &output_ports {
                        self.graph.add_output_port(id, port)?;
                    }
                    self.build_simulator(id, Some(&parameters))?;
                }
                StructuralChange::DeleteModel { name } => {
                    debug!(model = %name, "executive deletes model");
                    let target = self.resolve_in_scope(parent, &parent_name, &name)?;
                    if target == parent {
                        return Err(KernelError::Graph(
                            urverk_graph::GraphError::BadConnection(
                                "an executive cannot delete its own parent".into(),
                            ),
                        ));
                    }
                    self.delete_subtree(target)?;
                }
                StructuralChange::AddConnection {
                    src,
                    src_port,
                    dst,
                    dst_port,
                } => {
                    let s = self.resolve_in_scope(parent, &parent_name, &src)?;
                    let d = self.resolve_in_scope(parent, &parent_name, &dst)?;
                    self.graph.connect(s, &src_port, d, &dst_port)?;
                }
                StructuralChange::RemoveConnection {
                    src,
                    src_port,
                    dst,
                    dst_port,
                } => {
                    let s = self.resolve_in_scope(parent, &parent_name, &src)?;
                    let d = self.resolve_in_scope(parent, &parent_name, &dst)?;
                    self.graph.disconnect(s, &src_port, d, &dst_port)?;
                }
                StructuralChange::AddInputPort { model, port } => {
                    let m = self.resolve_in_scope(parent, &parent_name, &model)?;
                    self.graph.add_input_port(m, &port)?;
                }
                StructuralChange::AddOutputPort { model, port } => {
                    let m = self.resolve_in_scope(parent, &parent_name, &model)?;
                    self.graph.add_output_port(m, &port)?;
                }
                StructuralChange::RemoveInputPort { model, port } => {
                    let m = self.resolve_in_scope(parent, &parent_name, &model)?;
                    self.graph.remove_input_port(m, &port)?;
                }
                StructuralChange::RemoveOutputPort { model, port } => {
                    let m = self.resolve_in_scope(parent, &parent_name, &model)?;
                    self.graph.remove_output_port(m, &port)?;
                }
            }
        }
        Ok(())
    }

    /// Tears down every simulator under `model`, then the graph subtree:
    /// pending events are invalidated, `finish` runs once, observables are
    /// retired.
    fn delete_subtree(&mut self, model: ModelId) -> Result<(), KernelError> {
        let mut atomics = Vec::new();
        if self.graph.node(model)?.is_atomic() {
            atomics.push(model);
        } else {
            let mut stack = vec![model];
            while let Some(current) = stack.pop() {
                let node = self.graph.node(current)?;
                if node.is_atomic() {
                    atomics.push(current);
                } else {
                    stack.extend(self.graph.children(current)?.iter().copied());
                }
            }
        }

        for atomic in atomics {
            let Some(id) = self.by_model.remove(&atomic) else {
                continue;
            };
            self.table.delete(id)?;
            let mut sim = self.sims.remove(id.index());
            sim.dynamics.finish();
            for (view, port, _) in &sim.bindings {
                self.views.retire_observable(*view, &sim.path, port);
            }
            debug!(model = %sim.path, "simulator destroyed");
        }
        self.graph.remove(model)?;
        Ok(())
    }
}
