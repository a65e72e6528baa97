//! Two models exchanging ping/pong every time unit, observed through an
//! event view. Also exercises run-to-run determinism of the digest.

use std::sync::{Arc, Mutex};

use urverk_core::time::Time;
use urverk_core::value::{Map, Value};
use urverk_graph::{AtomicSpec, ModelGraph};
use urverk_kernel::{
    dynamics_factory, Catalogues, Coordinator, Dynamics, DynamicsContext, DynamicsRef,
    ExternalEvent, KernelSettings, ModellingError, ModuleSymbol, ObservationRequest,
    OutputEvents,
};
use urverk_loader::{ModuleRegistry, API_VERSION};
use urverk_telemetry::MetricsRecorder;
use urverk_output::{StorageOutput, ViewKind};

type PongLog = Arc<Mutex<Vec<f64>>>;

/// Emits "ping" one time unit after init and after every received "pong".
struct Pinger {
    tau: Time,
    pongs: PongLog,
}

impl Dynamics for Pinger {
    fn init(&mut self, _ctx: &mut DynamicsContext<'_>) -> Result<Time, ModellingError> {
        self.tau = Time::new(1.0);
        Ok(self.tau)
    }

    fn time_advance(&self) -> Time {
        self.tau
    }

    fn output(
        &mut self,
        _ctx: &mut DynamicsContext<'_>,
        output: &mut OutputEvents,
    ) -> Result<(), ModellingError> {
        output.emit_value("out", Value::String("ping".into()));
        Ok(())
    }

    fn internal_transition(&mut self, _ctx: &mut DynamicsContext<'_>) -> Result<(), ModellingError> {
        self.tau = Time::INFINITY;
        Ok(())
    }

    fn external_transition(
        &mut self,
        ctx: &mut DynamicsContext<'_>,
        events: &[ExternalEvent],
    ) -> Result<(), ModellingError> {
        for event in events {
            if event.on_port("in") {
                self.pongs.lock().unwrap().push(ctx.time().as_f64());
                self.tau = Time::new(1.0);
            }
        }
        Ok(())
    }
}

/// Replies "pong" immediately (τ = 0) to every "ping".
#[derive(Default)]
struct Ponger {
    pending: bool,
    just_emitted: bool,
}

impl Dynamics for Ponger {
    fn init(&mut self, _ctx: &mut DynamicsContext<'_>) -> Result<Time, ModellingError> {
        Ok(Time::INFINITY)
    }

    fn time_advance(&self) -> Time {
        if self.pending {
            Time::ZERO
        } else {
            Time::INFINITY
        }
    }

    fn output(
        &mut self,
        _ctx: &mut DynamicsContext<'_>,
        output: &mut OutputEvents,
    ) -> Result<(), ModellingError> {
        output.emit_value("out", Value::String("pong".into()));
        Ok(())
    }

    fn internal_transition(&mut self, _ctx: &mut DynamicsContext<'_>) -> Result<(), ModellingError> {
        self.pending = false;
        self.just_emitted = true;
        Ok(())
    }

    fn external_transition(
        &mut self,
        _ctx: &mut DynamicsContext<'_>,
        events: &[ExternalEvent],
    ) -> Result<(), ModellingError> {
        if events.iter().any(|e| e.on_port("in")) {
            self.pending = true;
        }
        self.just_emitted = false;
        Ok(())
    }

    fn observation(&self, request: &ObservationRequest<'_>) -> Option<Value> {
        (request.port == "out" && self.just_emitted)
            .then(|| Value::String("pong".into()))
    }
}

fn build(pongs: PongLog) -> Coordinator {
    let registry = ModuleRegistry::new();
    registry.register(
        "urverk.test",
        "pinger",
        API_VERSION,
        ModuleSymbol::Dynamics(dynamics_factory(move |_init| {
            Ok(Box::new(Pinger {
                tau: Time::INFINITY,
                pongs: Arc::clone(&pongs),
            }))
        })),
    );
    registry.register(
        "urverk.test",
        "ponger",
        API_VERSION,
        ModuleSymbol::Dynamics(dynamics_factory(|_init| Ok(Box::new(Ponger::default())))),
    );

    let mut graph = ModelGraph::new("top");
    let a = graph
        .add_atomic(
            graph.root(),
            "a",
            AtomicSpec {
                dynamics: "pinger".into(),
                conditions: vec![],
                observables: None,
            },
        )
        .unwrap();
    let b = graph
        .add_atomic(
            graph.root(),
            "b",
            AtomicSpec {
                dynamics: "ponger".into(),
                conditions: vec![],
                observables: Some("pong_watch".into()),
            },
        )
        .unwrap();
    graph.add_output_port(a, "out").unwrap();
    graph.add_input_port(a, "in").unwrap();
    graph.add_output_port(b, "out").unwrap();
    graph.add_input_port(b, "in").unwrap();
    graph.connect(a, "out", b, "in").unwrap();
    graph.connect(b, "out", a, "in").unwrap();

    let mut catalogues = Catalogues::default();
    catalogues.dynamics.insert(
        "pinger".into(),
        DynamicsRef {
            package: "urverk.test".into(),
            library: "pinger".into(),
        },
    );
    catalogues.dynamics.insert(
        "ponger".into(),
        DynamicsRef {
            package: "urverk.test".into(),
            library: "ponger".into(),
        },
    );
    let mut observable = urverk_kernel::Observable::new();
    observable.insert("out".into(), vec!["events".into()]);
    catalogues
        .observables
        .insert("pong_watch".into(), observable);

    let mut coordinator = Coordinator::new(
        graph,
        catalogues,
        Arc::new(registry),
        KernelSettings {
            t_begin: Time::ZERO,
            t_end: Time::new(5.0),
            trace_models: false,
        },
        MetricsRecorder::new(),
    );
    coordinator.add_view(
        "events",
        ViewKind::Event,
        Box::new(StorageOutput::new()),
        &Map::new(),
    );
    coordinator
}

#[test]
fn pong_arrives_once_per_time_unit() {
    let pongs: PongLog = Arc::default();
    let mut kernel = build(Arc::clone(&pongs));
    let summary = kernel.run().unwrap();

    assert!(summary.succeeded());
    assert_eq!(*pongs.lock().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
}

#[test]
fn event_view_records_each_pong() {
    let pongs: PongLog = Arc::default();
    let mut kernel = build(pongs);
    let summary = kernel.run().unwrap();

    let (name, matrix) = &summary.results[0];
    assert_eq!(name, "events");
    let matrix = matrix.as_ref().expect("storage returns a matrix");

    // one row per pong emission, time column then b's out column
    let times: Vec<f64> = (0..matrix.rows())
        .filter_map(|row| match matrix.get(0, row).unwrap() {
            Value::Double(t) => Some(*t),
            _ => None,
        })
        .collect();
    assert_eq!(times, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    for row in 0..matrix.rows() {
        assert_eq!(
            matrix.get(1, row).unwrap(),
            &Value::String("pong".into())
        );
    }
}

#[test]
fn identical_runs_yield_identical_digests() {
    let run = || {
        let mut kernel = build(Arc::default());
        kernel.run().unwrap()
    };
    let first = run();
    let second = run();
    assert_eq!(first.digest, second.digest);
    assert_eq!(first.bags, second.bags);
    assert_eq!(first.transitions, second.transitions);
    assert!(first.observations > 0);
}
