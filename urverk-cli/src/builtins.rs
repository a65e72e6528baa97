//! ## urverk-cli::builtins
//! **The bundled model package**
//!
//! A small `urverk.builtin` package so scenario files run out of the box:
//! a periodic (optionally randomised) generator, a delaying relay and a
//! counting sink. Real model libraries register the same way from host
//! code.

use std::collections::VecDeque;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use urverk_core::time::Time;
use urverk_core::value::Value;
use urverk_kernel::{
    dynamics_factory, Dynamics, DynamicsContext, ExternalEvent, ModellingError, ModuleSymbol,
    ObservationRequest, OutputEvents,
};
use urverk_loader::{ModuleRegistry, API_VERSION};

pub const PACKAGE: &str = "urverk.builtin";

/// Emits a running count on `out`. `period` sets the pace; with
/// `random: true` each gap is drawn uniformly from `(0, period]` using the
/// experiment seed, so replicas differ but reruns do not.
struct Generator {
    period: f64,
    random: bool,
    rng: StdRng,
    tau: Time,
    count: i64,
}

impl Generator {
    fn next_gap(&mut self) -> Time {
        if self.random {
            Time::new(self.rng.random_range(f64::EPSILON..=self.period))
        } else {
            Time::new(self.period)
        }
    }
}

impl Dynamics for Generator {
    fn init(&mut self, _ctx: &mut DynamicsContext<'_>) -> Result<Time, ModellingError> {
        self.tau = self.next_gap();
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
        output.emit_value("out", Value::Integer(self.count + 1));
        Ok(())
    }

    fn internal_transition(&mut self, _ctx: &mut DynamicsContext<'_>) -> Result<(), ModellingError> {
        self.count += 1;
        self.tau = self.next_gap();
        Ok(())
    }

    fn external_transition(
        &mut self,
        _ctx: &mut DynamicsContext<'_>,
        _events: &[ExternalEvent],
    ) -> Result<(), ModellingError> {
        Ok(())
    }

    fn observation(&self, request: &ObservationRequest<'_>) -> Option<Value> {
        (request.port == "count").then_some(Value::Integer(self.count))
    }
}

/// Forwards whatever arrives on `in` to `out` after `delay` time units.
struct Relay {
    delay: f64,
    pending: VecDeque<Value>,
    tau: Time,
}

impl Dynamics for Relay {
    fn init(&mut self, _ctx: &mut DynamicsContext<'_>) -> Result<Time, ModellingError> {
        Ok(Time::INFINITY)
    }

    fn time_advance(&self) -> Time {
        self.tau
    }

    fn output(
        &mut self,
        _ctx: &mut DynamicsContext<'_>,
        output: &mut OutputEvents,
    ) -> Result<(), ModellingError> {
        if let Some(value) = self.pending.front() {
            output.emit_value("out", value.clone());
        }
        Ok(())
    }

    fn internal_transition(&mut self, _ctx: &mut DynamicsContext<'_>) -> Result<(), ModellingError> {
        self.pending.pop_front();
        self.tau = if self.pending.is_empty() {
            Time::INFINITY
        } else {
            Time::new(self.delay)
        };
        Ok(())
    }

    fn external_transition(
        &mut self,
        _ctx: &mut DynamicsContext<'_>,
        events: &[ExternalEvent],
    ) -> Result<(), ModellingError> {
        for event in events {
            if event.on_port("in") {
                let value = event
                    .attribute("value")
                    .cloned()
                    .unwrap_or(Value::Null);
                self.pending.push_back(value);
            }
        }
        if !self.pending.is_empty() {
            self.tau = Time::new(self.delay);
        }
        Ok(())
    }

    fn observation(&self, request: &ObservationRequest<'_>) -> Option<Value> {
        (request.port == "pending").then_some(Value::Integer(self.pending.len() as i64))
    }
}

/// Counts events on `in`; purely passive otherwise.
struct Counter {
    count: i64,
}

impl Dynamics for Counter {
    fn init(&mut self, _ctx: &mut DynamicsContext<'_>) -> Result<Time, ModellingError> {
        Ok(Time::INFINITY)
    }

    fn time_advance(&self) -> Time {
        Time::INFINITY
    }

    fn internal_transition(&mut self, _ctx: &mut DynamicsContext<'_>) -> Result<(), ModellingError> {
        Ok(())
    }

    fn external_transition(
        &mut self,
        _ctx: &mut DynamicsContext<'_>,
        events: &[ExternalEvent],
    ) -> Result<(), ModellingError> {
        self.count += events.iter().filter(|e| e.on_port("in")).count() as i64;
        Ok(())
    }

    fn observation(&self, request: &ObservationRequest<'_>) -> Option<Value> {
        (request.port == "count").then_some(Value::Integer(self.count))
    }
}

fn double_or(conditions: &urverk_core::value::Map, key: &str, default: f64) -> Result<f64, ModellingError> {
    match conditions.get(key) {
        Some(value) => Ok(value.as_double()?),
        None => Ok(default),
    }
}

fn bool_or(conditions: &urverk_core::value::Map, key: &str, default: bool) -> Result<bool, ModellingError> {
    match conditions.get(key) {
        Some(value) => Ok(value.as_boolean()?),
        None => Ok(default),
    }
}

/// Registers the builtin package on a registry.
pub fn register(registry: &Arc<ModuleRegistry<ModuleSymbol>>) {
    registry.register(
        PACKAGE,
        "generator",
        API_VERSION,
        ModuleSymbol::Dynamics(dynamics_factory(|init| {
            let period = double_or(init.conditions, "period", 1.0)?;
            if period <= 0.0 {
                return Err(ModellingError::new("generator period must be positive"));
            }
            let random = bool_or(init.conditions, "random", false)?;
            let seed = match init.conditions.get("seed") {
                Some(value) => value.as_integer()? as u64,
                None => 0,
            };
            Ok(Box::new(Generator {
                period,
                random,
                rng: StdRng::seed_from_u64(seed),
                tau: Time::INFINITY,
                count: 0,
            }))
        })),
    );
    registry.register(
        PACKAGE,
        "relay",
        API_VERSION,
        ModuleSymbol::Dynamics(dynamics_factory(|init| {
            let delay = double_or(init.conditions, "delay", 0.0)?;
            Ok(Box::new(Relay {
                delay,
                pending: VecDeque::new(),
                tau: Time::INFINITY,
            }))
        })),
    );
    registry.register(
        PACKAGE,
        "counter",
        API_VERSION,
        ModuleSymbol::Dynamics(dynamics_factory(|_| Ok(Box::new(Counter { count: 0 })))),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use urverk_core::value::Map;
    use urverk_kernel::DynamicsInit;

    fn build(library: &str, conditions: Map) -> Box<dyn Dynamics> {
        let registry = Arc::new(ModuleRegistry::new());
        register(&registry);
        let module = registry.resolve(PACKAGE, library).unwrap();
        let ModuleSymbol::Dynamics(factory) = module.symbol else {
            panic!("builtin '{library}' is not a dynamics symbol");
        };
        factory(&DynamicsInit {
            path: "top/test",
            conditions: &conditions,
        })
        .unwrap()
    }

    #[test]
    fn generator_paces_by_period() {
        let mut conditions = Map::new();
        conditions.insert("period", Value::Double(2.5));
        let mut generator = build("generator", conditions);
        let mut ctx = DynamicsContext::new(Time::ZERO, "top/test", None);
        assert_eq!(generator.init(&mut ctx).unwrap(), Time::new(2.5));
    }

    #[test]
    fn generator_rejects_bad_period() {
        let registry = Arc::new(ModuleRegistry::new());
        register(&registry);
        let module = registry.resolve(PACKAGE, "generator").unwrap();
        let ModuleSymbol::Dynamics(factory) = module.symbol else {
            panic!("generator is not a dynamics symbol");
        };
        let mut conditions = Map::new();
        conditions.insert("period", Value::Double(0.0));
        assert!(factory(&DynamicsInit {
            path: "top/test",
            conditions: &conditions,
        })
        .is_err());
    }

    #[test]
    fn relay_queues_and_drains() {
        let mut conditions = Map::new();
        conditions.insert("delay", Value::Double(0.5));
        let mut relay = build("relay", conditions);
        let mut ctx = DynamicsContext::new(Time::ZERO, "top/test", None);
        relay.init(&mut ctx).unwrap();
        assert!(relay.time_advance().is_infinite());

        let event = ExternalEvent {
            port: "in".into(),
            source: None,
            attributes: {
                let mut map = Map::new();
                map.insert("value", Value::Integer(9));
                map
            },
        };
        relay.external_transition(&mut ctx, &[event]).unwrap();
        assert_eq!(relay.time_advance(), Time::new(0.5));

        let mut out = OutputEvents::new();
        relay.output(&mut ctx, &mut out).unwrap();
        let events = out.into_vec();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].attributes.get("value"), Some(&Value::Integer(9)));

        relay.internal_transition(&mut ctx).unwrap();
        assert!(relay.time_advance().is_infinite());
    }

    #[test]
    fn seeded_generators_draw_identical_gaps() {
        let mut conditions = Map::new();
        conditions.insert("random", Value::Boolean(true));
        conditions.insert("seed", Value::Integer(11));
        let mut a = build("generator", conditions.clone());
        let mut b = build("generator", conditions);
        let mut ctx = DynamicsContext::new(Time::ZERO, "top/test", None);
        assert_eq!(a.init(&mut ctx).unwrap(), b.init(&mut ctx).unwrap());
    }
}
