//! ## urverk-telemetry::metrics
//! **Prometheus recorder for kernel runs**

use prometheus::{Counter, Histogram, HistogramOpts, Registry};

#[derive(Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub bags_total: Counter,
    pub transitions_total: Counter,
    pub events_routed_total: Counter,
    pub observations_total: Counter,
    pub bag_size: Histogram,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let registry = Registry::new();
        let bags_total =
            Counter::new("urverk_bags_total", "Event bags processed").unwrap();
        let transitions_total = Counter::new(
            "urverk_transitions_total",
            "Atomic-model transitions fired",
        )
        .unwrap();
        let events_routed_total = Counter::new(
            "urverk_events_routed_total",
            "External events routed between simulators",
        )
        .unwrap();
        let observations_total = Counter::new(
            "urverk_observations_total",
            "Observation records flushed to output plug-ins",
        )
        .unwrap();
        let bag_size = Histogram::with_opts(
            HistogramOpts::new("urverk_bag_size", "Simulators activated per bag")
                .buckets(vec![1.0, 2.0, 4.0, 8.0, 16.0, 64.0, 256.0]),
        )
        .unwrap();

        registry.register(Box::new(bags_total.clone())).unwrap();
        registry
            .register(Box::new(transitions_total.clone()))
            .unwrap();
        registry
            .register(Box::new(events_routed_total.clone()))
            .unwrap();
        registry
            .register(Box::new(observations_total.clone()))
            .unwrap();
        registry.register(Box::new(bag_size.clone())).unwrap();

        Self {
            registry,
            bags_total,
            transitions_total,
            events_routed_total,
            observations_total,
            bag_size,
        }
    }

    pub fn gather(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_gather() {
        let metrics = MetricsRecorder::new();
        metrics.bags_total.inc();
        metrics.transitions_total.inc_by(4.0);
        metrics.events_routed_total.inc_by(2.0);
        let text = metrics.gather().unwrap();
        assert!(text.contains("urverk_bags_total 1"));
        assert!(text.contains("urverk_transitions_total 4"));
        assert!(text.contains("urverk_events_routed_total 2"));
    }
}
