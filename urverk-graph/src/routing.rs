//! ## urverk-graph::routing
//! **Output-port → atomic-input-port closure**
//!
//! Routing walks external-out connections upward, internal connections
//! sideways and external-in connections downward until only atomic input
//! ports remain. Connections may form cycles across coupled levels; the
//! traversal keeps a visited set so every `(model, port)` endpoint expands
//! once and the walk terminates.
//!
//! Results are memoised per source port. The cache compares the graph
//! revision on every lookup, so any graph mutation (including ones performed
//! by an executive mid-run) invalidates it wholesale.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::trace;

use crate::error::GraphError;
use crate::model::{ModelGraph, ModelId};

/// A delivery endpoint: an input port on an atomic model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteTarget {
    pub model: ModelId,
    pub port: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Side {
    /// the value sits on a model's output port
    Out,
    /// the value sits on a model's input port
    In,
}

/// Memoised routing tables, keyed by `(source model, output port)`.
#[derive(Debug, Default)]
pub struct RouteCache {
    revision: u64,
    routes: HashMap<(ModelId, String), Arc<Vec<RouteTarget>>>,
}

impl RouteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Destinations reached from `model`'s output `port`. Recomputes lazily
    /// when the graph revision has moved.
    pub fn targets(
        &mut self,
        graph: &ModelGraph,
        model: ModelId,
        port: &str,
    ) -> Result<Arc<Vec<RouteTarget>>, GraphError> {
        if self.revision != graph.revision() {
            trace!(
                revision = graph.revision(),
                "graph changed, dropping routing cache"
            );
            self.routes.clear();
            self.revision = graph.revision();
        }
        if let Some(hit) = self.routes.get(&(model, port.to_string())) {
            return Ok(Arc::clone(hit));
        }
        let computed = Arc::new(compute_targets(graph, model, port)?);
        self.routes
            .insert((model, port.to_string()), Arc::clone(&computed));
        Ok(computed)
    }
}

fn compute_targets(
    graph: &ModelGraph,
    model: ModelId,
    port: &str,
) -> Result<Vec<RouteTarget>, GraphError> {
    let mut out = Vec::new();
    let mut visited: HashSet<(ModelId, String, Side)> = HashSet::new();
    let mut queue: VecDeque<(ModelId, String, Side)> = VecDeque::new();
    queue.push_back((model, port.to_string(), Side::Out));

    while let Some((m, p, side)) = queue.pop_front() {
        if !visited.insert((m, p.clone(), side)) {
            continue;
        }
        match side {
            Side::Out => {
                let Some(parent) = graph.node(m)?.parent() else {
                    // output ports of the root lead nowhere
                    continue;
                };
                let (internal, _, external_out) = graph.connections(parent)?;
                for c in internal {
                    if c.src == m && c.src_port == p {
                        queue.push_back((c.dst, c.dst_port.clone(), Side::In));
                    }
                }
                for c in external_out {
                    if c.src == m && c.src_port == p {
                        queue.push_back((c.dst, c.dst_port.clone(), Side::Out));
                    }
                }
            }
            Side::In => {
                let node = graph.node(m)?;
                if node.is_atomic() {
                    out.push(RouteTarget { model: m, port: p });
                } else {
                    let (_, external_in, _) = graph.connections(m)?;
                    for c in external_in {
                        if c.src_port == p {
                            queue.push_back((c.dst, c.dst_port.clone(), Side::In));
                        }
                    }
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AtomicSpec;

    #[test]
    fn routes_between_siblings() {
        let mut g = ModelGraph::new("top");
        let a = g.add_atomic(g.root(), "a", AtomicSpec::default()).unwrap();
        let b = g.add_atomic(g.root(), "b", AtomicSpec::default()).unwrap();
        g.add_output_port(a, "out").unwrap();
        g.add_input_port(b, "in").unwrap();
        g.connect(a, "out", b, "in").unwrap();

        let mut cache = RouteCache::new();
        let targets = cache.targets(&g, a, "out").unwrap();
        assert_eq!(
            targets.as_slice(),
            &[RouteTarget {
                model: b,
                port: "in".into()
            }]
        );
    }

    #[test]
    fn routes_across_coupled_boundaries() {
        // a (in sub1) -> sub1.out -> sub2.in -> b (in sub2)
        let mut g = ModelGraph::new("top");
        let sub1 = g.add_coupled(g.root(), "sub1").unwrap();
        let sub2 = g.add_coupled(g.root(), "sub2").unwrap();
        let a = g.add_atomic(sub1, "a", AtomicSpec::default()).unwrap();
        let b = g.add_atomic(sub2, "b", AtomicSpec::default()).unwrap();
        g.add_output_port(a, "out").unwrap();
        g.add_output_port(sub1, "out").unwrap();
        g.add_input_port(sub2, "in").unwrap();
        g.add_input_port(b, "in").unwrap();
        g.connect(a, "out", sub1, "out").unwrap();
        g.connect(sub1, "out", sub2, "in").unwrap();
        g.connect(sub2, "in", b, "in").unwrap();

        let mut cache = RouteCache::new();
        let targets = cache.targets(&g, a, "out").unwrap();
        assert_eq!(
            targets.as_slice(),
            &[RouteTarget {
                model: b,
                port: "in".into()
            }]
        );
    }

    #[test]
    fn fan_out_keeps_connection_order() {
        let mut g = ModelGraph::new("top");
        let a = g.add_atomic(g.root(), "a", AtomicSpec::default()).unwrap();
        let b = g.add_atomic(g.root(), "b", AtomicSpec::default()).unwrap();
        let c = g.add_atomic(g.root(), "c", AtomicSpec::default()).unwrap();
        g.add_output_port(a, "out").unwrap();
        g.add_input_port(b, "in").unwrap();
        g.add_input_port(c, "in").unwrap();
        g.connect(a, "out", c, "in").unwrap();
        g.connect(a, "out", b, "in").unwrap();

        let mut cache = RouteCache::new();
        let targets = cache.targets(&g, a, "out").unwrap();
        let order: Vec<ModelId> = targets.iter().map(|t| t.model).collect();
        assert_eq!(order, vec![c, b]);
    }

    #[test]
    fn unconnected_port_routes_nowhere() {
        let mut g = ModelGraph::new("top");
        let a = g.add_atomic(g.root(), "a", AtomicSpec::default()).unwrap();
        g.add_output_port(a, "out").unwrap();
        let mut cache = RouteCache::new();
        assert!(cache.targets(&g, a, "out").unwrap().is_empty());
    }

    #[test]
    fn cache_invalidates_on_mutation() {
        let mut g = ModelGraph::new("top");
        let a = g.add_atomic(g.root(), "a", AtomicSpec::default()).unwrap();
        let b = g.add_atomic(g.root(), "b", AtomicSpec::default()).unwrap();
        g.add_output_port(a, "out").unwrap();
        g.add_input_port(b, "in").unwrap();

        let mut cache = RouteCache::new();
        assert!(cache.targets(&g, a, "out").unwrap().is_empty());

        g.connect(a, "out", b, "in").unwrap();
        let targets = cache.targets(&g, a, "out").unwrap();
        assert_eq!(targets.len(), 1);
    }

    #[test]
    fn diamond_delivers_once_per_endpoint() {
        // a -> sub.in twice over two parallel connections; the closure still
        // lists the leaf endpoint once per distinct (model, port)
        let mut g = ModelGraph::new("top");
        let a = g.add_atomic(g.root(), "a", AtomicSpec::default()).unwrap();
        let sub = g.add_coupled(g.root(), "sub").unwrap();
        let leaf = g.add_atomic(sub, "leaf", AtomicSpec::default()).unwrap();
        g.add_output_port(a, "out").unwrap();
        g.add_output_port(a, "aux").unwrap();
        g.add_input_port(sub, "in").unwrap();
        g.add_input_port(leaf, "in").unwrap();
        g.connect(a, "out", sub, "in").unwrap();
        g.connect(sub, "in", leaf, "in").unwrap();

        let mut cache = RouteCache::new();
        let targets = cache.targets(&g, a, "out").unwrap();
        assert_eq!(targets.len(), 1);
    }
}
