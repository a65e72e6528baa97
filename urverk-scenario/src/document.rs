//! ## urverk-scenario::document
//! **The scenario document**
//!
//! What a run needs, in one serialisable value: experiment window and
//! replicas, catalogues mapping names to modules, condition payloads and
//! view bindings, view declarations, and the root coupled model tree.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

use urverk_core::time::Time;
use urverk_core::value::Map;
use urverk_graph::{AtomicSpec, ModelGraph, ModelId};
use urverk_kernel::{Catalogues, DynamicsRef, KernelSettings};

use crate::error::ScenarioError;

/// Experiment metadata: the simulation window plus replication control.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Experiment {
    pub name: String,

    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub begin: f64,

    #[validate(range(min = 0.0))]
    pub duration: f64,

    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default = "default_replicas")]
    #[validate(range(min = 1))]
    pub replicas: u32,
}

fn default_replicas() -> u32 {
    1
}

/// Catalogue entry resolving a dynamics name to a module.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicsDecl {
    pub package: String,
    pub library: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKindDecl {
    Timed,
    Event,
    Finish,
}

/// One observation channel: its kind, plug-in name and configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ViewDecl {
    pub kind: ViewKindDecl,
    /// Required for timed views.
    #[serde(default)]
    pub timestep: Option<f64>,
    /// Output plug-in name, resolved by the host.
    pub output: String,
    #[serde(default)]
    pub config: Map,
}

/// A connection between siblings or across the coupled boundary; `from` /
/// `to` naming the coupled model itself addresses its own ports.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDecl {
    pub from: String,
    pub from_port: String,
    pub to: String,
    pub to_port: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AtomicDecl {
    pub name: String,
    pub dynamics: String,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub observables: Option<String>,
    #[serde(default)]
    pub input_ports: Vec<String>,
    #[serde(default)]
    pub output_ports: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoupledDecl {
    pub name: String,
    #[serde(default)]
    pub input_ports: Vec<String>,
    #[serde(default)]
    pub output_ports: Vec<String>,
    #[serde(default)]
    pub children: Vec<ModelDecl>,
    #[serde(default)]
    pub connections: Vec<ConnectionDecl>,
}

/// The model tree. The root must be coupled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModelDecl {
    Atomic(AtomicDecl),
    Coupled(CoupledDecl),
}

impl ModelDecl {
    pub fn name(&self) -> &str {
        match self {
            ModelDecl::Atomic(decl) => &decl.name,
            ModelDecl::Coupled(decl) => &decl.name,
        }
    }

    /// Serialises a live graph back into a declaration tree. Together with
    /// [`Scenario::build_graph`] this closes the round trip.
    pub fn from_graph(graph: &ModelGraph) -> Result<Self, ScenarioError> {
        decl_from_node(graph, graph.root())
    }
}

fn decl_from_node(graph: &ModelGraph, id: ModelId) -> Result<ModelDecl, ScenarioError> {
    let node = graph.node(id)?;
    if let Some(spec) = node.atomic_spec() {
        return Ok(ModelDecl::Atomic(AtomicDecl {
            name: node.name().to_string(),
            dynamics: spec.dynamics.clone(),
            conditions: spec.conditions.clone(),
            observables: spec.observables.clone(),
            input_ports: node.input_ports().to_vec(),
            output_ports: node.output_ports().to_vec(),
        }));
    }

    let mut children = Vec::new();
    for &child in graph.children(id)? {
        children.push(decl_from_node(graph, child)?);
    }

    let name_of = |m: ModelId| -> Result<String, ScenarioError> {
        Ok(graph.node(m)?.name().to_string())
    };
    let mut connections = Vec::new();
    let (internal, external_in, external_out) = graph.connections(id)?;
    for table in [external_in, internal, external_out] {
        for conn in table {
            connections.push(ConnectionDecl {
                from: name_of(conn.src)?,
                from_port: conn.src_port.clone(),
                to: name_of(conn.dst)?,
                to_port: conn.dst_port.clone(),
            });
        }
    }

    Ok(ModelDecl::Coupled(CoupledDecl {
        name: node.name().to_string(),
        input_ports: node.input_ports().to_vec(),
        output_ports: node.output_ports().to_vec(),
        children,
        connections,
    }))
}

/// The complete scenario document.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Scenario {
    #[validate(nested)]
    pub experiment: Experiment,

    pub dynamics: BTreeMap<String, DynamicsDecl>,

    #[serde(default)]
    pub conditions: BTreeMap<String, Map>,

    #[serde(default)]
    pub observables: BTreeMap<String, BTreeMap<String, Vec<String>>>,

    #[serde(default)]
    pub views: BTreeMap<String, ViewDecl>,

    pub model: ModelDecl,
}

impl Scenario {
    pub fn from_yaml(text: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = serde_yaml::from_str(text)?;
        scenario.validate()?;
        scenario.check_cross_references()?;
        Ok(scenario)
    }

    pub fn to_yaml(&self) -> Result<String, ScenarioError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading scenario");
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ScenarioError> {
        Ok(std::fs::write(path, self.to_yaml()?)?)
    }

    /// The simulation window for the kernel.
    pub fn settings(&self) -> KernelSettings {
        KernelSettings {
            t_begin: Time::new(self.experiment.begin),
            t_end: Time::new(self.experiment.begin + self.experiment.duration),
            trace_models: false,
        }
    }

    /// Catalogues in the kernel's own form.
    pub fn catalogues(&self) -> Catalogues {
        Catalogues {
            dynamics: self
                .dynamics
                .iter()
                .map(|(name, decl)| {
                    (
                        name.clone(),
                        DynamicsRef {
                            package: decl.package.clone(),
                            library: decl.library.clone(),
                        },
                    )
                })
                .collect(),
            conditions: self.conditions.clone(),
            observables: self.observables.clone(),
        }
    }

    /// One seed per replica: `seed + i`, defaulting the base to zero.
    pub fn replica_seeds(&self) -> Vec<u64> {
        let base = self.experiment.seed.unwrap_or(0);
        (0..self.experiment.replicas as u64)
            .map(|i| base + i)
            .collect()
    }

    /// Builds the static model graph the coordinator will own.
    pub fn build_graph(&self) -> Result<ModelGraph, ScenarioError> {
        let ModelDecl::Coupled(root) = &self.model else {
            return Err(ScenarioError::Invalid(
                "the top-level model must be coupled".into(),
            ));
        };
        let mut graph = ModelGraph::new(&root.name);
        let root_id = graph.root();
        for port in &root.input_ports {
            graph.add_input_port(root_id, port)?;
        }
        for port in &root.output_ports {
            graph.add_output_port(root_id, port)?;
        }
        build_children(&mut graph, root_id, root)?;
        Ok(graph)
    }

    fn check_cross_references(&self) -> Result<(), ScenarioError> {
        let mut stack = vec![&self.model];
        while let Some(decl) = stack.pop() {
            match decl {
                ModelDecl::Atomic(atomic) => {
                    if !self.dynamics.contains_key(&atomic.dynamics) {
                        return Err(ScenarioError::Invalid(format!(
                            "model '{}' references undeclared dynamics '{}'",
                            atomic.name, atomic.dynamics
                        )));
                    }
                    for condition in &atomic.conditions {
                        if !self.conditions.contains_key(condition) {
                            return Err(ScenarioError::Invalid(format!(
                                "model '{}' references undeclared condition '{}'",
                                atomic.name, condition
                            )));
                        }
                    }
                    if let Some(observable) = &atomic.observables {
                        let Some(ports) = self.observables.get(observable) else {
                            return Err(ScenarioError::Invalid(format!(
                                "model '{}' references undeclared observable '{observable}'",
                                atomic.name
                            )));
                        };
                        for views in ports.values() {
                            for view in views {
                                if !self.views.contains_key(view) {
                                    return Err(ScenarioError::Invalid(format!(
                                        "observable '{observable}' references undeclared view '{view}'"
                                    )));
                                }
                            }
                        }
                    }
                }
                ModelDecl::Coupled(coupled) => stack.extend(coupled.children.iter()),
            }
        }
        for (name, view) in &self.views {
            if view.kind == ViewKindDecl::Timed && view.timestep.is_none() {
                return Err(ScenarioError::Invalid(format!(
                    "timed view '{name}' needs a timestep"
                )));
            }
        }
        Ok(())
    }
}

fn build_children(
    graph: &mut ModelGraph,
    parent: ModelId,
    decl: &CoupledDecl,
) -> Result<(), ScenarioError> {
    let mut ids: BTreeMap<&str, ModelId> = BTreeMap::new();
    for child in &decl.children {
        match child {
            ModelDecl::Atomic(atomic) => {
                let id = graph.add_atomic(
                    parent,
                    &atomic.name,
                    AtomicSpec {
                        dynamics: atomic.dynamics.clone(),
                        conditions: atomic.conditions.clone(),
                        observables: atomic.observables.clone(),
                    },
                )?;
                for port in &atomic.input_ports {
                    graph.add_input_port(id, port)?;
                }
                for port in &atomic.output_ports {
                    graph.add_output_port(id, port)?;
                }
                ids.insert(atomic.name.as_str(), id);
            }
            ModelDecl::Coupled(coupled) => {
                let id = graph.add_coupled(parent, &coupled.name)?;
                for port in &coupled.input_ports {
                    graph.add_input_port(id, port)?;
                }
                for port in &coupled.output_ports {
                    graph.add_output_port(id, port)?;
                }
                ids.insert(coupled.name.as_str(), id);
                build_children(graph, id, coupled)?;
            }
        }
    }

    for conn in &decl.connections {
        let resolve = |name: &str| -> Result<ModelId, ScenarioError> {
            if name == decl.name {
                Ok(parent)
            } else {
                ids.get(name).copied().ok_or_else(|| {
                    ScenarioError::Invalid(format!(
                        "connection references unknown model '{name}' under '{}'",
                        decl.name
                    ))
                })
            }
        };
        let src = resolve(&conn.from)?;
        let dst = resolve(&conn.to)?;
        graph.connect(src, &conn.from_port, dst, &conn.to_port)?;
    }
    Ok(())
}
