//! ## urverk-kernel::executive
//! **Deferred structural changes**
//!
//! An executive's transition functions record graph mutations here; the
//! coordinator applies them after the transition returns, within the same
//! bag, before the next bag is popped. Names are resolved in the scope of
//! the executive's parent coupled model, the coupled model itself being
//! addressed by its own name or the empty string.

use urverk_core::value::Map;

/// One recorded mutation.
#[derive(Clone, Debug, PartialEq)]
pub enum StructuralChange {
    CreateModel {
        name: String,
        /// Dynamics catalogue entry to resolve through the loader.
        dynamics: String,
        /// Condition catalogue entries, merged in order.
        conditions: Vec<String>,
        /// Observable catalogue entry, if the new model is observed.
        observables: Option<String>,
        input_ports: Vec<String>,
        output_ports: Vec<String>,
        /// Inline overrides merged over the named conditions.
        parameters: Map,
    },
    DeleteModel {
        name: String,
    },
    AddConnection {
        src: String,
        src_port: String,
        dst: String,
        dst_port: String,
    },
    RemoveConnection {
        src: String,
        src_port: String,
        dst: String,
        dst_port: String,
    },
    AddInputPort {
        model: String,
        port: String,
    },
    AddOutputPort {
        model: String,
        port: String,
    },
    RemoveInputPort {
        model: String,
        port: String,
    },
    RemoveOutputPort {
        model: String,
        port: String,
    },
}

/// The restricted coordinator handle exposed to executives: a command
/// recorder, nothing more. Everything takes effect after the calling
/// transition returns.
#[derive(Debug, Default)]
pub struct StructuralChanges {
    changes: Vec<StructuralChange>,
}

impl StructuralChanges {
    pub fn create_model(
        &mut self,
        name: impl Into<String>,
        dynamics: impl Into<String>,
        conditions: Vec<String>,
        observables: Option<String>,
    ) -> &mut Self {
        self.changes.push(StructuralChange::CreateModel {
            name: name.into(),
            dynamics: dynamics.into(),
            conditions,
            observables,
            input_ports: Vec::new(),
            output_ports: Vec::new(),
            parameters: Map::new(),
        });
        self
    }

    /// Like [`Self::create_model`] with ports and inline parameters.
    pub fn create_model_with(
        &mut self,
        name: impl Into<String>,
        dynamics: impl Into<String>,
        conditions: Vec<String>,
        observables: Option<String>,
        input_ports: Vec<String>,
        output_ports: Vec<String>,
        parameters: Map,
    ) -> &mut Self {
        self.changes.push(StructuralChange::CreateModel {
            name: name.into(),
            dynamics: dynamics.into(),
            conditions,
            observables,
            input_ports,
            output_ports,
            parameters,
        });
        self
    }

    pub fn delete_model(&mut self, name: impl Into<String>) -> &mut Self {
        self.changes.push(StructuralChange::DeleteModel {
            name: name.into(),
        });
        self
    }

    pub fn add_connection(
        &mut self,
        src: impl Into<String>,
        src_port: impl Into<String>,
        dst: impl Into<String>,
        dst_port: impl Into<String>,
    ) -> &mut Self {
        self.changes.push(StructuralChange::AddConnection {
            src: src.into(),
            src_port: src_port.into(),
            dst: dst.into(),
            dst_port: dst_port.into(),
        });
        self
    }

    pub fn remove_connection(
        &mut self,
        src: impl Into<String>,
        src_port: impl Into<String>,
        dst: impl Into<String>,
        dst_port: impl Into<String>,
    ) -> &mut Self {
        self.changes.push(StructuralChange::RemoveConnection {
            src: src.into(),
            src_port: src_port.into(),
            dst: dst.into(),
            dst_port: dst_port.into(),
        });
        self
    }

    pub fn add_input_port(
        &mut self,
        model: impl Into<String>,
        port: impl Into<String>,
    ) -> &mut Self {
        self.changes.push(StructuralChange::AddInputPort {
            model: model.into(),
            port: port.into(),
        });
        self
    }

    pub fn add_output_port(
        &mut self,
        model: impl Into<String>,
        port: impl Into<String>,
    ) -> &mut Self {
        self.changes.push(StructuralChange::AddOutputPort {
            model: model.into(),
            port: port.into(),
        });
        self
    }

    pub fn remove_input_port(
        &mut self,
        model: impl Into<String>,
        port: impl Into<String>,
    ) -> &mut Self {
        self.changes.push(StructuralChange::RemoveInputPort {
            model: model.into(),
            port: port.into(),
        });
        self
    }

    pub fn remove_output_port(
        &mut self,
        model: impl Into<String>,
        port: impl Into<String>,
    ) -> &mut Self {
        self.changes.push(StructuralChange::RemoveOutputPort {
            model: model.into(),
            port: port.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub(crate) fn drain(&mut self) -> Vec<StructuralChange> {
        std::mem::take(&mut self.changes)
    }
}
