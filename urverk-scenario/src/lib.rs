//! # urverk-scenario
//!
//! The in-memory scenario document the kernel accepts: experiment metadata,
//! the dynamics/conditions/observables catalogues, view declarations and
//! the model tree. A YAML form (de)serialises it for files and round-trip
//! checks; host-level runtime settings load through `figment`.

pub mod config;
pub mod document;
pub mod error;

pub use config::HostConfig;
pub use document::{
    AtomicDecl, ConnectionDecl, CoupledDecl, DynamicsDecl, Experiment, ModelDecl, Scenario,
    ViewDecl, ViewKindDecl,
};
pub use error::ScenarioError;
