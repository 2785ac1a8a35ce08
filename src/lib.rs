// Declarative control plane for AI resources: apply a Tool/Agent/Workflow/
// Network manifest, a controller reconciles it towards the state it
// describes, and a `RuntimeManager` hands back a live, callable object.

//! # mastra-rt
//!
//! Five building blocks stack into the public API:
//!
//! - [`models`] — the `Resource` envelope and each kind's spec shape.
//! - [`dsl`] — YAML manifest loading, `$ref` resolution, CRD schema checks.
//! - [`store`] — the `StateStore` trait and its in-memory/file/journaled
//!   backends.
//! - [`controllers`] — the reconcile loop that drives a resource's `status`
//!   towards its `spec`.
//! - [`workflow_exec`] / [`network_exec`] — the DAG and router executors a
//!   reconciled `Workflow`/`Network` is handed off to.
//!
//! [`runtime::RuntimeManager`] assembles all of the above plus the
//! [`scheduler`], [`event_bus`], and [`plugin`] system into one embeddable
//! entry point.

pub mod agent_capability;
pub mod controllers;
pub mod dsl;
pub mod error;
pub mod event_bus;
pub mod models;
pub mod network_exec;
pub mod plugin;
pub mod runtime;
pub mod scheduler;
pub mod status_machine;
pub mod store;
pub mod tool_capability;
pub mod workflow_exec;

pub use error::{Error, Result};
pub use runtime::RuntimeManager;
