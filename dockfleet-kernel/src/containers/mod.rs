//! CONTAINER LIFECYCLE - request validation, translation and dispatch
//!
//! `spec` turns a caller's `ContainerRequest` into a validated `ContainerSpec`
//! and from there into runtime create bodies; `dispatch` runs lifecycle
//! operations against a handle taken from the pool.

pub mod dispatch;
pub mod spec;

pub use dispatch::DispatchError;
pub use spec::{ContainerRequest, ContainerSpec, CreateStage, ValidationError};
