//! Container management.
//!
//! The [`Container`] record is the unit this crate revolves around: created
//! by [`Container::create`], reloaded by [`Container::load`] on every later
//! invocation, and mutated by the lifecycle verbs spread across the
//! submodules. Each verb persists the record before reporting success, so a
//! crash leaves either the previous durable state or the new one.

#[allow(clippy::module_inception)]
mod container;
mod container_create;
mod container_destroy;
mod container_start;
pub mod state;

pub use container::{validate_id, Container};
pub use state::{OciState, Status};
