//! The sandbox: a user-space kernel process hosting containers.
//!
//! [`Sandbox`] is the handle the lifecycle core holds; [`supervisor`] is the
//! process on the other end of the control socket; [`control`] is the wire
//! contract between the two.

pub mod control;
#[allow(clippy::module_inception)]
mod sandbox;
pub mod supervisor;

pub use sandbox::{Sandbox, SandboxError, CONTROL_SOCKET};
pub use supervisor::{Supervisor, SupervisorError};
