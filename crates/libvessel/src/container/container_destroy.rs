//! Container teardown.

use crate::error::Result;
use crate::hooks;

use super::container::Container;
use super::state::{self, Status};

impl Container {
    /// Frees every resource associated with the container.
    ///
    /// Only a failure to stop the container inside the sandbox aborts the
    /// verb; filesystem and hook failures are downgraded to warnings so that
    /// teardown still converges on `Stopped` with the directory gone. The
    /// directory is removed a second time at the end because hooks may have
    /// recreated entries under it, and a first removal may have been partial.
    pub fn destroy(&mut self) -> Result<()> {
        tracing::debug!(id = %self.id, "destroy container");

        if let Some(sandbox) = &self.sandbox {
            sandbox.stop(&self.id)?;
        }

        if let Err(err) = state::remove(&self.root) {
            tracing::warn!(id = %self.id, root = ?self.root, %err, "failed to delete container directory");
        }

        if matches!(self.status, Status::Created | Status::Running) {
            if let Some(poststop) = self.spec.hooks().as_ref().and_then(|h| h.poststop().as_ref())
            {
                hooks::run_hooks_best_effort(poststop, &self.state());
            }
        }

        if let Err(err) = state::remove(&self.root) {
            tracing::warn!(id = %self.id, root = ?self.root, %err, "failed to delete container directory");
        }

        // The init container owns the sandbox: tearing it down takes the
        // whole sandbox process with it.
        if let Some(sandbox) = &self.sandbox {
            if sandbox.id == self.id {
                if let Err(err) = sandbox.destroy() {
                    tracing::warn!(sandbox = %sandbox.id, %err, "failed to destroy sandbox");
                }
            }
        }

        self.sandbox = None;
        self.status = Status::Stopped;
        Ok(())
    }
}
