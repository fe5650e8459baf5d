//! Starting a previously created container.

use crate::error::{Result, RuntimeError};
use crate::hooks;

use super::container::Container;
use super::state::Status;

impl Container {
    /// Begins executing the container's application process.
    ///
    /// Prestart hook failures are fatal and destroy the container, per the
    /// OCI lifecycle. Poststart hook failures only warn.
    pub fn start(&mut self) -> Result<()> {
        tracing::debug!(id = %self.id, "start container");
        if self.status != Status::Created {
            return Err(RuntimeError::BadState {
                verb: "start",
                status: self.status,
            });
        }

        let spec_hooks = self.spec.hooks().clone();

        #[allow(deprecated)]
        if let Some(prestart) = spec_hooks.as_ref().and_then(|h| h.prestart().as_ref()) {
            if let Err(err) = hooks::run_hooks(prestart, &self.state()) {
                self.destroy_best_effort();
                return Err(RuntimeError::Hook {
                    phase: "prestart",
                    source: err,
                });
            }
        }

        let sandbox = match &self.sandbox {
            Some(sandbox) => sandbox,
            None => {
                // a Created record always carries its sandbox; a missing one
                // means the caller skipped load-reconciliation
                self.destroy_best_effort();
                return Err(RuntimeError::BadState {
                    verb: "start",
                    status: Status::Stopped,
                });
            }
        };
        if let Err(err) = sandbox.start(&self.id) {
            self.destroy_best_effort();
            return Err(err.into());
        }

        if let Some(poststart) = spec_hooks.as_ref().and_then(|h| h.poststart().as_ref()) {
            hooks::run_hooks_best_effort(poststart, &self.state());
        }

        self.status = Status::Running;
        self.save()
    }
}
