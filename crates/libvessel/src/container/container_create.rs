//! Creation of new containers, and the create/start/wait composite.

use std::path::Path;

use chrono::Utc;
use oci_spec::runtime::Spec;

use crate::config::Config;
use crate::error::{Result, RuntimeError};
use crate::sandbox::control::WaitStatus;
use crate::sandbox::Sandbox;
use crate::utils;

use super::container::{validate_id, Container};
use super::state::{self, Status};

const PID_FILE_MODE: u32 = 0o644;

fn validate_spec(spec: &Spec) -> Result<()> {
    let process = spec
        .process()
        .as_ref()
        .ok_or_else(|| RuntimeError::InvalidSpec("spec has no process".to_string()))?;
    match process.args() {
        Some(args) if !args.is_empty() => Ok(()),
        _ => Err(RuntimeError::InvalidSpec(
            "process has no args".to_string(),
        )),
    }
}

impl Container {
    /// Creates the container in a new sandbox process.
    ///
    /// The record is persisted with status `Created` once the sandbox is up.
    /// If a `pid_file` is given, the sandbox pid is written there strictly
    /// last: the host engine treats the appearance of that file as the
    /// completion signal for create, so nothing may run after it.
    pub fn create(
        id: &str,
        spec: Spec,
        config: &Config,
        bundle_dir: &Path,
        console_socket: Option<&Path>,
        pid_file: Option<&Path>,
    ) -> Result<Container> {
        tracing::debug!(%id, root_dir = ?config.root_dir, "create container");
        validate_id(id)?;
        validate_spec(&spec)?;

        let container_root = config.root_dir.join(id);
        if state::exists(&container_root) {
            return Err(RuntimeError::AlreadyExists {
                id: id.to_string(),
                path: container_root,
            });
        }

        let mut container = Container {
            id: id.to_string(),
            spec,
            bundle_dir: bundle_dir.to_path_buf(),
            root: container_root,
            created_at: Utc::now(),
            owner: std::env::var("USER").unwrap_or_default(),
            status: Status::Creating,
            sandbox: None,
        };

        // Start a new sandbox for this container. Any failure from here on
        // must tear the container down again before the error is returned.
        let sandbox = match Sandbox::create(id, config, bundle_dir, console_socket) {
            Ok(sandbox) => sandbox,
            Err(err) => {
                container.destroy_best_effort();
                return Err(err.into());
            }
        };

        container.sandbox = Some(sandbox);
        container.status = Status::Created;
        if let Err(err) = container.save() {
            container.destroy_best_effort();
            return Err(err);
        }

        if let Some(pid_file) = pid_file {
            let pid = format!("{}", container.pid());
            if let Err(err) = utils::write_file_with_mode(pid_file, pid.as_bytes(), PID_FILE_MODE)
            {
                container.destroy_best_effort();
                return Err(RuntimeError::PidFile {
                    path: pid_file.to_path_buf(),
                    source: err,
                });
            }
        }

        Ok(container)
    }

    /// Creates the container, starts it and waits for its init process:
    /// the one-shot composite behind the `run` verb.
    pub fn run(
        id: &str,
        spec: Spec,
        config: &Config,
        bundle_dir: &Path,
        console_socket: Option<&Path>,
        pid_file: Option<&Path>,
    ) -> Result<WaitStatus> {
        tracing::debug!(%id, root_dir = ?config.root_dir, "run container");
        let mut container =
            Container::create(id, spec, config, bundle_dir, console_socket, pid_file)?;
        container.start()?;
        container.wait()
    }

    pub(crate) fn destroy_best_effort(&mut self) {
        if let Err(err) = self.destroy() {
            tracing::warn!(id = %self.id, %err, "cleanup of failed container was incomplete");
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use oci_spec::runtime::{ProcessBuilder, SpecBuilder};

    use super::*;

    fn runnable_spec() -> Spec {
        SpecBuilder::default()
            .process(
                ProcessBuilder::default()
                    .args(vec!["/bin/true".to_string()])
                    .cwd("/")
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
    }

    fn test_config(root_dir: &Path) -> Config {
        Config {
            root_dir: root_dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_rejects_invalid_id_without_side_effects() -> Result<()> {
        let root_dir = tempfile::tempdir()?;
        let config = test_config(root_dir.path());
        let err = Container::create(
            "bad id!",
            runnable_spec(),
            &config,
            Path::new("/tmp/bundle"),
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidId { .. }));
        assert_eq!(Container::list(root_dir.path())?, Vec::<String>::new());
        Ok(())
    }

    #[test]
    fn test_create_rejects_spec_without_args() -> Result<()> {
        let root_dir = tempfile::tempdir()?;
        let config = test_config(root_dir.path());
        let spec = SpecBuilder::default()
            .process(ProcessBuilder::default().cwd("/").build().unwrap())
            .build()
            .unwrap();
        let err = Container::create(
            "no-args",
            spec,
            &config,
            Path::new("/tmp/bundle"),
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidSpec(_)));
        assert_eq!(Container::list(root_dir.path())?, Vec::<String>::new());
        Ok(())
    }

    #[test]
    fn test_create_refuses_existing_directory() -> Result<()> {
        let root_dir = tempfile::tempdir()?;
        let config = test_config(root_dir.path());
        std::fs::create_dir(root_dir.path().join("taken"))?;
        std::fs::write(root_dir.path().join("taken/keep"), b"untouched")?;

        let err = Container::create(
            "taken",
            runnable_spec(),
            &config,
            Path::new("/tmp/bundle"),
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::AlreadyExists { .. }));
        // the existing directory is left alone
        assert_eq!(
            std::fs::read(root_dir.path().join("taken/keep"))?,
            b"untouched"
        );
        Ok(())
    }
}
