// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Thin, idempotent wrapper over the container runtime (C1, spec §4.1).
//! The driver never retries internally — that is the Supervisor's job —
//! and never hides a failure kind behind a generic error.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions,
    RemoveContainerOptions, StartContainerOptions, Stats, StatsOptions,
    StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerStateStatusEnum, HostConfig};
use bollard::Docker;
use futures::StreamExt;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::service::ServiceResources;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle(pub String);

#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: Vec<(String, String)>,
    pub resources: ServiceResources,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerStats {
    pub cpu_pct: f64,
    pub mem_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseHint {
    Running,
    Paused,
    Exited,
    Missing,
}

#[derive(Debug, Error, Clone)]
pub enum ContainerError {
    #[error("container not found: {0}")]
    NotFound(String),
    #[error("container already in requested state")]
    AlreadyInState,
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),
    #[error("resources exhausted: {0}")]
    ResourceExhausted(String),
    #[error("operation timed out")]
    Timeout,
    #[error("unknown container error: {0}")]
    Unknown(String),
}

impl From<BollardError> for ContainerError {
    fn from(error: BollardError) -> Self {
        match &error {
            BollardError::DockerResponseServerError { status_code: 404, .. } => {
                ContainerError::NotFound(error.to_string())
            }
            BollardError::DockerResponseServerError { status_code: 409, .. } => {
                ContainerError::AlreadyInState
            }
            BollardError::DockerResponseServerError { status_code: 507, .. } => {
                ContainerError::ResourceExhausted(error.to_string())
            }
            BollardError::HyperResponseError { .. } | BollardError::RequestTimeoutError => {
                ContainerError::RuntimeUnavailable(error.to_string())
            }
            other => ContainerError::Unknown(other.to_string()),
        }
    }
}

/// Capability abstraction over the runtime (spec §4.1). All operations are
/// idempotent on the observable effect.
#[async_trait]
pub trait ContainerDriver: Send + Sync {
    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerHandle, ContainerError>;
    async fn start(&self, handle: &ContainerHandle) -> Result<(), ContainerError>;
    async fn stop(&self, handle: &ContainerHandle, grace_ms: u64) -> Result<(), ContainerError>;
    async fn pause(&self, handle: &ContainerHandle) -> Result<(), ContainerError>;
    /// Distinguished from `start`: only defined on a paused handle, expected
    /// to return in tens of milliseconds.
    async fn unpause(&self, handle: &ContainerHandle) -> Result<(), ContainerError>;
    async fn remove(&self, handle: &ContainerHandle) -> Result<(), ContainerError>;
    async fn stats(&self, handle: &ContainerHandle) -> Result<ContainerStats, ContainerError>;
    async fn inspect(&self, handle: &ContainerHandle) -> Result<PhaseHint, ContainerError>;
    async fn healthcheck(&self) -> Result<(), ContainerError>;
}

pub struct DockerContainerDriver {
    docker: Docker,
}

impl DockerContainerDriver {
    pub fn connect(socket_path: Option<&str>) -> Result<Self, ContainerError> {
        let docker = match socket_path {
            #[cfg(unix)]
            Some(path) => Docker::connect_with_unix(path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| ContainerError::RuntimeUnavailable(format!(
                    "failed to connect to Docker at {path}: {e}"
                )))?,
            #[cfg(not(unix))]
            Some(_) => Docker::connect_with_local_defaults()
                .map_err(|e| ContainerError::RuntimeUnavailable(e.to_string()))?,
            None => Docker::connect_with_local_defaults()
                .map_err(|e| ContainerError::RuntimeUnavailable(e.to_string()))?,
        };
        Ok(Self { docker })
    }

    async fn ensure_image(&self, image: &str) -> Result<(), ContainerError> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }
        info!(image, "pulling image");
        let options = Some(CreateImageOptions { from_image: image, ..Default::default() });
        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            result?;
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerDriver for DockerContainerDriver {
    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerHandle, ContainerError> {
        self.ensure_image(&spec.image).await?;
        let host_config = HostConfig {
            memory: Some(spec.resources.mem_limit as i64),
            memory_reservation: Some(spec.resources.mem_reservation as i64),
            nano_cpus: Some((spec.resources.cpu_limit * 1_000_000_000.0) as i64),
            pids_limit: Some(spec.resources.pid_limit as i64),
            ..Default::default()
        };
        let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(env),
            host_config: Some(host_config),
            ..Default::default()
        };
        let options = CreateContainerOptions { name: spec.name.clone(), platform: None };
        let response = self.docker.create_container(Some(options), config).await?;
        Ok(ContainerHandle(response.id))
    }

    async fn start(&self, handle: &ContainerHandle) -> Result<(), ContainerError> {
        match self.docker.start_container(&handle.0, None::<StartContainerOptions<String>>).await {
            Ok(()) => Ok(()),
            Err(BollardError::DockerResponseServerError { status_code: 304, .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn stop(&self, handle: &ContainerHandle, grace_ms: u64) -> Result<(), ContainerError> {
        let options = StopContainerOptions { t: (grace_ms / 1000).max(1) as i64 };
        match self.docker.stop_container(&handle.0, Some(options)).await {
            Ok(()) => Ok(()),
            Err(BollardError::DockerResponseServerError { status_code: 304, .. }) => Ok(()),
            Err(e) => {
                warn!(container = %handle.0, "graceful stop failed, killing");
                self.docker.kill_container(&handle.0, None::<KillContainerOptions<String>>).await
                    .map_err(ContainerError::from)?;
                let _ = e;
                Ok(())
            }
        }
    }

    async fn pause(&self, handle: &ContainerHandle) -> Result<(), ContainerError> {
        match self.docker.pause_container(&handle.0).await {
            Ok(()) => Ok(()),
            Err(BollardError::DockerResponseServerError { status_code: 409, .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn unpause(&self, handle: &ContainerHandle) -> Result<(), ContainerError> {
        match self.docker.unpause_container(&handle.0).await {
            Ok(()) => Ok(()),
            Err(BollardError::DockerResponseServerError { status_code: 409, .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, handle: &ContainerHandle) -> Result<(), ContainerError> {
        let options = RemoveContainerOptions { force: true, ..Default::default() };
        match self.docker.remove_container(&handle.0, Some(options)).await {
            Ok(()) => Ok(()),
            Err(BollardError::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn stats(&self, handle: &ContainerHandle) -> Result<ContainerStats, ContainerError> {
        let options = StatsOptions { stream: false, one_shot: true };
        let mut stream = self.docker.stats(&handle.0, Some(options));
        let sample: Stats = stream
            .next()
            .await
            .ok_or_else(|| ContainerError::NotFound(handle.0.clone()))??;
        let cpu_delta = sample.cpu_stats.cpu_usage.total_usage as f64
            - sample.precpu_stats.cpu_usage.total_usage as f64;
        let system_delta = sample.cpu_stats.system_cpu_usage.unwrap_or(0) as f64
            - sample.precpu_stats.system_cpu_usage.unwrap_or(0) as f64;
        let cpu_pct = if system_delta > 0.0 { (cpu_delta / system_delta) * 100.0 } else { 0.0 };
        let mem_bytes = sample.memory_stats.usage.unwrap_or(0);
        Ok(ContainerStats { cpu_pct, mem_bytes })
    }

    async fn inspect(&self, handle: &ContainerHandle) -> Result<PhaseHint, ContainerError> {
        let response = match self
            .docker
            .inspect_container(&handle.0, None::<InspectContainerOptions>)
            .await
        {
            Ok(response) => response,
            Err(BollardError::DockerResponseServerError { status_code: 404, .. }) => {
                return Ok(PhaseHint::Missing)
            }
            Err(e) => return Err(e.into()),
        };
        let status = response.state.and_then(|s| s.status);
        Ok(match status {
            Some(ContainerStateStatusEnum::RUNNING) => PhaseHint::Running,
            Some(ContainerStateStatusEnum::PAUSED) => PhaseHint::Paused,
            Some(ContainerStateStatusEnum::EXITED) | Some(ContainerStateStatusEnum::DEAD) => {
                PhaseHint::Exited
            }
            _ => PhaseHint::Missing,
        })
    }

    async fn healthcheck(&self) -> Result<(), ContainerError> {
        self.docker.ping().await.map(|_| ()).map_err(ContainerError::from)
    }
}
