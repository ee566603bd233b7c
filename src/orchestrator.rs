//! The deployment orchestrator: drives projects through deploy, update, and
//! delete workflows.
//!
//! Request validation (duplicate names, unknown projects) is synchronous;
//! the workflows themselves run as background tasks and report outcome only
//! through the project's state and log. Workflows for different projects run
//! free of each other; within one project the workflow mutex admits a single
//! workflow at a time.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, oneshot};

use crate::config::ServerConfig;
use crate::errors::OrchestratorError;
use crate::ports::PortAllocator;
use crate::project::{Project, ProjectSnapshot, ProjectState, Registry};
use crate::runner;
use crate::ws::{WsMessage, broadcast_message};

/// Caller-supplied description of a new project.
#[derive(Debug, Clone)]
pub struct DeploySpec {
    pub name: String,
    pub repo_url: String,
    pub build_command: String,
    pub start_command: String,
}

/// Owns the registry, the port allocator, and the broadcast channel.
/// Construct one per server; tests construct their own independent
/// instances.
pub struct Orchestrator {
    config: ServerConfig,
    registry: Registry,
    ports: PortAllocator,
    tx: broadcast::Sender<WsMessage>,
}

impl Orchestrator {
    pub fn new(config: ServerConfig) -> Self {
        let (tx, _) = broadcast::channel(256);
        // The dashboard's own port must never be handed to a project.
        let ports = PortAllocator::new(config.base_port, [config.port]);
        Self {
            registry: Registry::new(),
            ports,
            config,
            tx,
        }
    }

    /// Subscribe to log/status events for WebSocket fan-out.
    pub fn subscribe(&self) -> broadcast::Receiver<WsMessage> {
        self.tx.subscribe()
    }

    // ── Deploy ──────────────────────────────────────────────────────

    /// Register a project and kick off its deploy workflow in the
    /// background. The caller only learns whether the request was accepted;
    /// outcome is observed through state and log.
    pub fn create_and_deploy(self: &Arc<Self>, spec: DeploySpec) -> Result<(), OrchestratorError> {
        let work_dir = self.config.deployments_dir.join(&spec.name);
        let project = Arc::new(Project::new(
            &spec.name,
            &spec.repo_url,
            &spec.build_command,
            &spec.start_command,
            work_dir,
            self.tx.clone(),
        ));
        self.registry.insert(Arc::clone(&project))?;

        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let _workflow = project.workflow_lock.lock().await;
            if let Err(e) = orchestrator.deploy(&project).await {
                orchestrator.fail(&project, &e);
            }
        });
        Ok(())
    }

    /// `Pending → Cloning → Building → Starting → Live`.
    async fn deploy(&self, project: &Arc<Project>) -> Result<()> {
        std::fs::create_dir_all(&self.config.deployments_dir).with_context(|| {
            format!(
                "Failed to create deployments directory {}",
                self.config.deployments_dir.display()
            )
        })?;

        project.set_state(ProjectState::Cloning);
        project
            .logs
            .append(&format!("Cloning {}...\n", project.repo_url));
        let clone_command = format!("git clone {} {}", project.repo_url, project.name);
        runner::run(&clone_command, &self.config.deployments_dir, &project.logs).await?;

        project.set_state(ProjectState::Building);
        project.logs.append(&format!(
            "\nRunning build command: {}\n",
            project.build_command
        ));
        runner::run(&project.build_command, &project.work_dir, &project.logs).await?;

        project.set_state(ProjectState::Starting);
        self.start_process(project).await
    }

    // ── Update ──────────────────────────────────────────────────────

    /// Find the project whose repository URL matches the webhook payload
    /// exactly and kick off its update workflow.
    pub fn trigger_update(self: &Arc<Self>, repo_url: &str) -> Result<(), OrchestratorError> {
        let project =
            self.registry
                .find_by_repo(repo_url)
                .ok_or_else(|| OrchestratorError::RepoNotFound {
                    repo_url: repo_url.to_string(),
                })?;

        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let _workflow = project.workflow_lock.lock().await;
            if !project.work_dir.exists() {
                // Nothing was ever deployed; a no-op, not an Error transition.
                project
                    .logs
                    .append("Directory not found. Please deploy first.\n");
                return;
            }
            if let Err(e) = orchestrator.update(&project).await {
                orchestrator.fail(&project, &e);
            }
        });
        Ok(())
    }

    /// `Updating → Building → Restarting → Live`.
    async fn update(&self, project: &Arc<Project>) -> Result<()> {
        project.set_state(ProjectState::Updating);
        project.logs.append(&format!(
            "Updating {} from {}...\n",
            project.name, project.repo_url
        ));
        runner::run("git pull", &project.work_dir, &project.logs).await?;

        project.set_state(ProjectState::Building);
        project.logs.append(&format!(
            "\nRe-running build command: {}\n",
            project.build_command
        ));
        runner::run(&project.build_command, &project.work_dir, &project.logs).await?;

        project.set_state(ProjectState::Restarting);
        project.logs.append("\nRestarting app...\n");
        if let Some(handle) = project.process.lock().await.take() {
            handle.stop().await;
        }
        self.start_process(project).await
    }

    // ── Shared start phase ──────────────────────────────────────────

    /// Allocate a port (or reuse the previously-assigned one), spawn the
    /// start command with `PORT` injected, and declare the project Live.
    /// Live is entered only after the spawn returned a running handle.
    async fn start_process(&self, project: &Arc<Project>) -> Result<()> {
        let port = match project.port() {
            Some(port) => port,
            None => {
                let port = self.ports.allocate()?;
                project.assign_port(port);
                port
            }
        };
        project
            .logs
            .append(&format!("\nStarting app on port {}\n", port));

        let (handle, exit_rx) =
            runner::spawn_server(&project.start_command, &project.work_dir, port, &project.logs)?;
        *project.process.lock().await = Some(handle);
        self.supervise(Arc::clone(project), exit_rx);

        project.set_state(ProjectState::Live);
        project.set_public_url(format!(
            "{}/{}",
            self.config.public_base_url(),
            project.name
        ));
        project
            .logs
            .append(&format!("\nProject {} is now live.\n", project.name));
        Ok(())
    }

    /// Watch a spawned process for failure after Live. The notification
    /// fires at most once per spawn and never for a deliberate stop, so a
    /// replaced process cannot mark its project Error retroactively.
    fn supervise(&self, project: Arc<Project>, exit_rx: oneshot::Receiver<i32>) {
        tokio::spawn(async move {
            if let Ok(code) = exit_rx.await {
                eprintln!(
                    "[supervise] {}: process exited unexpectedly with status {}",
                    project.name, code
                );
                project.set_state(ProjectState::Error);
                project.logs.append(&format!(
                    "\nERROR: process exited unexpectedly with status {}\n",
                    code
                ));
            }
        });
    }

    fn fail(&self, project: &Project, err: &anyhow::Error) {
        eprintln!("[workflow] {}: {:#}", project.name, err);
        project.set_state(ProjectState::Error);
        project.logs.append(&format!("\nERROR: {:#}\n", err));
    }

    // ── Delete ──────────────────────────────────────────────────────

    /// Stop the owned process, remove the working directory, release the
    /// port, and drop the record. The name becomes reusable afterwards.
    pub async fn delete_project(&self, name: &str) -> Result<(), OrchestratorError> {
        let project =
            self.registry
                .get(name)
                .ok_or_else(|| OrchestratorError::ProjectNotFound {
                    name: name.to_string(),
                })?;

        if let Some(handle) = project.process.lock().await.take() {
            handle.stop().await;
        }
        if project.work_dir.exists() {
            std::fs::remove_dir_all(&project.work_dir).map_err(|source| {
                OrchestratorError::DeleteFailed {
                    name: name.to_string(),
                    source,
                }
            })?;
        }
        if let Some(port) = project.port() {
            self.ports.release(port);
        }
        self.registry.remove(name);
        broadcast_message(
            &self.tx,
            WsMessage::ProjectDeleted {
                project: name.to_string(),
            },
        );
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn get_project(&self, name: &str) -> Option<ProjectSnapshot> {
        self.registry.get(name).map(|p| p.snapshot())
    }

    pub fn list_projects(&self) -> Vec<ProjectSnapshot> {
        self.registry.list().iter().map(|p| p.snapshot()).collect()
    }
}
