//! Project records, lifecycle states, and the in-memory registry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::errors::OrchestratorError;
use crate::logs::LogSink;
use crate::runner::ProcessHandle;
use crate::ws::{WsMessage, broadcast_message};

/// Durable log file name inside a project's working directory.
const LOG_FILE: &str = ".deploy.log";

/// Lifecycle state of a project.
///
/// `Live` and `Error` are the stable states; everything else is a workflow
/// phase. `Error` has no automatic recovery — a webhook update or manual
/// redeploy is the only way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectState {
    Pending,
    Cloning,
    Building,
    Starting,
    Live,
    Updating,
    Restarting,
    Error,
}

impl ProjectState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Cloning => "cloning",
            Self::Building => "building",
            Self::Starting => "starting",
            Self::Live => "live",
            Self::Updating => "updating",
            Self::Restarting => "restarting",
            Self::Error => "error",
        }
    }

    /// True for the two stable states a workflow can end in.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Live | Self::Error)
    }
}

impl FromStr for ProjectState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "cloning" => Ok(Self::Cloning),
            "building" => Ok(Self::Building),
            "starting" => Ok(Self::Starting),
            "live" => Ok(Self::Live),
            "updating" => Ok(Self::Updating),
            "restarting" => Ok(Self::Restarting),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid project state: {}", s)),
        }
    }
}

/// One deployment unit: a source repository, build/start commands, and the
/// runtime state the orchestrator drives through the lifecycle.
///
/// Identity fields are immutable after creation; lifecycle fields sit behind
/// interior locks and are mutated exclusively by the orchestrator.
pub struct Project {
    pub name: String,
    pub repo_url: String,
    pub build_command: String,
    pub start_command: String,
    pub work_dir: PathBuf,
    pub created_at: String,
    pub logs: Arc<LogSink>,
    state: Mutex<ProjectState>,
    port: Mutex<Option<u16>>,
    public_url: Mutex<Option<String>>,
    tx: broadcast::Sender<WsMessage>,
    /// Serializes deploy/update workflows so a webhook arriving mid-deploy
    /// cannot interleave with it.
    pub(crate) workflow_lock: tokio::sync::Mutex<()>,
    /// The running server process, once Starting has succeeded.
    pub(crate) process: tokio::sync::Mutex<Option<ProcessHandle>>,
}

impl Project {
    pub fn new(
        name: &str,
        repo_url: &str,
        build_command: &str,
        start_command: &str,
        work_dir: PathBuf,
        tx: broadcast::Sender<WsMessage>,
    ) -> Self {
        let logs = Arc::new(LogSink::new(name, work_dir.join(LOG_FILE), tx.clone()));
        Self {
            name: name.to_string(),
            repo_url: repo_url.to_string(),
            build_command: build_command.to_string(),
            start_command: start_command.to_string(),
            work_dir,
            created_at: chrono::Utc::now().to_rfc3339(),
            logs,
            state: Mutex::new(ProjectState::Pending),
            port: Mutex::new(None),
            public_url: Mutex::new(None),
            tx,
            workflow_lock: tokio::sync::Mutex::new(()),
            process: tokio::sync::Mutex::new(None),
        }
    }

    pub fn state(&self) -> ProjectState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Transition to a new state and broadcast it to attached viewers.
    pub fn set_state(&self, state: ProjectState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
        broadcast_message(
            &self.tx,
            WsMessage::StatusUpdate {
                project: self.name.clone(),
                state,
            },
        );
    }

    pub fn port(&self) -> Option<u16> {
        *self.port.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn assign_port(&self, port: u16) {
        *self.port.lock().unwrap_or_else(|e| e.into_inner()) = Some(port);
    }

    pub fn public_url(&self) -> Option<String> {
        self.public_url
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_public_url(&self, url: String) {
        *self.public_url.lock().unwrap_or_else(|e| e.into_inner()) = Some(url);
    }

    pub fn snapshot(&self) -> ProjectSnapshot {
        ProjectSnapshot {
            name: self.name.clone(),
            repo_url: self.repo_url.clone(),
            build_command: self.build_command.clone(),
            start_command: self.start_command.clone(),
            state: self.state(),
            port: self.port(),
            public_url: self.public_url(),
            log: self.logs.snapshot(),
            created_at: self.created_at.clone(),
        }
    }
}

/// Point-in-time view of a project, as served to the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub name: String,
    pub repo_url: String,
    pub build_command: String,
    pub start_command: String,
    pub state: ProjectState,
    pub port: Option<u16>,
    pub public_url: Option<String>,
    pub log: String,
    pub created_at: String,
}

/// The authoritative in-memory table of known projects, keyed by name.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<HashMap<String, Arc<Project>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new project. Exactly one record per name may exist.
    pub fn insert(&self, project: Arc<Project>) -> Result<(), OrchestratorError> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if inner.contains_key(&project.name) {
            return Err(OrchestratorError::DuplicateName {
                name: project.name.clone(),
            });
        }
        inner.insert(project.name.clone(), project);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Project>> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Match a webhook's repository URL by exact string equality.
    pub fn find_by_repo(&self, repo_url: &str) -> Option<Arc<Project>> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .find(|p| p.repo_url == repo_url)
            .cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Project>> {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
    }

    /// All projects, name-sorted for stable listings.
    pub fn list(&self) -> Vec<Arc<Project>> {
        let mut projects: Vec<_> = self
            .inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        projects
    }
}
