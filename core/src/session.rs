//! Per-task workspace sessions
//!
//! Every task gets one isolated workspace, owned exclusively by that task's
//! agent loop for the task's duration.

use crate::error::{Result, StewardError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Opaque reference to an isolated workspace.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Uuid,
    root: PathBuf,
}

impl SessionHandle {
    pub fn new(id: Uuid, root: PathBuf) -> Self {
        Self { id, root }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Allocates workspaces. The engine consumes only `create()`.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn create(&self) -> Result<SessionHandle>;
}

/// Session provider backed by per-task directories under a base path.
pub struct DirSessionProvider {
    base: PathBuf,
}

impl DirSessionProvider {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

#[async_trait]
impl SessionProvider for DirSessionProvider {
    async fn create(&self) -> Result<SessionHandle> {
        let id = Uuid::new_v4();
        let root = self.base.join(id.to_string());
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StewardError::SessionCreation {
                reason: format!("{}: {}", root.display(), e),
            })?;
        tracing::debug!(session_id = %id, root = %root.display(), "session workspace created");
        Ok(SessionHandle::new(id, root))
    }
}
