//! Plan persistence
//!
//! Writes the synthesized plan to `.stackflow/plan.json`. The previous plan is
//! kept as `plan.json.backup` and writers serialize on `lock.json`.

use crate::error::{CloudError, Result};
use crate::plan::DeploymentPlan;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const PLAN_VERSION: u32 = 1;
const PLAN_DIR: &str = ".stackflow";
const PLAN_FILE: &str = "plan.json";
const PLAN_BACKUP: &str = "plan.json.backup";
const PLAN_STAGING: &str = "plan.json.tmp";
const LOCK_FILE: &str = "lock.json";

/// Locks older than this are considered abandoned
fn stale_after() -> Duration {
    Duration::hours(1)
}

/// Plan file contents
///
/// Identical plans produce identical files; when a plan was written is
/// recorded in the lock, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPlan {
    pub version: u32,
    pub plan: DeploymentPlan,
}

impl StoredPlan {
    pub fn new(plan: DeploymentPlan) -> Self {
        Self {
            version: PLAN_VERSION,
            plan,
        }
    }
}

/// Reads and writes plan files in one directory
pub struct PlanStore {
    dir: PathBuf,
}

impl PlanStore {
    /// Store under `<project_root>/.stackflow`
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self::in_dir(project_root.as_ref().join(PLAN_DIR))
    }

    /// Store directly in `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn plan_path(&self) -> PathBuf {
        self.dir.join(PLAN_FILE)
    }

    fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Load the last written plan, if any
    pub async fn load(&self) -> Result<Option<StoredPlan>> {
        let content = match fs::read_to_string(self.plan_path()).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(dir = %self.dir.display(), "No plan stored yet");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let stored: StoredPlan = serde_json::from_str(&content)?;
        if stored.version > PLAN_VERSION {
            return Err(CloudError::StoreError(format!(
                "plan file version {} is newer than supported version {}",
                stored.version, PLAN_VERSION
            )));
        }

        debug!(stacks = stored.plan.stacks.len(), "Loaded plan");
        Ok(Some(stored))
    }

    /// Write `plan`, moving the previous file to the backup slot
    ///
    /// The new plan is staged next to the target and renamed into place, so
    /// readers never see a half-written file.
    pub async fn save(&self, plan: &DeploymentPlan) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;

        let target = self.plan_path();
        let staging = self.file(PLAN_STAGING);
        let content = serde_json::to_string_pretty(&StoredPlan::new(plan.clone()))?;
        fs::write(&staging, content).await?;

        match fs::rename(&target, self.file(PLAN_BACKUP)).await {
            Ok(()) => debug!("Previous plan moved to backup"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::rename(&staging, &target).await?;

        debug!(path = %target.display(), stacks = plan.stacks.len(), "Saved plan");
        Ok(target)
    }

    /// Take the advisory lock
    ///
    /// The lock file is created exclusively; a lock older than an hour is
    /// replaced once.
    pub async fn acquire_lock(&self) -> Result<PlanLock> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.file(LOCK_FILE);
        let holder = LockHolder::current();

        for _ in 0..2 {
            match create_exclusive(&path, &holder).await {
                Ok(()) => {
                    debug!(holder = %holder.name, "Acquired plan lock");
                    return Ok(PlanLock {
                        path,
                        released: false,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let existing = read_holder(&path).await?;
                    if Utc::now() - existing.acquired_at < stale_after() {
                        return Err(CloudError::LockError(format!(
                            "plan is locked by {} since {}",
                            existing.name, existing.acquired_at
                        )));
                    }
                    warn!(holder = %existing.name, "Replacing stale plan lock");
                    fs::remove_file(&path).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CloudError::LockError(format!(
            "could not take {} after removing a stale lock",
            path.display()
        )))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockHolder {
    #[serde(rename = "holder")]
    name: String,
    acquired_at: DateTime<Utc>,
}

impl LockHolder {
    fn current() -> Self {
        let host = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("HOST"))
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            name: format!("{}:{}", host, std::process::id()),
            acquired_at: Utc::now(),
        }
    }
}

async fn create_exclusive(path: &Path, holder: &LockHolder) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    let content = serde_json::to_vec_pretty(holder)?;
    file.write_all(&content).await?;
    file.flush().await
}

async fn read_holder(path: &Path) -> Result<LockHolder> {
    let content = fs::read_to_string(path).await?;
    serde_json::from_str(&content)
        .map_err(|e| CloudError::LockError(format!("unreadable lock file {}: {}", path.display(), e)))
}

/// Held while a plan is written; removed on release or drop
#[derive(Debug)]
pub struct PlanLock {
    path: PathBuf,
    released: bool,
}

impl PlanLock {
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("Released plan lock");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for PlanLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ResourceGraph;
    use crate::plan::StackPlan;
    use crate::resource::{AttrValue, ResourceKind};
    use tempfile::tempdir;

    fn plan(stack: &str) -> DeploymentPlan {
        let mut graph = ResourceGraph::new(stack, "us-east-1");
        graph
            .add_resource(
                ResourceKind::HostedZone,
                "HostedZone",
                [("zoneName", AttrValue::literal("example.com"))],
            )
            .unwrap();
        graph.seal().unwrap();
        let mut plan = DeploymentPlan::new();
        plan.push_stack(StackPlan::build(&graph, Vec::new()).unwrap())
            .unwrap();
        plan
    }

    #[tokio::test]
    async fn test_plan_save_load() {
        let temp_dir = tempdir().unwrap();
        let store = PlanStore::new(temp_dir.path());

        let path = store.save(&plan("UsStack")).await.unwrap();
        assert_eq!(path, temp_dir.path().join(".stackflow/plan.json"));

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.version, PLAN_VERSION);
        assert_eq!(loaded.plan, plan("UsStack"));
    }

    #[tokio::test]
    async fn test_same_plan_same_bytes() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();

        let a = PlanStore::in_dir(first.path()).save(&plan("UsStack")).await.unwrap();
        let b = PlanStore::in_dir(second.path()).save(&plan("UsStack")).await.unwrap();

        assert_eq!(std::fs::read(a).unwrap(), std::fs::read(b).unwrap());
    }

    #[tokio::test]
    async fn test_empty_store() {
        let temp_dir = tempdir().unwrap();
        let store = PlanStore::new(temp_dir.path());
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_previous_plan_backed_up() {
        let temp_dir = tempdir().unwrap();
        let store = PlanStore::in_dir(temp_dir.path());

        store.save(&plan("First")).await.unwrap();
        store.save(&plan("Second")).await.unwrap();

        let backup = std::fs::read_to_string(temp_dir.path().join("plan.json.backup")).unwrap();
        assert!(backup.contains("\"First\""));
        let current = store.load().await.unwrap().unwrap();
        assert_eq!(current.plan.stacks[0].stack, "Second");
    }

    #[tokio::test]
    async fn test_newer_version_rejected() {
        let temp_dir = tempdir().unwrap();
        let store = PlanStore::in_dir(temp_dir.path());
        let mut stored = StoredPlan::new(plan("UsStack"));
        stored.version = PLAN_VERSION + 1;
        std::fs::write(
            store.plan_path(),
            serde_json::to_string(&stored).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            store.load().await.unwrap_err(),
            CloudError::StoreError(_)
        ));
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let temp_dir = tempdir().unwrap();
        let store = PlanStore::new(temp_dir.path());

        let lock = store.acquire_lock().await.unwrap();
        assert!(matches!(
            store.acquire_lock().await.unwrap_err(),
            CloudError::LockError(_)
        ));

        lock.release().await.unwrap();
        let again = store.acquire_lock().await.unwrap();
        drop(again);
        assert!(!temp_dir.path().join(".stackflow/lock.json").exists());
    }

    #[tokio::test]
    async fn test_stale_lock_replaced() {
        let temp_dir = tempdir().unwrap();
        let store = PlanStore::in_dir(temp_dir.path());
        let stale = LockHolder {
            name: "old-runner:42".to_string(),
            acquired_at: Utc::now() - Duration::hours(3),
        };
        std::fs::write(
            temp_dir.path().join(LOCK_FILE),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        let lock = store.acquire_lock().await.unwrap();
        let content = std::fs::read_to_string(temp_dir.path().join(LOCK_FILE)).unwrap();
        assert!(!content.contains("old-runner"));
        lock.release().await.unwrap();
    }
}
