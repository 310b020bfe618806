//! Polling change monitor.
//!
//! A [`FileMonitor`] watches a set of file objects from one background
//! task. Each pass refreshes every watched file and compares existence,
//! timestamp and (for folders) the child list against what it saw last:
//!
//! - existed, now gone: `deleted`, listener unregistered, file unwatched
//! - still there, timestamp moved: `changed` (files only)
//! - absent, now there: `created` (files only)
//! - new children of a folder: `created` for each, then watched
//!
//! Folder events are suppressed because their children's events already
//! describe the change. Additions and removals found during a pass are
//! queued and applied once the pass is over, so the watch set never
//! changes underneath an iteration.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::FutureExt;
use futures::future::BoxFuture;
use omnivfs_types::FileName;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::VfsResult;
use crate::listener::FileListener;
use crate::object::FileObject;

/// Monitor tuning. Loaded from the `[monitor]` table of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Pause between passes, and between chunks of one pass.
    pub delay_ms: u64,
    /// Files checked before pausing mid-pass; 0 checks everything at once.
    pub checks_per_run: usize,
    /// Also watch the descendants of added folders.
    pub recursive: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            delay_ms: 1000,
            checks_per_run: 1000,
            recursive: false,
        }
    }
}

impl MonitorConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// What the monitor last observed about one watched file.
struct Agent {
    file: Arc<FileObject>,
    exists: bool,
    timestamp: Option<SystemTime>,
    children: Option<BTreeSet<FileName>>,
}

impl Agent {
    async fn new(file: Arc<FileObject>) -> VfsResult<Self> {
        file.refresh();
        let mut agent = Self {
            file,
            exists: false,
            timestamp: None,
            children: None,
        };
        agent.reset_children().await?;
        agent.exists = agent.file.exists().await?;
        if agent.exists {
            agent.timestamp = agent.last_modified().await;
        }
        Ok(agent)
    }

    async fn last_modified(&self) -> Option<SystemTime> {
        match self.file.content().await {
            Ok(content) => content.last_modified().await.ok(),
            Err(_) => None,
        }
    }

    async fn child_set(&self) -> VfsResult<BTreeSet<FileName>> {
        Ok(self
            .file
            .children()
            .await?
            .iter()
            .map(|child| child.name().clone())
            .collect())
    }

    /// Snapshot the current children, if this is a folder.
    async fn reset_children(&mut self) -> VfsResult<()> {
        self.children = if self.file.is_folder().await? {
            Some(self.child_set().await?)
        } else {
            None
        };
        Ok(())
    }

    async fn check(&mut self, monitor: &Shared) -> VfsResult<()> {
        self.file.refresh();
        let exists = self.file.exists().await?;
        let fs = self.file.file_system().clone();
        let name = self.file.name().clone();

        if self.exists && !exists {
            self.exists = false;
            self.timestamp = None;
            fs.fire_file_deleted(&name);
            // Re-creation must not be reported twice.
            fs.remove_listener(&name, &monitor.listener);
            monitor.remove_queue.lock().push(name.clone());
        } else if self.exists && exists {
            let timestamp = self.last_modified().await;
            if timestamp != self.timestamp {
                self.timestamp = timestamp;
                if !self.file.is_folder().await? {
                    fs.fire_file_changed(&name);
                }
            }
        } else if !self.exists && exists {
            self.exists = true;
            self.timestamp = self.last_modified().await;
            if !self.file.is_folder().await? {
                fs.fire_file_created(&name);
            }
        }

        self.check_for_new_children(monitor).await
    }

    async fn check_for_new_children(&mut self, monitor: &Shared) -> VfsResult<()> {
        if !self.file.is_folder().await? {
            return Ok(());
        }
        let current = self.child_set().await?;
        let added: Vec<FileName> = match &self.children {
            Some(previous) => current.difference(previous).cloned().collect(),
            None => current.iter().cloned().collect(),
        };
        // Vanished children report their own deletion on their next check.
        self.children = Some(current);

        let fs = self.file.file_system().clone();
        for name in added {
            let child = fs.resolve_file(&name)?;
            monitor.fire_all_created(child).await?;
        }
        Ok(())
    }
}

type AgentRef = Arc<tokio::sync::Mutex<Agent>>;

struct Shared {
    listener: Arc<dyn FileListener>,
    config: RwLock<MonitorConfig>,
    agents: Mutex<BTreeMap<FileName, AgentRef>>,
    add_queue: Mutex<Vec<Arc<FileObject>>>,
    remove_queue: Mutex<Vec<FileName>>,
}

impl Shared {
    fn add_file(&self, file: Arc<FileObject>) -> BoxFuture<'_, VfsResult<()>> {
        async move {
            let name = file.name().clone();
            let watched = self.agents.lock().contains_key(&name);
            if watched {
                return Ok(());
            }

            let agent = Agent::new(file.clone()).await?;
            let inserted = {
                let mut agents = self.agents.lock();
                if agents.contains_key(&name) {
                    false
                } else {
                    agents.insert(name.clone(), Arc::new(tokio::sync::Mutex::new(agent)));
                    true
                }
            };
            if !inserted {
                return Ok(());
            }
            file.file_system().add_listener(&name, self.listener.clone());

            let recursive = self.config.read().recursive;
            if recursive && file.is_folder().await? {
                for child in file.children().await? {
                    self.add_file(child).await?;
                }
            }
            Ok(())
        }
        .boxed()
    }

    /// Stop watching `name` and re-snapshot its parent's children.
    async fn unwatch(&self, name: &FileName) -> Option<Arc<FileObject>> {
        let removed = self.agents.lock().remove(name);
        let file = removed?.lock().await.file.clone();

        let parent = name
            .parent()
            .and_then(|parent| self.agents.lock().get(&parent).cloned());
        if let Some(parent) = parent {
            let mut parent = parent.lock().await;
            if let Err(e) = parent.reset_children().await {
                tracing::warn!(file = %parent.file.name(), error = %e, "failed to reset child snapshot");
            }
        }
        Some(file)
    }

    fn is_watched_or_queued(&self, name: &FileName) -> bool {
        let watched = self.agents.lock().contains_key(name);
        watched || self.add_queue.lock().iter().any(|file| file.name() == name)
    }

    /// Report `file` and, in recursive mode, its descendants as created and
    /// queue them for watching.
    fn fire_all_created(&self, file: Arc<FileObject>) -> BoxFuture<'_, VfsResult<()>> {
        async move {
            let fs = file.file_system().clone();
            let name = file.name().clone();
            // A watched file reports its own creation.
            if self.is_watched_or_queued(&name) {
                return Ok(());
            }
            if fs.has_listener(&name, &self.listener) {
                fs.fire_file_created(&name);
            } else {
                fs.add_listener(&name, self.listener.clone());
                fs.fire_file_created(&name);
                fs.remove_listener(&name, &self.listener);
            }
            self.add_queue.lock().push(file.clone());

            let recursive = self.config.read().recursive;
            if recursive && file.is_folder().await? {
                for child in file.children().await? {
                    self.fire_all_created(child).await?;
                }
            }
            Ok(())
        }
        .boxed()
    }

    /// Check every watched file once. Returns false if cancelled mid-pass,
    /// in which case queued changes are left for the next pass.
    async fn run_pass(&self, cancel: &CancellationToken) -> bool {
        let agents: Vec<AgentRef> = self.agents.lock().values().cloned().collect();
        let (checks_per_run, delay) = {
            let config = self.config.read();
            (config.checks_per_run, config.delay())
        };

        for (checked, agent) in agents.iter().enumerate() {
            if cancel.is_cancelled() {
                return false;
            }
            {
                let mut agent = agent.lock().await;
                if let Err(e) = agent.check(self).await {
                    tracing::warn!(file = %agent.file.name(), error = %e, "monitor check failed");
                }
            }

            let done = checked + 1;
            if checks_per_run > 0 && done % checks_per_run == 0 && done < agents.len() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return false,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        self.apply_queues().await;
        true
    }

    async fn apply_queues(&self) {
        let added = std::mem::take(&mut *self.add_queue.lock());
        for file in added {
            let name = file.name().clone();
            if let Err(e) = self.add_file(file).await {
                tracing::warn!(file = %name, error = %e, "failed to watch new file");
            }
        }

        let removed = std::mem::take(&mut *self.remove_queue.lock());
        for name in removed {
            self.unwatch(&name).await;
        }
    }
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Watches files for creation, modification and deletion, and reports
/// them to one [`FileListener`].
pub struct FileMonitor {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl FileMonitor {
    pub fn new(listener: Arc<dyn FileListener>) -> Self {
        Self::with_config(listener, MonitorConfig::default())
    }

    pub fn with_config(listener: Arc<dyn FileListener>, config: MonitorConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                listener,
                config: RwLock::new(config),
                agents: Mutex::new(BTreeMap::new()),
                add_queue: Mutex::new(Vec::new()),
                remove_queue: Mutex::new(Vec::new()),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> MonitorConfig {
        self.shared.config.read().clone()
    }

    pub fn set_delay(&self, delay: Duration) {
        self.shared.config.write().delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    }

    pub fn set_checks_per_run(&self, checks_per_run: usize) {
        self.shared.config.write().checks_per_run = checks_per_run;
    }

    pub fn set_recursive(&self, recursive: bool) {
        self.shared.config.write().recursive = recursive;
    }

    /// Start watching `file` (and, in recursive mode, its current descendants).
    pub async fn add_file(&self, file: Arc<FileObject>) -> VfsResult<()> {
        self.shared.add_file(file).await
    }

    /// Stop watching `file` and unregister the monitor's listener from it.
    pub async fn remove_file(&self, file: &FileObject) {
        if self.shared.unwatch(file.name()).await.is_some() {
            file.file_system()
                .remove_listener(file.name(), &self.shared.listener);
        }
    }

    /// Names currently watched, sorted.
    pub fn watched(&self) -> Vec<FileName> {
        self.shared.agents.lock().keys().cloned().collect()
    }

    /// Run one full pass now, including the queued additions and removals.
    pub async fn run_pass(&self) {
        self.shared.run_pass(&CancellationToken::new()).await;
    }

    /// Spawn the background task. A no-op if it is already running.
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            tracing::info!("file monitor started");
            loop {
                if !shared.run_pass(&token).await {
                    break;
                }
                let delay = shared.config.read().delay();
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            tracing::info!("file monitor stopped");
        });
        *worker = Some(Worker { cancel, handle });
    }

    /// Stop the background task and wait for it to finish its current check.
    pub async fn stop(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.cancel.cancel();
            if let Err(e) = worker.handle.await {
                tracing::warn!(error = %e, "file monitor task failed");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }
}

impl Drop for FileMonitor {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.cancel.cancel();
        }
    }
}
