//! Dispatches `AgentRuntime`s across a bounded pool of concurrent task
//! drivers. One `tokio::task` per active task id runs `drive_once` in a
//! loop; a single background dispatcher reacts to the event log's feed to
//! spawn new tasks, queue overflow, and wake paused ones on a response.
//!
//! Grounded on the concurrency shape of a per-session semaphore-backed task
//! runner: lazy semaphore acquisition, a queue for what doesn't fit yet, and
//! eviction of bookkeeping tied to task terminality rather than age.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use seed_domain::event::DomainEvent;
use seed_store::EventLog;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent_runtime::{AgentRuntime, StepOutcome};

/// The inputs needed to build one task's `AgentRuntime`. Carried from
/// `TaskCreated` through to the factory closure.
#[derive(Debug, Clone)]
pub struct SpawnParams {
    pub task_id: String,
    pub agent_id: String,
    pub title: String,
    pub intent: Option<String>,
}

/// Builds a ready-to-drive `AgentRuntime` for one task. Supplied by the
/// caller (the orchestrator) since it alone knows the LLM provider, tool
/// registry, and store handles to wire in.
pub type RuntimeFactory = Arc<dyn Fn(SpawnParams, CancellationToken) -> AgentRuntime + Send + Sync>;

struct RuntimeHandle {
    cancel: CancellationToken,
    resume: Arc<Notify>,
}

pub struct RuntimeManager {
    log: Arc<EventLog>,
    factory: RuntimeFactory,
    semaphore: Arc<Semaphore>,
    handles: RwLock<HashMap<String, RuntimeHandle>>,
    queue: Mutex<VecDeque<SpawnParams>>,
    answered: Mutex<HashSet<(String, String)>>,
}

impl RuntimeManager {
    pub fn new(log: Arc<EventLog>, factory: RuntimeFactory, max_concurrent_runtimes: usize) -> Arc<Self> {
        Arc::new(Self {
            log,
            factory,
            semaphore: Arc::new(Semaphore::new(max_concurrent_runtimes.max(1).min(256))),
            handles: RwLock::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            answered: Mutex::new(HashSet::new()),
        })
    }

    /// Spawns the background dispatcher. Call once; the returned handle
    /// runs until the process exits or is aborted.
    pub fn spawn_dispatcher(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        let mut rx = self.log.subscribe();
        tokio::spawn(async move {
            loop {
                let stored = match rx.recv().await {
                    Ok(stored) => stored,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "runtime dispatcher lagged behind event log feed");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };

                match stored.event {
                    DomainEvent::TaskCreated { task_id, title, intent, agent_id, .. } => {
                        this.try_spawn_or_enqueue(SpawnParams { task_id, agent_id, title, intent });
                    }
                    DomainEvent::UserInteractionResponded { task_id, interaction_id, .. } => {
                        this.wake(&task_id, &interaction_id);
                    }
                    DomainEvent::TaskCompleted { task_id, .. }
                    | DomainEvent::TaskFailed { task_id, .. }
                    | DomainEvent::TaskCanceled { task_id, .. } => {
                        this.retire(&task_id);
                    }
                    _ => {}
                }
            }
        })
    }

    /// Cancels a running task's driver loop, if one is active.
    pub fn cancel(&self, task_id: &str) {
        if let Some(handle) = self.handles.read().get(task_id) {
            handle.cancel.cancel();
            handle.resume.notify_one();
        }
    }

    fn try_spawn_or_enqueue(self: &Arc<Self>, params: SpawnParams) {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => self.spawn(params, permit),
            Err(_) => {
                info!(task_id = %params.task_id, "no runtime capacity, queuing");
                self.queue.lock().push_back(params);
            }
        }
    }

    fn spawn(self: &Arc<Self>, params: SpawnParams, permit: tokio::sync::OwnedSemaphorePermit) {
        let task_id = params.task_id.clone();
        let cancel = CancellationToken::new();
        let resume = Arc::new(Notify::new());
        self.handles.write().insert(
            task_id.clone(),
            RuntimeHandle { cancel: cancel.clone(), resume: resume.clone() },
        );

        let mut runtime = (self.factory)(params, cancel);
        let this = self.clone();
        tokio::spawn(async move {
            let _permit = permit;
            loop {
                let outcome = match runtime.drive_once().await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(task_id = %task_id, error = %e, "runtime step failed");
                        break;
                    }
                };
                match outcome {
                    StepOutcome::Continue => continue,
                    StepOutcome::AwaitingUser => resume.notified().await,
                    StepOutcome::Completed | StepOutcome::Failed | StepOutcome::Canceled => break,
                }
            }
            this.retire(&task_id);
        });
    }

    fn wake(&self, task_id: &str, interaction_id: &str) {
        let key = (task_id.to_string(), interaction_id.to_string());
        if !self.answered.lock().insert(key) {
            return;
        }
        if let Some(handle) = self.handles.read().get(task_id) {
            handle.resume.notify_one();
        }
    }

    /// Drops bookkeeping for a task that reached a terminal state and
    /// promotes the next queued task, if capacity allows.
    fn retire(self: &Arc<Self>, task_id: &str) {
        self.handles.write().remove(task_id);
        self.answered.lock().retain(|(t, _)| t != task_id);

        let next = self.queue.lock().pop_front();
        if let Some(params) = next {
            self.try_spawn_or_enqueue(params);
        }
    }
}
