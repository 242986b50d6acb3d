//! Dispatch queue decoupling task submission from execution
//!
//! A fixed set of workers drains a shared channel and runs each task through
//! the injected [`BuildRunner`]. The channel holds at most one task, so
//! `submit` backpressures as soon as every worker is busy and one task is
//! already waiting for pickup.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::{error, info, warn};

use crate::error::HookError;
use crate::model::BuildTask;

/// Collaborator that executes one dequeued build task
#[async_trait]
pub trait BuildRunner: Send + Sync + 'static {
    async fn run(&self, task: BuildTask) -> Result<(), HookError>;
}

/// Handle for submitting tasks to the worker pool
#[derive(Clone)]
pub struct DispatchQueue {
    tasks: mpsc::Sender<BuildTask>,
}

impl DispatchQueue {
    /// Start `workers` long-lived workers draining a shared channel.
    pub fn start(workers: usize, runner: Arc<dyn BuildRunner>) -> Self {
        let (tasks, rx) = mpsc::channel::<BuildTask>(1);
        let rx = Arc::new(Mutex::new(rx));

        info!("Starting dispatch queue with {} workers", workers);
        for worker_id in 0..workers {
            let rx = rx.clone();
            let runner = runner.clone();
            tokio::spawn(async move {
                worker_loop(worker_id, rx, runner).await;
            });
        }

        Self { tasks }
    }

    /// Hand a task to the pool. Awaits until the channel accepts it; each
    /// submitted task is executed by exactly one worker. Fails only if all
    /// workers are gone.
    pub async fn submit(&self, task: BuildTask) -> Result<(), HookError> {
        self.tasks.send(task).await.map_err(|_| HookError::QueueClosed)
    }
}

/// Runner that only logs the tasks it receives. Stands in until a build
/// execution engine is wired up behind the queue.
pub struct LogRunner;

#[async_trait]
impl BuildRunner for LogRunner {
    async fn run(&self, task: BuildTask) -> Result<(), HookError> {
        info!(
            slug = %task.repo.slug,
            hash = %task.commit.hash,
            build_id = task.build.id,
            commands = task.plan.script.len(),
            "Received build task"
        );
        Ok(())
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<BuildTask>>>,
    runner: Arc<dyn BuildRunner>,
) {
    loop {
        // Hold the lock only while waiting for one task, so workers
        // take turns receiving instead of serializing execution.
        let task = { rx.lock().await.recv().await };
        let Some(task) = task else {
            info!(worker_id, "Dispatch queue closed, worker exiting");
            break;
        };

        let hash = task.commit.hash.clone();
        let slug = task.repo.slug.clone();
        info!(worker_id, %slug, %hash, "Worker picked up build task");

        // Run inside its own task so a panicking runner fails this
        // build without taking the worker down with it.
        let run = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.run(task).await })
        };

        match run.await {
            Ok(Ok(())) => {
                info!(worker_id, %slug, %hash, "Build task finished");
            }
            Ok(Err(e)) => {
                warn!(worker_id, %slug, %hash, "Build task failed: {}", e);
            }
            Err(join_err) => {
                error!(worker_id, %slug, %hash, "Build runner panicked: {}", join_err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Build, BuildTask, Commit, Repo, ScmKind};
    use crate::script::BuildPlan;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    fn task(hash: &str) -> BuildTask {
        let repo = Repo::new(
            "gogs.local",
            "acme",
            "widget",
            ScmKind::Git,
            "http://gogs.local/acme/widget",
        );
        let commit = Commit::new(
            1,
            "main".to_string(),
            hash.to_string(),
            "fix".to_string(),
            "a".to_string(),
        );
        let build = Build::pending(1);
        BuildTask {
            repo,
            commit,
            build,
            plan: BuildPlan::default(),
        }
    }

    /// Runner that tracks how many tasks run at once and in total.
    struct CountingRunner {
        running: AtomicUsize,
        max_running: AtomicUsize,
        completed: AtomicUsize,
    }

    impl CountingRunner {
        fn new() -> Self {
            Self {
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BuildRunner for CountingRunner {
        async fn run(&self, _task: BuildTask) -> Result<(), HookError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(25)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn wait_for(completed: &AtomicUsize, expected: usize) {
        for _ in 0..200 {
            if completed.load(Ordering::SeqCst) >= expected {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {} completed tasks, saw {}",
            expected,
            completed.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn every_task_runs_exactly_once_bounded_by_worker_count() {
        let runner = Arc::new(CountingRunner::new());
        let queue = DispatchQueue::start(2, runner.clone());

        for i in 0..6 {
            queue.submit(task(&format!("hash{}", i))).await.unwrap();
        }

        wait_for(&runner.completed, 6).await;
        assert_eq!(runner.completed.load(Ordering::SeqCst), 6);
        assert!(runner.max_running.load(Ordering::SeqCst) <= 2);
    }

    struct PanickyRunner {
        completed: AtomicUsize,
    }

    #[async_trait]
    impl BuildRunner for PanickyRunner {
        async fn run(&self, task: BuildTask) -> Result<(), HookError> {
            if task.commit.hash == "boom" {
                panic!("runner blew up");
            }
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn a_panicking_run_does_not_kill_the_worker() {
        let runner = Arc::new(PanickyRunner {
            completed: AtomicUsize::new(0),
        });
        let queue = DispatchQueue::start(1, runner.clone());

        queue.submit(task("boom")).await.unwrap();
        queue.submit(task("ok")).await.unwrap();

        wait_for(&runner.completed, 1).await;
    }

    #[tokio::test]
    async fn submitting_with_no_workers_left_fails() {
        let runner = Arc::new(CountingRunner::new());
        // With zero workers the receiver is dropped before start() returns.
        let queue = DispatchQueue::start(0, runner);
        let result = queue.submit(task("lost")).await;
        assert!(matches!(result, Err(HookError::QueueClosed)));
    }
}
