//! Periodic task contract and a cooperative reference scheduler.
//!
//! The core never spawns its own control thread: each actuator exposes one
//! control task and the odometry registry exposes one sampler task. Whatever
//! drives the robot loop invokes them through [`TaskScheduler`].
//!
//! [`CooperativeScheduler`] runs every registered task synchronously from
//! `run_once`; `spawn` wraps that in a paced background thread that is joined
//! on drop, like the sensor sampler thread it is modeled on.
use actuator_traits::clock::Clock;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Phase a task runs in. Standalone tasks (sensor sampling) run before the
/// output tasks of the same cycle so control sees fresh odometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Standalone,
    Output,
}

pub trait PeriodicTask: Send + Sync {
    fn name(&self) -> &str;
    fn run(&self, now: Instant);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

pub trait TaskScheduler: Send + Sync {
    fn register(&self, kind: TaskKind, task: Arc<dyn PeriodicTask>) -> TaskHandle;
    /// Returns false when the handle was not registered.
    fn unregister(&self, handle: TaskHandle) -> bool;
}

struct Entry {
    handle: TaskHandle,
    kind: TaskKind,
    task: Arc<dyn PeriodicTask>,
}

#[derive(Default)]
pub struct CooperativeScheduler {
    tasks: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
}

impl CooperativeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn task_names(&self) -> Vec<String> {
        self.tasks
            .lock()
            .iter()
            .map(|e| e.task.name().to_string())
            .collect()
    }

    /// Run one cycle: standalone tasks first, then output tasks.
    ///
    /// The task list is snapshotted before running so a task may register or
    /// unregister tasks without deadlocking.
    pub fn run_once(&self, now: Instant) {
        let snapshot: Vec<(TaskKind, Arc<dyn PeriodicTask>)> = self
            .tasks
            .lock()
            .iter()
            .map(|e| (e.kind, e.task.clone()))
            .collect();
        for kind in [TaskKind::Standalone, TaskKind::Output] {
            for (_, task) in snapshot.iter().filter(|(k, _)| *k == kind) {
                task.run(now);
            }
        }
    }

    /// Drive `run_once` from a background thread at `hz`.
    pub fn spawn<C: Clock + Send + Sync + 'static>(
        self: &Arc<Self>,
        hz: u32,
        clock: C,
    ) -> SchedulerThread {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let sched = self.clone();
        let period = Duration::from_micros(crate::util::period_us(hz));

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("scheduler thread received shutdown signal");
                    break;
                }
                let started = clock.now();
                sched.run_once(started);
                let spent = clock.now().saturating_duration_since(started);
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                clock.sleep(period.saturating_sub(spent));
            }
            tracing::trace!("scheduler thread exiting cleanly");
        });

        SchedulerThread {
            shutdown,
            join_handle: Some(join_handle),
        }
    }
}

impl TaskScheduler for CooperativeScheduler {
    fn register(&self, kind: TaskKind, task: Arc<dyn PeriodicTask>) -> TaskHandle {
        let handle = TaskHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(task = task.name(), ?kind, "task registered");
        self.tasks.lock().push(Entry { handle, kind, task });
        handle
    }

    fn unregister(&self, handle: TaskHandle) -> bool {
        let mut tasks = self.tasks.lock();
        let before = tasks.len();
        tasks.retain(|e| e.handle != handle);
        before != tasks.len()
    }
}

/// Background driver for a [`CooperativeScheduler`]; stops and joins on drop.
pub struct SchedulerThread {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl SchedulerThread {
    pub fn stop(mut self) {
        self.join();
    }

    fn join(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("scheduler thread joined successfully"),
                Err(e) => tracing::warn!(?e, "scheduler thread panicked during shutdown"),
            }
        }
    }
}

impl Drop for SchedulerThread {
    fn drop(&mut self) {
        self.join();
    }
}
