//! Dependency queue: holds mutation jobs until the rows they reference are
//! available, and serializes all job execution onto one worker thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{Sender, unbounded};

use super::info::DeviceInfo;
use super::{DeviceKey, RowClass};

type JobAction = Box<dyn FnOnce(&DeviceInfo) + Send>;

/// A deferred mutation: the keys it waits on (config side and oper side) and
/// the action to run once every one of them is present and settled.
pub struct DependentJob {
    key: DeviceKey,
    config_dependencies: Vec<(RowClass, DeviceKey)>,
    op_dependencies: Vec<(RowClass, DeviceKey)>,
    action: JobAction,
}

impl DependentJob {
    pub fn new(key: DeviceKey, action: impl FnOnce(&DeviceInfo) + Send + 'static) -> Self {
        DependentJob {
            key,
            config_dependencies: Vec::new(),
            op_dependencies: Vec::new(),
            action: Box::new(action),
        }
    }

    pub fn waiting_on_config(mut self, class: RowClass, key: DeviceKey) -> Self {
        self.config_dependencies.push((class, key));
        self
    }

    pub fn waiting_on_op(mut self, class: RowClass, key: DeviceKey) -> Self {
        self.op_dependencies.push((class, key));
        self
    }

    pub fn key(&self) -> &DeviceKey {
        &self.key
    }

    pub(super) fn config_dependencies(&self) -> &[(RowClass, DeviceKey)] {
        &self.config_dependencies
    }

    pub(super) fn op_dependencies(&self) -> &[(RowClass, DeviceKey)] {
        &self.op_dependencies
    }
}

enum WorkItem {
    Run(Box<dyn FnOnce() + Send>),
    Shutdown,
}

/// Two holding lists plus one worker thread. Jobs with config-side
/// dependencies wait on the config list and are re-checked when config data
/// arrives; everything else waits on the oper list. Ordinary transaction
/// dispatches submitted through [`DependencyQueue::submit`] run on the same
/// worker, so replays and normal mutations share ordering discipline.
pub struct DependencyQueue {
    config_waiting: Mutex<Vec<DependentJob>>,
    op_waiting: Mutex<Vec<DependentJob>>,
    worker_tx: Sender<WorkItem>,
    worker: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl DependencyQueue {
    pub fn new(worker_name: &str) -> Self {
        let (worker_tx, worker_rx) = unbounded::<WorkItem>();
        let worker = thread::Builder::new()
            .name(worker_name.to_string())
            .spawn(move || {
                while let Ok(item) = worker_rx.recv() {
                    match item {
                        WorkItem::Run(work) => work(),
                        WorkItem::Shutdown => break,
                    }
                }
            })
            .expect("spawn dependency queue worker");

        DependencyQueue {
            config_waiting: Mutex::new(Vec::new()),
            op_waiting: Mutex::new(Vec::new()),
            worker_tx,
            worker: Mutex::new(Some(worker)),
            closed: AtomicBool::new(false),
        }
    }

    /// Queues the job, or submits it right away when its dependencies are
    /// already met.
    pub fn add_to_queue(&self, registry: &Arc<DeviceInfo>, job: DependentJob) {
        if registry.dependencies_met(&job) {
            self.run_job(registry, job);
            return;
        }
        tracing::debug!(key = %job.key(), "queueing job on unresolved dependencies");
        if job.config_dependencies.is_empty() {
            self.op_waiting.lock().expect("op queue lock").push(job);
        } else {
            self.config_waiting
                .lock()
                .expect("config queue lock")
                .push(job);
        }
    }

    pub fn process_ready_jobs_from_config_queue(&self, registry: &Arc<DeviceInfo>) {
        self.process_ready(registry, &self.config_waiting);
    }

    pub fn process_ready_jobs_from_op_queue(&self, registry: &Arc<DeviceInfo>) {
        self.process_ready(registry, &self.op_waiting);
    }

    /// Serializes ordinary work onto the queue worker.
    pub fn submit(&self, work: impl FnOnce() + Send + 'static) {
        if self.closed.load(Ordering::Acquire) {
            tracing::debug!("dependency queue closed, dropping submitted work");
            return;
        }
        let _ = self.worker_tx.send(WorkItem::Run(Box::new(work)));
    }

    /// Drains both holding lists without running the jobs and stops the
    /// worker. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.config_waiting.lock().expect("config queue lock").clear();
        self.op_waiting.lock().expect("op queue lock").clear();
        let _ = self.worker_tx.send(WorkItem::Shutdown);
        if let Some(worker) = self.worker.lock().expect("worker handle lock").take()
            && worker.thread().id() != thread::current().id()
        {
            let _ = worker.join();
        }
    }

    pub fn pending_jobs(&self) -> usize {
        self.config_waiting.lock().expect("config queue lock").len()
            + self.op_waiting.lock().expect("op queue lock").len()
    }

    /// Ready jobs leave the list before execution, so a job runs exactly
    /// once even when hooks fire back-to-back.
    fn process_ready(&self, registry: &Arc<DeviceInfo>, waiting: &Mutex<Vec<DependentJob>>) {
        let ready: Vec<DependentJob> = {
            let mut waiting = waiting.lock().expect("queue lock");
            let mut still_waiting = Vec::with_capacity(waiting.len());
            let mut ready = Vec::new();
            for job in waiting.drain(..) {
                if registry.dependencies_met(&job) {
                    ready.push(job);
                } else {
                    still_waiting.push(job);
                }
            }
            *waiting = still_waiting;
            ready
        };

        for job in ready {
            self.run_job(registry, job);
        }
    }

    fn run_job(&self, registry: &Arc<DeviceInfo>, job: DependentJob) {
        let registry = Arc::clone(registry);
        let action = job.action;
        self.submit(move || action(&registry));
    }
}

impl Drop for DependencyQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use crate::notation::Row;

    use uuid::Uuid;

    fn key(s: &str) -> DeviceKey {
        DeviceKey::from(s)
    }

    fn wait_for(condition: impl Fn() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not reached");
    }

    #[test]
    fn job_runs_once_when_oper_data_arrives() {
        let info = DeviceInfo::new(30_000, "ovsdb-worker-test");
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let job = DependentJob::new(key("job"), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .waiting_on_op(RowClass::LogicalSwitch, key("L1"));

        info.add_job_to_queue(job);
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        info.update_device_oper_data(
            RowClass::LogicalSwitch,
            &key("L1"),
            Uuid::new_v4(),
            Row::new(),
        );
        info.on_oper_data_available();
        wait_for(|| ran.load(Ordering::SeqCst) == 1);

        // A second hook does not replay the job.
        info.on_oper_data_available();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn job_stays_queued_while_dependency_is_in_transit() {
        let info = DeviceInfo::new(30_000, "ovsdb-worker-test");
        info.update_device_oper_data(
            RowClass::LogicalSwitch,
            &key("L1"),
            Uuid::new_v4(),
            Row::new(),
        );
        info.mark_key_as_in_transit(RowClass::LogicalSwitch, &key("L1"));

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let job = DependentJob::new(key("job"), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .waiting_on_op(RowClass::LogicalSwitch, key("L1"));
        info.add_job_to_queue(job);

        info.on_oper_data_available();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        info.clear_in_transit(RowClass::LogicalSwitch, &key("L1"));
        info.on_oper_data_available();
        wait_for(|| ran.load(Ordering::SeqCst) == 1);
    }

    #[test]
    fn expired_transit_unblocks_the_job() {
        // Zero expiry: any IN_TRANSIT entry is immediately stale.
        let info = DeviceInfo::new(0, "ovsdb-worker-test");
        info.update_device_oper_data(
            RowClass::LogicalSwitch,
            &key("L1"),
            Uuid::new_v4(),
            Row::new(),
        );
        info.mark_key_as_in_transit(RowClass::LogicalSwitch, &key("L1"));

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let job = DependentJob::new(key("job"), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .waiting_on_op(RowClass::LogicalSwitch, key("L1"));

        thread::sleep(Duration::from_millis(5));
        info.add_job_to_queue(job);
        wait_for(|| ran.load(Ordering::SeqCst) == 1);
    }

    #[test]
    fn config_dependencies_wait_on_config_hook() {
        let info = DeviceInfo::new(30_000, "ovsdb-worker-test");
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let job = DependentJob::new(key("job"), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .waiting_on_config(RowClass::LogicalSwitch, key("L1"));
        info.add_job_to_queue(job);

        info.update_config_data(RowClass::LogicalSwitch, &key("L1"), Row::new());
        info.on_config_data_available();
        wait_for(|| ran.load(Ordering::SeqCst) == 1);
    }

    #[test]
    fn ready_job_runs_without_a_hook() {
        let info = DeviceInfo::new(30_000, "ovsdb-worker-test");
        info.update_device_oper_data(
            RowClass::LogicalSwitch,
            &key("L1"),
            Uuid::new_v4(),
            Row::new(),
        );
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let job = DependentJob::new(key("job"), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .waiting_on_op(RowClass::LogicalSwitch, key("L1"));
        info.add_job_to_queue(job);
        wait_for(|| ran.load(Ordering::SeqCst) == 1);
    }

    #[test]
    fn submitted_work_is_serialized_with_jobs() {
        let info = DeviceInfo::new(30_000, "ovsdb-worker-test");
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&order);
        info.schedule_transaction(move || {
            first.lock().unwrap().push("transact-1");
            thread::sleep(Duration::from_millis(10));
        });
        let second = Arc::clone(&order);
        info.schedule_transaction(move || second.lock().unwrap().push("transact-2"));

        wait_for(|| order.lock().unwrap().len() == 2);
        assert_eq!(*order.lock().unwrap(), vec!["transact-1", "transact-2"]);
    }

    #[test]
    fn shutdown_drains_without_running() {
        let info = DeviceInfo::new(30_000, "ovsdb-worker-test");
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let job = DependentJob::new(key("job"), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .waiting_on_op(RowClass::LogicalSwitch, key("never"));
        info.add_job_to_queue(job);

        info.shutdown();
        info.shutdown();

        info.update_device_oper_data(
            RowClass::LogicalSwitch,
            &key("never"),
            Uuid::new_v4(),
            Row::new(),
        );
        info.on_oper_data_available();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
