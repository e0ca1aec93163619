//! Strict-FIFO task queue gating all access to the shared peer.
//!
//! The peer can run one script at a time, so every operation against it is
//! wrapped in a task and drained by a single worker: pop the head, await
//! it, fire its continuation, pop the next. The drain is an explicit loop —
//! queue depth never grows the call stack.
//!
//! A task's failure settles only that task's caller; the worker always
//! advances to the next task regardless of the previous outcome.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::aggregator::ScriptOutput;
use crate::error::{BridgeError, BridgeResult};

const LOG_TARGET: &str = "ukibashi::queue";

/// Identifier of one queued task, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(i64);

impl TaskId {
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

/// Settlement value of one queued task.
pub type TaskResult = BridgeResult<ScriptOutput>;

type TaskFuture = Pin<Box<dyn Future<Output = TaskResult> + Send>>;

struct QueuedTask {
    id: TaskId,
    future: TaskFuture,
    /// The continuation pair for this task: created at enqueue, consumed
    /// exactly once at settlement.
    completion: oneshot::Sender<TaskResult>,
    enqueued_at: tokio::time::Instant,
}

/// FIFO serializer ensuring at most one task runs against the peer at a
/// time.
pub struct TaskQueue {
    submit: mpsc::UnboundedSender<QueuedTask>,
    next_id: AtomicI64,
    /// Id of the task currently awaiting settlement; 0 when idle.
    active: Arc<AtomicI64>,
    worker: JoinHandle<()>,
}

impl TaskQueue {
    /// Spawn the drain worker. Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let (submit, receive) = mpsc::unbounded_channel();
        let active = Arc::new(AtomicI64::new(0));
        let worker = tokio::spawn(drain(receive, Arc::clone(&active)));
        Self {
            submit,
            next_id: AtomicI64::new(1),
            active,
            worker,
        }
    }

    /// Append a task to the tail. Returns its id and the receiver its
    /// settlement will fire.
    pub fn enqueue<F>(&self, future: F) -> BridgeResult<(TaskId, oneshot::Receiver<TaskResult>)>
    where
        F: Future<Output = TaskResult> + Send + 'static,
    {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (completion, settled) = oneshot::channel();
        let task = QueuedTask {
            id,
            future: Box::pin(future),
            completion,
            enqueued_at: tokio::time::Instant::now(),
        };
        self.submit.send(task).map_err(|_| BridgeError::QueueClosed)?;
        log::trace!(target: LOG_TARGET, "task {} enqueued", id.as_i64());
        Ok((id, settled))
    }

    /// Enqueue a task and wait for its settlement.
    pub async fn run<F>(&self, future: F) -> TaskResult
    where
        F: Future<Output = TaskResult> + Send + 'static,
    {
        let (_id, settled) = self.enqueue(future)?;
        settled.await.map_err(|_| BridgeError::QueueClosed)?
    }

    /// The task currently executing, if any.
    pub fn active_task_id(&self) -> Option<TaskId> {
        match self.active.load(Ordering::SeqCst) {
            0 => None,
            id => Some(TaskId(id)),
        }
    }

    /// Stop accepting tasks and wait for already-queued ones to finish.
    pub async fn close(self) {
        let TaskQueue { submit, worker, .. } = self;
        drop(submit);
        if worker.await.is_err() {
            log::warn!(target: LOG_TARGET, "queue worker terminated abnormally");
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain loop: strictly FIFO, one task in flight at a time.
async fn drain(mut receive: mpsc::UnboundedReceiver<QueuedTask>, active: Arc<AtomicI64>) {
    while let Some(task) = receive.recv().await {
        let id = task.id.as_i64();
        active.store(id, Ordering::SeqCst);
        log::debug!(
            target: LOG_TARGET,
            "task {id} started after {:?} queued",
            task.enqueued_at.elapsed()
        );

        let result = task.future.await;

        active.store(0, Ordering::SeqCst);
        if let Err(error) = &result {
            log::debug!(target: LOG_TARGET, "task {id} failed: {error}");
        }
        // A caller that stopped waiting is fine; the queue advances
        // regardless.
        if task.completion.send(result).is_err() {
            log::trace!(target: LOG_TARGET, "task {id} settled with no caller listening");
        }
    }
    log::debug!(target: LOG_TARGET, "queue closed, worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn output(value: serde_json::Value) -> TaskResult {
        Ok(ScriptOutput::Single(value))
    }

    #[tokio::test]
    async fn tasks_run_in_enqueue_order() {
        let queue = TaskQueue::new();
        let order: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));

        let mut receivers = Vec::new();
        for n in 1..=3u32 {
            let order = Arc::clone(&order);
            let (_, rx) = queue
                .enqueue(async move {
                    // Yield so an out-of-order worker would interleave.
                    tokio::task::yield_now().await;
                    order.lock().unwrap().push(n);
                    output(json!(n))
                })
                .unwrap();
            receivers.push(rx);
        }

        for rx in receivers {
            rx.await.unwrap().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn at_most_one_task_executes_at_a_time() {
        let queue = TaskQueue::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));

        let mut receivers = Vec::new();
        for _ in 0..5 {
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);
            let (_, rx) = queue
                .enqueue(async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_flight.fetch_max(now, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    tokio::task::yield_now().await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    output(json!(null))
                })
                .unwrap();
            receivers.push(rx);
        }

        for rx in receivers {
            rx.await.unwrap().unwrap();
        }
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn task_ids_are_monotonic() {
        let queue = TaskQueue::new();
        let (first, _rx1) = queue.enqueue(async { output(json!(1)) }).unwrap();
        let (second, _rx2) = queue.enqueue(async { output(json!(2)) }).unwrap();
        assert!(second.as_i64() > first.as_i64());
    }

    /// A rejected task settles only its own caller; the next task proceeds.
    #[tokio::test]
    async fn failure_does_not_stall_the_queue() {
        let queue = TaskQueue::new();

        let (_, failing) = queue
            .enqueue(async {
                Err(BridgeError::Transport {
                    message: "boom".to_string(),
                })
            })
            .unwrap();

        let ok = queue.run(async { output(json!("after")) }).await.unwrap();
        assert_eq!(ok, ScriptOutput::Single(json!("after")));

        let failed = failing.await.unwrap();
        assert!(matches!(failed, Err(BridgeError::Transport { .. })));
    }

    #[tokio::test]
    async fn dropping_a_caller_does_not_stall_the_queue() {
        let queue = TaskQueue::new();

        let (_, rx) = queue.enqueue(async { output(json!("ignored")) }).unwrap();
        drop(rx);

        let ok = queue.run(async { output(json!("next")) }).await.unwrap();
        assert_eq!(ok, ScriptOutput::Single(json!("next")));
    }

    #[tokio::test]
    async fn active_task_id_is_none_when_idle() {
        let queue = TaskQueue::new();
        assert_eq!(queue.active_task_id(), None);

        queue.run(async { output(json!(null)) }).await.unwrap();
        assert_eq!(queue.active_task_id(), None);
    }

    #[tokio::test]
    async fn close_waits_for_queued_tasks() {
        let queue = TaskQueue::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let ran_clone = Arc::clone(&ran);
        let (_, rx) = queue
            .enqueue(async move {
                ran_clone.fetch_add(1, Ordering::SeqCst);
                output(json!(null))
            })
            .unwrap();

        queue.close().await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        rx.await.unwrap().unwrap();
    }
}
