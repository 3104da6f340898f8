//! Priority task scheduling: a cooperative background task runner.
//!
//! A single dispatcher draining a priority queue, task handles that can
//! be awaited, graceful shutdown via a `watch::<bool>` flag.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use tokio::sync::Notify;

/// Four priority classes, ascending precedence
/// (`P1UserInteractive < P2SignatureCalc < P3BackgroundCacheLoad <
/// P4LiveUpdate`), `Ord` derived in declaration order so a `BinaryHeap`
/// (a max-heap) naturally pops the highest-precedence class first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskPriority {
    P1UserInteractive,
    P2SignatureCalc,
    P3BackgroundCacheLoad,
    P4LiveUpdate,
}

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct QueuedTask {
    priority: TaskPriority,
    seq: u64,
    task: BoxedTask,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Higher priority class first; within a class, FIFO (lower seq
        // first), so invert seq comparison for the max-heap.
        self.priority.cmp(&other.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Inner {
    heap: BinaryHeap<QueuedTask>,
    next_seq: u64,
}

/// Binary-heap backed priority queue with `Notify`-based wakeup: a single
/// dispatcher loop calls `recv` (or `try_recv` for a non-blocking poll)
/// and awaits whatever it pops.
pub struct PriorityTaskQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Default for PriorityTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityTaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                next_seq: 0,
            }),
            notify: Notify::new(),
        }
    }

    pub fn push(&self, priority: TaskPriority, task: impl Future<Output = ()> + Send + 'static) {
        let mut inner = self.inner.lock().unwrap();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(QueuedTask {
            priority,
            seq,
            task: Box::pin(task),
        });
        drop(inner);
        self.notify.notify_one();
    }

    pub fn try_pop(&self) -> Option<BoxedTask> {
        self.inner.lock().unwrap().heap.pop().map(|q| q.task)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks until a task is available or `shutdown` resolves true.
    pub async fn pop(&self, shutdown: &tokio::sync::watch::Receiver<bool>) -> Option<BoxedTask> {
        loop {
            if let Some(task) = self.try_pop() {
                return Some(task);
            }
            if *shutdown.borrow() {
                return None;
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(std::time::Duration::from_millis(500)) => {}
            }
            if *shutdown.borrow() && self.is_empty() {
                return None;
            }
        }
    }

    /// Drains and runs tasks in priority order until `shutdown` fires.
    pub async fn run(&self, shutdown: tokio::sync::watch::Receiver<bool>) {
        while let Some(task) = self.pop(&shutdown).await {
            task.await;
        }
    }
}
