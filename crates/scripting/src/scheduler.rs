//! Main thread marshalling
//!
//! The host's event subscriptions and command table belong to one designated
//! thread. Work that mutates them goes through [`MainThread::run_on_main`],
//! which runs inline on that thread and queues the job everywhere else. The
//! host drains the queue with [`MainThread::run_pending`] from its main loop.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tokio::sync::mpsc;

/// A unit of work bound for the main thread
pub type Job = Box<dyn FnOnce() + Send + 'static>;

struct Inner {
    thread: ThreadId,
    sender: mpsc::UnboundedSender<Job>,
    receiver: Mutex<mpsc::UnboundedReceiver<Job>>,
    queued: AtomicUsize,
    enqueued_total: AtomicUsize,
}

/// Handle to the host's main thread
#[derive(Clone)]
pub struct MainThread {
    inner: Arc<Inner>,
}

impl MainThread {
    /// Create a handle owned by the calling thread
    pub fn new() -> Self {
        Self::for_thread(thread::current().id())
    }

    pub fn for_thread(thread: ThreadId) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                thread,
                sender,
                receiver: Mutex::new(receiver),
                queued: AtomicUsize::new(0),
                enqueued_total: AtomicUsize::new(0),
            }),
        }
    }

    pub fn is_main_thread(&self) -> bool {
        thread::current().id() == self.inner.thread
    }

    /// Run `job` now when called on the main thread, otherwise queue it
    ///
    /// The caller never waits for queued work.
    pub fn run_on_main<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_main_thread() {
            job();
            return;
        }

        self.inner.queued.fetch_add(1, Ordering::SeqCst);
        self.inner.enqueued_total.fetch_add(1, Ordering::SeqCst);
        if self.inner.sender.send(Box::new(job)).is_err() {
            self.inner.queued.fetch_sub(1, Ordering::SeqCst);
            tracing::error!("Main thread queue is closed, dropping job");
        }
    }

    /// Jobs waiting to run
    pub fn pending(&self) -> usize {
        self.inner.queued.load(Ordering::SeqCst)
    }

    /// Jobs ever queued (inline runs are not counted)
    pub fn enqueued_total(&self) -> usize {
        self.inner.enqueued_total.load(Ordering::SeqCst)
    }

    /// Drain the queue; must be called on the main thread
    ///
    /// Returns the number of jobs run.
    pub fn run_pending(&self) -> usize {
        if !self.is_main_thread() {
            tracing::warn!("run_pending called off the main thread, ignoring");
            return 0;
        }

        let mut ran = 0;
        loop {
            // Jobs may queue more work; the lock is released before each job runs.
            let job = self.inner.receiver.lock().try_recv();
            match job {
                Ok(job) => {
                    self.inner.queued.fetch_sub(1, Ordering::SeqCst);
                    job();
                    ran += 1;
                }
                Err(_) => break,
            }
        }

        if ran > 0 {
            tracing::debug!("Ran {} queued main thread job(s)", ran);
        }
        ran
    }
}

impl Default for MainThread {
    fn default() -> Self {
        Self::new()
    }
}
