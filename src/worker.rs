//! Bounded background execution for top-level download requests.
//!
//! A fixed set of OS threads pulls jobs off a bounded queue. Submitting into a full queue either
//! blocks ([`WorkerPool::submit`]) or fails fast ([`WorkerPool::try_submit`]), so a burst of
//! requests turns into backpressure instead of an unbounded pile of threads.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use uuid::Uuid;

use crate::media::{DownloadRequest, DownloadResult, ResultKind};
use crate::{Error, Result};

/// One queued request.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub request: DownloadRequest,
}

/// What a worker does with a job.
///
/// Closures `Fn(&Job) -> DownloadResult` implement this directly. Implement the trait by hand
/// when you also want to observe every outcome (e.g. to publish it), including the failed result
/// the pool synthesizes for a panicking job.
pub trait JobHandler: Send + Sync + 'static {
    fn handle(&self, job: &Job) -> DownloadResult;

    fn completed(&self, _job: &Job, _result: &DownloadResult) {}
}

impl<F> JobHandler for F
where
    F: Fn(&Job) -> DownloadResult + Send + Sync + 'static,
{
    fn handle(&self, job: &Job) -> DownloadResult {
        self(job)
    }
}

struct Envelope {
    job: Job,
    reply: Sender<DownloadResult>,
}

/// Handle to one submitted job.
#[derive(Debug)]
pub struct JobHandle {
    pub id: Uuid,
    rx: Receiver<DownloadResult>,
}

impl JobHandle {
    /// Block until the job finishes.
    pub fn wait(self) -> Result<DownloadResult> {
        self.rx
            .recv()
            .map_err(|_| Error::Internal(format!("job {} was dropped before finishing", self.id)))
    }

    /// The result, if the job has already finished.
    pub fn try_result(&self) -> Option<DownloadResult> {
        self.rx.try_recv().ok()
    }
}

pub struct WorkerPool {
    queue: Option<SyncSender<Envelope>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `workers` threads sharing a queue that holds at most `queue_depth` waiting jobs.
    ///
    /// Both values are clamped to at least 1.
    pub fn new(workers: usize, queue_depth: usize, handler: impl JobHandler) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel::<Envelope>(queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let handler: Arc<dyn JobHandler> = Arc::new(handler);

        let workers = (0..workers.max(1))
            .map(|idx| {
                let rx = Arc::clone(&rx);
                let handler = Arc::clone(&handler);
                thread::Builder::new()
                    .name(format!("mediagrab-worker-{idx}"))
                    .spawn(move || worker_loop(&rx, handler.as_ref()))
            })
            .collect::<std::io::Result<Vec<_>>>()?;

        tracing::info!(workers = workers.len(), queue_depth, "worker pool started");
        Ok(Self {
            queue: Some(tx),
            workers,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue `request`, blocking while the queue is full.
    pub fn submit(&self, request: DownloadRequest) -> Result<JobHandle> {
        let (envelope, handle) = envelope(request);
        self.sender()?
            .send(envelope)
            .map_err(|_| Error::Internal("worker pool has stopped".to_owned()))?;
        Ok(handle)
    }

    /// Queue `request`, failing with [`Error::QueueFull`] instead of waiting.
    pub fn try_submit(&self, request: DownloadRequest) -> Result<JobHandle> {
        let (envelope, handle) = envelope(request);
        match self.sender()?.try_send(envelope) {
            Ok(()) => Ok(handle),
            Err(TrySendError::Full(_)) => Err(Error::QueueFull),
            Err(TrySendError::Disconnected(_)) => {
                Err(Error::Internal("worker pool has stopped".to_owned()))
            }
        }
    }

    /// Stop accepting work, let the workers drain what is already queued, and join them.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn sender(&self) -> Result<&SyncSender<Envelope>> {
        self.queue
            .as_ref()
            .ok_or_else(|| Error::Internal("worker pool has stopped".to_owned()))
    }

    fn stop(&mut self) {
        // Dropping the only sender ends every worker's `recv` once the queue is empty.
        self.queue.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("worker thread panicked outside a job");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn envelope(request: DownloadRequest) -> (Envelope, JobHandle) {
    let id = Uuid::new_v4();
    let (reply, rx) = mpsc::channel();
    (
        Envelope {
            job: Job { id, request },
            reply,
        },
        JobHandle { id, rx },
    )
}

fn worker_loop(rx: &Mutex<Receiver<Envelope>>, handler: &dyn JobHandler) {
    loop {
        let next = match rx.lock() {
            Ok(guard) => guard.recv(),
            Err(poisoned) => poisoned.into_inner().recv(),
        };
        let Ok(Envelope { job, reply }) = next else {
            return;
        };

        let _span = tracing::info_span!("job", id = %job.id).entered();
        let result = match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&job))) {
            Ok(result) => result,
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                tracing::error!(panic = %msg, "job panicked");
                let kind = if job.request.target.is_audio_only() {
                    ResultKind::Audio
                } else {
                    ResultKind::Video
                };
                DownloadResult::failed(kind, &Error::Internal(format!("download panicked: {msg}")))
            }
        };

        if let Err(payload) =
            panic::catch_unwind(AssertUnwindSafe(|| handler.completed(&job, &result)))
        {
            let msg = panic_message(payload.as_ref());
            tracing::error!(panic = %msg, "completion hook panicked");
        }
        // The submitter may have dropped its handle; that's fine.
        let _ = reply.send(result);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
