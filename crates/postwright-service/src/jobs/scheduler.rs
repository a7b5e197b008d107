use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::shutdown::ShutdownState;

/// Request to fill in the images of one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageJob {
    pub post_id: i32,
    /// Text the image prompts are derived from, normally the summary.
    pub seed_text: String,
}

/// The job could not be handed off. Says nothing about the job itself.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulingError {
    #[error("image queue is full")]
    QueueFull,
    #[error("image queue is closed")]
    QueueClosed,
    #[error("service is shutting down")]
    ShuttingDown,
}

/// One-way hand-off of image jobs. Never waits for the job to run.
pub trait JobScheduler: Send + Sync {
    fn schedule(&self, job: ImageJob) -> Result<(), SchedulingError>;
}

/// Schedules onto a bounded in-process queue.
#[derive(Clone)]
pub struct QueueScheduler {
    tx: mpsc::Sender<ImageJob>,
    shutdown: ShutdownState,
}

/// Creates the queue: the scheduler side and the receiver for an
/// [`ImageWorker`](super::ImageWorker).
pub fn image_queue(
    capacity: usize,
    shutdown: ShutdownState,
) -> (QueueScheduler, mpsc::Receiver<ImageJob>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (QueueScheduler { tx, shutdown }, rx)
}

impl JobScheduler for QueueScheduler {
    fn schedule(&self, job: ImageJob) -> Result<(), SchedulingError> {
        if self.shutdown.is_shutting_down() {
            warn!(post_id = job.post_id, "Refusing image job during shutdown");
            return Err(SchedulingError::ShuttingDown);
        }

        let post_id = job.post_id;
        self.tx.try_send(job).map_err(|err| match err {
            TrySendError::Full(_) => SchedulingError::QueueFull,
            TrySendError::Closed(_) => SchedulingError::QueueClosed,
        })?;
        debug!(post_id, "Queued image job");
        Ok(())
    }
}
