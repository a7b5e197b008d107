use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info};

use super::{ImageJob, ImageJobRunner, JobOutcome};
use crate::shutdown::ShutdownState;

/// Drains the image queue, running each job on its own task.
pub struct ImageWorker {
    rx: mpsc::Receiver<ImageJob>,
    runner: ImageJobRunner,
    shutdown: ShutdownState,
}

impl ImageWorker {
    pub fn new(
        rx: mpsc::Receiver<ImageJob>,
        runner: ImageJobRunner,
        shutdown: ShutdownState,
    ) -> Self {
        Self {
            rx,
            runner,
            shutdown,
        }
    }

    /// Runs until the queue is closed. Once shutdown starts the queue stops
    /// accepting jobs, already queued jobs are still run, and this returns
    /// after every started job has finished.
    pub async fn run(mut self) {
        let mut tasks = JoinSet::new();
        let mut closing = false;
        info!("Image worker started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled(), if !closing => {
                    info!("Image worker closing queue");
                    self.rx.close();
                    closing = true;
                }
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
                job = self.rx.recv() => {
                    let Some(job) = job else { break };
                    let runner = self.runner.clone();
                    let guard = self.shutdown.track();
                    tasks.spawn(async move {
                        let _guard = guard;
                        log_outcome(&job, runner.run(&job).await);
                    });
                }
            }
        }

        while tasks.join_next().await.is_some() {}
        info!("Image worker stopped");
    }
}

fn log_outcome(job: &ImageJob, outcome: Result<JobOutcome, crate::errors::ApiError>) {
    match outcome {
        Ok(outcome) => info!(post_id = job.post_id, ?outcome, "Image job finished"),
        Err(err) => error!(post_id = job.post_id, error = %err, "Image job failed"),
    }
}
