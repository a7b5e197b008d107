//! Background image generation: the job payload, its scheduler, the
//! runner that performs it and the worker that drains the queue.

mod runner;
mod scheduler;
mod worker;

pub use runner::{ImageJobRunner, JobOutcome};
pub use scheduler::{ImageJob, JobScheduler, QueueScheduler, SchedulingError, image_queue};
pub use worker::ImageWorker;
