//! Event-to-reply pipeline: listener, task queue, and task worker.

pub mod listener;
pub mod queue;
pub mod worker;
