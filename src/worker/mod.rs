//! Workers: descriptors, the task interface, and the per-worker runtime.

mod descriptor;
mod runtime;
mod task;

pub use descriptor::{Worker, WorkerState};
pub use runtime::{JoinOutcome, RuntimeHandle};
pub use task::{CycleReport, TaskFn, TaskRef, WorkerTask};
