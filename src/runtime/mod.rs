//! Dispatcher ownership and cross-thread scheduling.

mod dispatcher;
mod task_bridge;

pub use dispatcher::{Dispatcher, DispatcherHandle};
pub use task_bridge::{ScheduledTask, TaskBridge};
