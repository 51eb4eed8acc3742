//! Core runtime: the Event Bus, Job Store, Tool Registry + Executor, Agent
//! Loop, Job Runner, and Notification Policy that together turn a question
//! into a running job and drive it to completion.

pub mod agent_loop;
pub mod bus;
pub mod job_runner;
pub mod jobs;
pub mod notifications;
pub mod tools;

pub use bus::EventBus;
pub use job_runner::JobRunner;
pub use jobs::JobStore;
pub use tools::{ToolExecutor, ToolRegistry};
