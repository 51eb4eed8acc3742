//! The conversation execution engine: Event Bus, Job Store, Tool Registry +
//! Executor, Agent Loop, Job Runner, and Notification Policy, fronted by an
//! axum HTTP/WS surface.

pub mod api;
pub mod runtime;
pub mod state;
