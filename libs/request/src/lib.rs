//! # seqclock-request
//!
//! Wire contract shared by every seqclock component.
//!
//! ## Flow
//!
//! - A pipeline-step invoker sends a [`Request`] (function name plus slack
//!   [`Metrics`]) to the coordinator before invoking the next step.
//! - The coordinator assigns the request ID and hands back a [`ResetRequest`],
//!   the token used to release that exact grant once the step has finished.
//! - The coordinator forwards both messages unchanged to the watcher node that
//!   owns the function's container.
//!
//! [`SlackTracker`] keeps the running slack figures for one pipeline run.

mod error;
mod slack;
mod types;

pub use error::RequestError;
pub use slack::SlackTracker;
pub use types::*;
