//! seqclock supreme library.
//!
//! The coordinator sits between pipeline-step invokers and the per-node
//! watchers. It hands out request IDs, learns which node hosts each
//! function, and forwards requests and resets to that node.
//!
//! ## Modules
//!
//! - `coordinator`: ID issue, node discovery, and release
//! - `client`: RPC client towards watcher nodes
//! - `invoker`: client used by pipeline-step invokers
//! - `api`: HTTP front end

pub mod api;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod invoker;
pub mod state;

pub use client::{WatcherClient, WatcherNode};
pub use coordinator::{Binding, CatalogSnapshot, Coordinator, DispatchPolicy};
pub use error::{ClientError, CoordinatorError};
pub use invoker::{PipelineRun, SupremeClient};
