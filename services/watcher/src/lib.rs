//! seqclock watcher library.
//!
//! The watcher runs on every cluster node. It owns the CPU quotas of the
//! function containers on that node and arbitrates between concurrent
//! demands for the same function.
//!
//! ## Modules
//!
//! - `controller`: PI controller and quota clipping
//! - `registry`: per-function demand bookkeeping and fair-share rebalancing
//! - `conflicts`: the locked resolver applying registry decisions
//! - `runtime`: container runtime capability (Docker, mock)
//! - `api`: HTTP front end

pub mod api;
pub mod config;
pub mod conflicts;
pub mod controller;
pub mod error;
pub mod registry;
pub mod runtime;
pub mod state;

pub use conflicts::ConflictResolver;
pub use error::{ResolverError, RuntimeError};
pub use registry::{FunctionState, QuotaWrite, Registry};
pub use runtime::{ContainerRuntime, DockerRuntime, MockRuntime};
