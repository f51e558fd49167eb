//! Cost-weighted fills seeded from traced paths
//!
//! - `config`: immutable run parameters (threshold, stop policy, connectivity)
//! - `engine`: the multi-source shortest-path expansion
//! - `result`: finalized nodes, run status and the cancellation token

pub mod config;
pub mod engine;
pub mod result;

pub use config::{Connectivity, FillConfig, StopPolicy};
pub use engine::FillEngine;
pub use result::{CancelToken, FillResult, FillStatus, Node};
