//! Interface to the justIN distributed-workflow service
//!
//! justIN owns workflow execution: scheduling, file cataloguing, retries, and
//! failure recovery all happen inside the service and the grid infrastructure
//! around it. This module is the boundary through which mcflow reaches it —
//! a trait describing the create/submit/query operations, and an
//! implementation that shells out to the `justin` command-line tool.

pub mod justin_cli;
pub mod justin_interface;

pub use justin_cli::{JustinCli, JustinOptions};
pub use justin_interface::JustinInterface;
