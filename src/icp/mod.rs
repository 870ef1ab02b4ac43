//! Iterative Closest Point (ICP) registration of a source cloud against a fixed target.
mod params;
pub use params::{ErrorMetric, IcpParams};
pub mod cost_function;
mod icp;
pub use icp::{Icp, IcpResult, IcpState};
