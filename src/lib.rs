//! ztp-e2e - end-to-end test helpers for telco cluster lifecycle operators
//!
//! The library holds the pieces the test suites share: condition polling against
//! custom resource status, TALM (ClusterGroupUpgrade) helpers, power usage sampling
//! and statistics, image based upgrade stages, version gating and Argo CD git helpers.

pub mod commands;
pub mod config;
pub mod gitops;
pub mod ibu;
pub mod k8s;
pub mod power;
pub mod talm;
pub mod utils;
pub mod version;
pub mod wait;
