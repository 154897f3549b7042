//! dbguard operator - reconciles DatabaseBackup resources into CronJobs

#![deny(missing_docs)]

pub mod commands;
pub mod config;
pub mod controller;
pub mod cronjob;
pub mod validate;

pub use config::OperatorConfig;
pub use controller::{error_policy, reconcile, ControllerContext};
