//! Background tasks owned by the monitor.
//!
//! # Tasks
//!
//! - `dependency_checker` - Periodically polls a [`DependencyChecker`] and
//!   publishes its liveness to `dependency_up`

pub mod dependency_checker;

pub use dependency_checker::{
    DependencyCheckHandle, DependencyChecker, DependencyStatus, run_dependency_checker,
};
