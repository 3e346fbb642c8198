#![doc = include_str!("../README.md")]

pub mod analyzer;
pub mod classifier;
pub mod models;
pub mod operation;
pub mod poller;
pub mod templates;

pub use operation::{OperationError, OperationHandle, OperationResult, OperationStatus};
pub use poller::{poll, poll_with_cancellation, PollConfig, PollError, StatusSource};
