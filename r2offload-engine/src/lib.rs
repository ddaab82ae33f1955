//! Bulk transfer engine for R2 offload.
//!
//! [`TransferExecutor`] performs one offload, restore or local delete for one
//! subject. [`BulkCoordinator`] drives the durable queue through it one item
//! per [`process_one`](BulkCoordinator::process_one) call; the caller owns
//! the loop (see [`drive`]).

pub mod cancel;
pub mod config;
pub mod coordinator;
pub mod eligibility;
pub mod error;
pub mod library;
pub mod logging;
pub mod runner;
pub mod transfer;

pub use cancel::CancellationFlag;
pub use config::EngineConfig;
pub use coordinator::{BulkCoordinator, ProcessOutcome, Progress, RunState};
pub use eligibility::{Eligibility, MimeAllowList};
pub use error::{EngineError, EngineResult};
pub use library::{Derivative, MediaLibrary, Subject};
pub use runner::drive;
pub use transfer::{DerivativeSummary, TransferExecutor, TransferResult};
