//! # capsule-unlock: Capsule conditions and the unlock engine
//!
//! - [`evaluate`]: pure unlock-condition evaluation
//! - [`UnlockOrchestrator`]: fetch, evaluate, submit, resolve, retrieve
//! - [`CapsuleCreator`]: encrypt, upload and record new capsules, singly or in batches
//! - [`files`]: input selection for batch creation
//! - [`ChainClient`]: the blockchain collaborator contract, with
//!   [`InMemoryLedger`] and [`LocalLedger`] for development
//!
//! All collaborators and tuning ([`EngineConfig`]) are passed in explicitly.

pub mod capsule;
pub mod chain;
pub mod clock;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod files;
pub mod ledger;
pub mod resolve;

mod batch;
mod create;
mod orchestrator;

pub use batch::{BatchOptions, CreateOutcome, CreateStatus};
pub use capsule::{Capsule, UnlockCondition};
pub use chain::{
    ChainClient, ChainObject, ChangeType, ConditionSpec, Fields, NewCapsule, ObjectChange, ObjectOwner,
    TransactionResult, TransactionSpec,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use create::{ApprovalReceipt, CapsuleCreator, CreateRequest, CreatedCapsule, KeyMode};
pub use error::{ChainError, ChainResult, UnlockError, UnlockResult};
pub use evaluate::{Progress, UnlockStatus, evaluate, format_remaining};
pub use files::{BatchFile, FileFilter, FileSelection, SkippedFile};
pub use ledger::{InMemoryLedger, LocalLedger};
pub use orchestrator::{
    CapsuleStatus, KeySource, UnlockFailure, UnlockOrchestrator, UnlockOutcome, UnlockRequest, UnlockStage,
    UnlockedCapsule,
};
pub use resolve::{ObjectResolution, find_created_object, resolve_created_object};
