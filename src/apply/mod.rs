//! The apply engine: atomic, staged mutation of the block corpus.
//!
//! A [`validate::Proposal`] is located, validated, fingerprinted, gated
//! (dedup/backlog/cooldown/no-touch), snapshotted, mutated via
//! [`ops::execute_op`], post-checked, and either committed with a receipt +
//! diff artifact or rolled back to the pre-apply [`snapshot`].

pub mod ops;
pub mod pipeline;
pub mod snapshot;
pub mod validate;

pub use pipeline::{apply_proposal, rollback, ApplyOutcome, ApplyStatus};
pub use validate::{validate_proposal, Op, Proposal};
