//! Shared primitives used by both the recall engine and the apply engine:
//! the error type, the block parser/emitter, the path-safety resolver, and
//! the intel-state store.

pub mod block;
pub mod error;
pub mod intel_state;
pub mod output;
pub mod safety;

pub use block::{Block, FieldValue, SignatureRecord};
pub use error::CairnError;
