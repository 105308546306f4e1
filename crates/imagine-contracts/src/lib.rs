//! Data model shared by the imagine crates: the model capability table,
//! requests and results, the error taxonomy, session state and the journal.

pub mod chat;
pub mod credentials;
pub mod error;
pub mod events;
pub mod models;
pub mod receipts;
pub mod request;
pub mod response;
pub mod result;
pub mod session;

pub use error::{GenerationError, Result};
