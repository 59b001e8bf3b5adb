//! Core data model definitions shared across z0rath crates.
#![allow(missing_docs)]

pub mod error;
pub mod events;
pub mod identity;
pub mod routes;
pub mod ticket;
pub mod verdict;
pub mod wire;

// Intentionally curated re-exports for downstream consumers.
pub use error::{ModelError, Result as ModelResult};
pub use events::{InvalidationEvent, InvalidationKind, classify};
pub use identity::{Credential, Identity};
pub use ticket::Ticket;
pub use verdict::Verdict;
pub use wire::{HasPermissionResponse, IssueTicketRequest, IssueTicketResponse};
