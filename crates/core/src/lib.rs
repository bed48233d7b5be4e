//! # Charmline Core
//!
//! Domain types, traits, and error definitions for the Charmline persona chat
//! engine. This crate has **no framework dependencies**: it defines the
//! domain model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`Provider`]: an LLM completion backend
//! - [`ConversationStore`]: persisted conversation history
//! - [`PersonaCatalog`]: the read-only persona definitions
//!
//! Implementations live in their own crates, which keeps the engine testable
//! with scripted stand-ins and the dependency graph pointing inward.

pub mod error;
pub mod message;
pub mod persona;
pub mod provider;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ErrorKind, ProviderError, Result, StoreError};
pub use message::{ConversationId, ConversationRecord, Role, Turn};
pub use persona::{Persona, PersonaId};
pub use provider::{Backend, CompletionRequest, CompletionResponse, Provider, Usage};
pub use store::{ConversationStore, Exchange, PersonaCatalog};
