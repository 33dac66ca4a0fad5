//! Persistence layer: the `ModStore` trait and its libSQL backend.

pub mod libsql_backend;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use traits::{
    AuditEntry, CommunityPolicy, ConversationTurn, ModStore, PolicyPatch, SYSTEM_ACTOR,
};
