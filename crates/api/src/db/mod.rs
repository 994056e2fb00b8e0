//! Shared database schema and query builders.
//!
//! Every function returns `(sql, values)` ready for the server's
//! `sq_execute` / `sq_query_row` helpers.

pub mod audit;
pub mod gdpr;
pub mod grants;
pub mod invitations;
pub mod notifications;
pub mod profiles;
pub mod sso;
pub mod tables;
pub mod teams;
pub mod users;
pub mod webhooks;

// Re-export tables for convenience
pub use tables::*;

pub type Built = (String, sea_query::Values);
