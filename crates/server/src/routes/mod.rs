pub mod admin;
pub mod auth;
pub mod gdpr;
pub mod health;
pub mod notifications;
pub mod permissions;
pub mod profile;
pub mod sso;
pub mod teams;
pub mod webhooks;
