//! SchoolHub - a tutoring and school management service
//!
//! Accounts and roles, tutor/student groups with chat, blogs and shared
//! documents with threaded comments, and transactional mail.

pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod mail;
pub mod middleware;
pub mod permission;
pub mod routes;
pub mod state;
pub mod uploads;
pub mod ws;

#[cfg(test)]
mod testutil;

// Re-export commonly used types
pub use config::Config;
pub use state::AppState;
