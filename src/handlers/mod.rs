//! Request handlers module

pub mod auth;
pub mod blog;
pub mod comment;
pub mod dashboard;
pub mod document;
pub mod group;
pub mod mail;
pub mod message;
pub mod role;
pub mod user;

/// Current time as a Unix timestamp
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
