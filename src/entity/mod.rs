//! Entity module - SeaORM entity definitions
//!
//! One module per table. Relations are resolved with explicit queries in the
//! handlers, so the `Relation` enums stay empty.

pub mod blog;
pub mod blog_comment;
pub mod blog_rating;
pub mod casbin_rule;
pub mod document;
pub mod document_comment;
pub mod message;
pub mod role;
pub mod tutor_group;
pub mod user;
