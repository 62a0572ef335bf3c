//! BlogComment entity - threaded replies on a blog
//!
//! Table: school_blog_comment

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "school_blog_comment")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub blog_id: i32,

    pub user_id: i32,

    /// None for top-level comments
    #[sea_orm(nullable)]
    pub parent_comment_id: Option<i32>,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
