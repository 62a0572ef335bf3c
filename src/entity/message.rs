//! Message entity - chat posts inside a group
//!
//! Table: school_message

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "school_message")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub group_id: i32,

    pub sender_id: i32,

    #[sea_orm(column_type = "Text")]
    pub text_content: String,

    #[sea_orm(default_value = 0)]
    pub file_count: i32,

    /// Send time (Unix timestamp)
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
