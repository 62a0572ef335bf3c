//! DocumentComment entity - threaded replies on a document
//!
//! Table: school_document_comment

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "school_document_comment")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub document_id: i32,

    pub user_id: i32,

    #[sea_orm(nullable)]
    pub parent_comment_id: Option<i32>,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
