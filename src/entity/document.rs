//! Document entity - shared files
//!
//! Table: school_document

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "school_document")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(column_type = "String(Some(100))")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    /// Stored file path (/uploads/documents/...)
    #[sea_orm(column_type = "Text")]
    pub file_path: String,

    /// Uploader
    pub user_id: i32,

    /// Upload time (Unix timestamp)
    pub upload_date: i64,

    /// Original extension, e.g. ".pdf"
    #[sea_orm(column_type = "String(Some(16))")]
    pub file_type: String,

    /// Size in bytes
    pub file_size: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
