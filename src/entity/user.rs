//! User entity - accounts table
//!
//! Table: school_user

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "school_user")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Login name (the email address given at registration, unique)
    #[sea_orm(column_type = "String(Some(128))", unique)]
    pub username: String,

    /// Password (bcrypt hash)
    #[sea_orm(column_type = "String(Some(128))")]
    #[serde(skip_serializing)]
    pub password: String,

    /// Display name
    #[sea_orm(column_type = "String(Some(100))")]
    pub name: String,

    #[sea_orm(column_type = "String(Some(128))")]
    pub email: String,

    #[sea_orm(column_type = "String(Some(255))", nullable)]
    pub address: Option<String>,

    /// Student / staff code (unique)
    #[sea_orm(column_type = "String(Some(20))", unique)]
    pub code: String,

    #[sea_orm(column_type = "String(Some(10))")]
    pub gender: String,

    /// Avatar path or URL
    #[sea_orm(column_type = "Text", nullable)]
    pub image: Option<String>,

    /// Creation time (Unix timestamp)
    pub created_at: i64,

    /// Last login time (Unix timestamp, 0 = never)
    pub last_login: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Public view of a user, embedded in other responses
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i32,
    pub username: String,
    pub name: String,
    pub email: String,
    pub code: String,
    pub image: Option<String>,
}

impl From<Model> for UserSummary {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            name: model.name,
            email: model.email,
            code: model.code,
            image: model.image,
        }
    }
}

impl From<&Model> for UserSummary {
    fn from(model: &Model) -> Self {
        model.clone().into()
    }
}
