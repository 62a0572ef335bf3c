//! TutorGroup entity - tutor/student pairing
//!
//! Table: school_group

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "school_group")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub tutor_id: i32,

    pub student_id: i32,

    /// False once the pairing has been closed
    #[sea_orm(default_value = true)]
    pub is_valid: bool,

    /// Creation time (Unix timestamp)
    pub created_at: i64,

    /// Time the pairing was closed (Unix timestamp)
    #[sea_orm(nullable)]
    pub expired_at: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn has_member(&self, user_id: i32) -> bool {
        self.tutor_id == user_id || self.student_id == user_id
    }

    /// The participant on the other side of the pairing
    pub fn other_member(&self, user_id: i32) -> i32 {
        if self.tutor_id == user_id {
            self.student_id
        } else {
            self.tutor_id
        }
    }
}
