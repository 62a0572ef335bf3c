//! CasbinRule entity - RBAC policy storage
//!
//! Table: school_casbin_rule

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "school_casbin_rule")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Rule type: 'p' (policy) or 'g' (role membership)
    #[sea_orm(column_type = "String(Some(10))")]
    pub ptype: String,

    /// 'p': subject (role), 'g': user
    #[sea_orm(column_type = "String(Some(128))")]
    pub v0: String,

    /// 'p': object (capability), 'g': role
    #[sea_orm(column_type = "String(Some(128))")]
    pub v1: String,

    /// 'p': action, 'g': unused
    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub v2: Option<String>,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub v3: Option<String>,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub v4: Option<String>,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub v5: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Convert into the vector form Casbin expects
    pub fn to_policy_vec(&self) -> Vec<String> {
        let mut policy = vec![self.v0.clone(), self.v1.clone()];
        for value in [&self.v2, &self.v3, &self.v4, &self.v5].into_iter().flatten() {
            if !value.is_empty() {
                policy.push(value.clone());
            }
        }
        policy
    }
}

/// Build a policy row: `sub` may perform `act` on `obj`
pub fn new_policy(sub: &str, obj: &str, act: &str) -> ActiveModel {
    use sea_orm::Set;
    ActiveModel {
        ptype: Set("p".to_string()),
        v0: Set(sub.to_string()),
        v1: Set(obj.to_string()),
        v2: Set(Some(act.to_string())),
        ..Default::default()
    }
}

/// Build a membership row: `user` belongs to `role`
pub fn new_grouping(user: &str, role: &str) -> ActiveModel {
    use sea_orm::Set;
    ActiveModel {
        ptype: Set("g".to_string()),
        v0: Set(user.to_string()),
        v1: Set(role.to_string()),
        v2: Set(None),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_vec_skips_empty_columns() {
        let rule = Model {
            id: 1,
            ptype: "p".to_string(),
            v0: "role:Admin".to_string(),
            v1: "accounts".to_string(),
            v2: Some("access".to_string()),
            v3: Some(String::new()),
            v4: None,
            v5: None,
        };
        assert_eq!(rule.to_policy_vec(), vec!["role:Admin", "accounts", "access"]);
    }
}
