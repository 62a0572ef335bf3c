//! Permission module using Casbin
//!
//! Users belong to roles (`g` rules), roles hold capabilities (`p` rules).
//! Role rows in `school_role` are the catalogue shown to administrators.

use casbin::{CoreApi, DefaultModel, Enforcer, MgmtApi};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::entity::{casbin_rule, role as role_entity};

/// Capability constants
pub mod perm {
    /// Register and edit user accounts
    pub const ACCOUNTS: &str = "accounts";
    /// Manage the role catalogue
    pub const ROLES: &str = "roles";
    /// Pair tutors with students
    pub const GROUPS: &str = "groups";
    /// Edit other users' blogs and comments
    pub const MODERATE: &str = "moderate";
    /// Delete other users' blogs
    pub const PURGE: &str = "purge";
    /// Post in group conversations
    pub const CHAT: &str = "chat";
    /// Send ad-hoc email
    pub const MAIL: &str = "mail";

    /// All capabilities
    pub const ALL: [&str; 7] = [ACCOUNTS, ROLES, GROUPS, MODERATE, PURGE, CHAT, MAIL];
}

/// Built-in role names
pub mod role {
    pub const ADMIN: &str = "Admin";
    pub const STAFF: &str = "Staff";
    pub const TUTOR: &str = "Tutor";
    pub const STUDENT: &str = "Student";

    pub const BUILTIN: [&str; 4] = [ADMIN, STAFF, TUTOR, STUDENT];

    /// Capabilities granted to a built-in role
    pub fn default_capabilities(name: &str) -> &'static [&'static str] {
        use super::perm::*;
        match name {
            ADMIN => &[ACCOUNTS, ROLES, MODERATE, PURGE, MAIL],
            STAFF => &[GROUPS, MODERATE],
            TUTOR | STUDENT => &[CHAT],
            _ => &[],
        }
    }
}

/// Action constants
pub mod action {
    pub const ACCESS: &str = "access";
}

const MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[role_definition]
g = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
"#;

/// Permission enforcer wrapper
#[derive(Clone)]
pub struct PermissionEnforcer {
    enforcer: Arc<RwLock<Enforcer>>,
    db: DatabaseConnection,
}

impl PermissionEnforcer {
    /// Create a new permission enforcer backed by the policy table
    pub async fn new(db: DatabaseConnection) -> anyhow::Result<Self> {
        let model = DefaultModel::from_str(MODEL).await?;
        let enforcer = Enforcer::new(model, ()).await?;

        let perm_enforcer = Self {
            enforcer: Arc::new(RwLock::new(enforcer)),
            db,
        };

        perm_enforcer.load_policies().await?;

        Ok(perm_enforcer)
    }

    /// Load all policies from database
    ///
    /// Memberships missing from the table are unlinked first; clearing the
    /// policy alone leaves them in the role manager.
    pub async fn load_policies(&self) -> anyhow::Result<()> {
        let rules = casbin_rule::Entity::find().all(&self.db).await?;
        let stored: Vec<Vec<String>> = rules
            .iter()
            .filter(|r| r.ptype == "g")
            .map(|r| r.to_policy_vec())
            .collect();

        let mut enforcer = self.enforcer.write().await;
        let stale: Vec<Vec<String>> = enforcer
            .get_grouping_policy()
            .into_iter()
            .filter(|g| !stored.contains(g))
            .collect();
        for grouping in stale {
            enforcer.remove_grouping_policy(grouping).await?;
        }

        enforcer.clear_policy().await?;

        for rule in rules {
            let policy = rule.to_policy_vec();
            if rule.ptype == "p" {
                let _ = enforcer.add_policy(policy).await;
            } else if rule.ptype == "g" {
                let _ = enforcer.add_grouping_policy(policy).await;
            }
        }

        Ok(())
    }

    /// Check if user has access to a capability
    pub async fn can_access(&self, user: &str, capability: &str) -> bool {
        let enforcer = self.enforcer.read().await;
        enforcer
            .enforce((user, capability, action::ACCESS))
            .unwrap_or(false)
    }

    /// Get all capabilities for a user
    pub async fn get_user_permissions(&self, user: &str) -> Vec<String> {
        let enforcer = self.enforcer.read().await;
        perm::ALL
            .iter()
            .filter(|cap| enforcer.enforce((user, **cap, action::ACCESS)).unwrap_or(false))
            .map(|cap| cap.to_string())
            .collect()
    }

    // ==================== Role Management ====================

    /// Role name prefix to distinguish from usernames
    pub const ROLE_PREFIX: &'static str = "role:";

    fn role_name(role: &str) -> String {
        format!("{}{}", Self::ROLE_PREFIX, role)
    }

    fn extract_role_name(prefixed: &str) -> Option<&str> {
        prefixed.strip_prefix(Self::ROLE_PREFIX)
    }

    /// Role catalogue, ordered by name
    pub async fn list_roles(&self) -> anyhow::Result<Vec<role_entity::Model>> {
        Ok(role_entity::Entity::find()
            .order_by_asc(role_entity::Column::Name)
            .all(&self.db)
            .await?)
    }

    pub async fn role_exists(&self, role: &str) -> anyhow::Result<bool> {
        let found = role_entity::Entity::find()
            .filter(role_entity::Column::Name.eq(role))
            .one(&self.db)
            .await?;
        Ok(found.is_some())
    }

    /// Add a role to the catalogue; returns false when it already exists
    pub async fn create_role(&self, role: &str) -> anyhow::Result<bool> {
        if self.role_exists(role).await? {
            return Ok(false);
        }
        role_entity::ActiveModel {
            name: Set(role.to_string()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(true)
    }

    /// Drop a role from the catalogue along with its policies
    pub async fn delete_role(&self, role: &str) -> anyhow::Result<()> {
        role_entity::Entity::delete_many()
            .filter(role_entity::Column::Name.eq(role))
            .exec(&self.db)
            .await?;
        self.remove_role_policies(role).await
    }

    /// Grant capabilities to a role, skipping ones it already has
    pub async fn grant_role(&self, role: &str, capabilities: &[&str]) -> anyhow::Result<()> {
        let role_name = Self::role_name(role);
        let existing: Vec<String> = casbin_rule::Entity::find()
            .filter(casbin_rule::Column::Ptype.eq("p"))
            .filter(casbin_rule::Column::V0.eq(&role_name))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|r| r.v1)
            .collect();

        for cap in capabilities {
            if existing.iter().any(|e| e == cap) {
                continue;
            }
            casbin_rule::new_policy(&role_name, cap, action::ACCESS)
                .insert(&self.db)
                .await?;
        }

        self.load_policies().await
    }

    /// Capabilities granted to a role
    pub async fn role_capabilities(&self, role: &str) -> anyhow::Result<Vec<String>> {
        let rules = casbin_rule::Entity::find()
            .filter(casbin_rule::Column::Ptype.eq("p"))
            .filter(casbin_rule::Column::V0.eq(Self::role_name(role)))
            .order_by_asc(casbin_rule::Column::Id)
            .all(&self.db)
            .await?;
        Ok(rules.into_iter().map(|r| r.v1).collect())
    }

    /// Remove every policy and membership that mentions the role
    pub async fn remove_role_policies(&self, role: &str) -> anyhow::Result<()> {
        let role_name = Self::role_name(role);

        casbin_rule::Entity::delete_many()
            .filter(casbin_rule::Column::Ptype.eq("p"))
            .filter(casbin_rule::Column::V0.eq(&role_name))
            .exec(&self.db)
            .await?;

        casbin_rule::Entity::delete_many()
            .filter(casbin_rule::Column::Ptype.eq("g"))
            .filter(casbin_rule::Column::V1.eq(&role_name))
            .exec(&self.db)
            .await?;

        self.load_policies().await
    }

    /// Roles of a user, in assignment order
    pub async fn get_user_roles(&self, user: &str) -> anyhow::Result<Vec<String>> {
        let rules = casbin_rule::Entity::find()
            .filter(casbin_rule::Column::Ptype.eq("g"))
            .filter(casbin_rule::Column::V0.eq(user))
            .order_by_asc(casbin_rule::Column::Id)
            .all(&self.db)
            .await?;

        Ok(rules
            .iter()
            .filter_map(|r| Self::extract_role_name(&r.v1))
            .map(str::to_string)
            .collect())
    }

    pub async fn has_role(&self, user: &str, role: &str) -> anyhow::Result<bool> {
        let found = casbin_rule::Entity::find()
            .filter(casbin_rule::Column::Ptype.eq("g"))
            .filter(casbin_rule::Column::V0.eq(user))
            .filter(casbin_rule::Column::V1.eq(Self::role_name(role)))
            .one(&self.db)
            .await?;
        Ok(found.is_some())
    }

    /// Assign user to a role
    pub async fn add_user_role(&self, user: &str, role: &str) -> anyhow::Result<()> {
        if self.has_role(user, role).await? {
            return Ok(());
        }

        let role_name = Self::role_name(role);
        casbin_rule::new_grouping(user, &role_name)
            .insert(&self.db)
            .await?;

        let mut enforcer = self.enforcer.write().await;
        enforcer
            .add_grouping_policy(vec![user.to_string(), role_name])
            .await?;

        Ok(())
    }

    /// Rewrite the `g` rows of `old` so they belong to `new`, optionally
    /// replacing the role set. Only touches the table; call
    /// [`load_policies`](Self::load_policies) once the write is committed.
    pub async fn rewrite_memberships<C: ConnectionTrait>(
        db: &C,
        old: &str,
        new: &str,
        roles: Option<&[String]>,
    ) -> Result<(), DbErr> {
        let Some(roles) = roles else {
            if old != new {
                casbin_rule::Entity::update_many()
                    .col_expr(casbin_rule::Column::V0, sea_orm::sea_query::Expr::value(new))
                    .filter(casbin_rule::Column::Ptype.eq("g"))
                    .filter(casbin_rule::Column::V0.eq(old))
                    .exec(db)
                    .await?;
            }
            return Ok(());
        };

        casbin_rule::Entity::delete_many()
            .filter(casbin_rule::Column::Ptype.eq("g"))
            .filter(casbin_rule::Column::V0.is_in([old, new]))
            .exec(db)
            .await?;
        for role in roles {
            casbin_rule::new_grouping(new, &Self::role_name(role))
                .insert(db)
                .await?;
        }
        Ok(())
    }

    /// Replace the user's role set
    pub async fn set_user_roles(&self, user: &str, roles: &[String]) -> anyhow::Result<()> {
        Self::rewrite_memberships(&self.db, user, user, Some(roles)).await?;
        self.load_policies().await
    }

    /// Move memberships to a new username
    pub async fn rename_user(&self, old: &str, new: &str) -> anyhow::Result<()> {
        if old == new {
            return Ok(());
        }
        Self::rewrite_memberships(&self.db, old, new, None).await?;
        self.load_policies().await
    }

    /// Usernames assigned to a role
    pub async fn role_users(&self, role: &str) -> anyhow::Result<Vec<String>> {
        let rules = casbin_rule::Entity::find()
            .filter(casbin_rule::Column::Ptype.eq("g"))
            .filter(casbin_rule::Column::V1.eq(Self::role_name(role)))
            .all(&self.db)
            .await?;

        Ok(rules.into_iter().map(|r| r.v0).collect())
    }

    /// Create the built-in roles and their capabilities if missing
    pub async fn ensure_default_roles(&self) -> anyhow::Result<()> {
        for name in role::BUILTIN {
            if self.create_role(name).await? {
                tracing::info!("Created default role: {}", name);
            }
            self.grant_role(name, role::default_capabilities(name)).await?;
        }
        Ok(())
    }
}
