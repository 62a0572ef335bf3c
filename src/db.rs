use sea_orm::sea_query::TableCreateStatement;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, Schema,
};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::entity::{
    blog, blog_comment, blog_rating, casbin_rule, document, document_comment, message, role,
    tutor_group, user,
};

/// Initialize database connection and auto-migrate tables
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    if config.is_sqlite() {
        info!("Connecting to sqlite database: {}", config.name);
    } else {
        info!("Connecting to database: {}:{}/{}", config.host, config.port, config.name);
    }

    let mut opt = ConnectOptions::new(config.connection_url());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;
    info!("Database connection established");

    auto_migrate(&db).await?;

    Ok(db)
}

/// Test database connection
pub async fn test_connection(config: &DatabaseConfig) -> Result<(), DbErr> {
    let mut opt = ConnectOptions::new(config.connection_url());
    opt.connect_timeout(Duration::from_secs(5));

    let db = Database::connect(opt).await?;
    db.ping().await?;

    Ok(())
}

/// Create every table that does not exist yet
pub async fn auto_migrate(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    info!("Running auto-migration for all entities...");

    // 1. Independent tables first
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(user::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(role::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(casbin_rule::Entity)).await?;

    // 2. Tables referencing users
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(tutor_group::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(blog::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(document::Entity)).await?;

    // 3. Tables referencing groups, blogs and documents
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(message::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(blog_comment::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(blog_rating::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(document_comment::Entity)).await?;

    // 4. Invariants the handlers rely on
    for sql in UNIQUE_INDEXES {
        db.execute_unprepared(sql).await?;
    }

    info!("Auto-migration completed successfully");
    Ok(())
}

/// At most one valid group per student, one rating per user and blog
const UNIQUE_INDEXES: [&str; 2] = [
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_school_group_active_student \
     ON school_group (student_id) WHERE is_valid",
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_school_blog_rating_user \
     ON school_blog_rating (blog_id, user_id)",
];

async fn create_table_if_not_exists(
    db: &DatabaseConnection,
    backend: DbBackend,
    mut stmt: TableCreateStatement,
) -> Result<(), DbErr> {
    stmt.if_not_exists();
    db.execute(backend.build(&stmt)).await?;
    Ok(())
}

/// Fresh in-memory database with every table created
#[cfg(test)]
pub async fn memory_database() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    auto_migrate(&db).await.unwrap();
    db
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{EntityTrait, PaginatorTrait};

    #[tokio::test]
    async fn test_auto_migrate_is_idempotent() {
        let db = memory_database().await;
        auto_migrate(&db).await.unwrap();
        assert_eq!(user::Entity::find().count(&db).await.unwrap(), 0);
        assert_eq!(tutor_group::Entity::find().count(&db).await.unwrap(), 0);
        assert_eq!(document_comment::Entity::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_schema_rejects_duplicates() {
        use sea_orm::{ActiveModelTrait, Set};

        let db = memory_database().await;
        let group = |is_valid: bool| tutor_group::ActiveModel {
            tutor_id: Set(1),
            student_id: Set(2),
            is_valid: Set(is_valid),
            created_at: Set(0),
            expired_at: Set(if is_valid { None } else { Some(0) }),
            ..Default::default()
        };
        group(true).insert(&db).await.unwrap();
        group(false).insert(&db).await.unwrap();
        group(false).insert(&db).await.unwrap();
        let err = group(true).insert(&db).await.unwrap_err();
        assert!(matches!(err.sql_err(), Some(sea_orm::SqlErr::UniqueConstraintViolation(_))));
        assert_eq!(tutor_group::Entity::find().count(&db).await.unwrap(), 3);

        let rating = || blog_rating::ActiveModel {
            blog_id: Set(1),
            user_id: Set(1),
            rating: Set(4),
            ..Default::default()
        };
        rating().insert(&db).await.unwrap();
        assert!(rating().insert(&db).await.is_err());
        assert_eq!(blog_rating::Entity::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_memory_connection() {
        let config = DatabaseConfig {
            db_type: "sqlite".to_string(),
            name: ":memory:".to_string(),
            ..Default::default()
        };
        test_connection(&config).await.unwrap();
    }
}
