//! Database initialization
//!
//! Creates the catalog database on first run and brings the schema up
//! idempotently on every start. Every statement is `IF NOT EXISTS`, so this is
//! safe to call on an existing database.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::Result;

/// Open (creating if needed) the catalog database and initialize its schema
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    init_schema(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database with the full schema.
///
/// The connection is never recycled, so the database lives as long as the pool.
pub async fn open_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}

/// Create all catalog tables, indexes, and triggers
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_content_owners_table(pool).await?;
    create_episodes_table(pool).await?;
    create_entities_table(pool).await?;
    create_entity_link_audit_table(pool).await?;
    create_associations_table(pool).await?;

    info!(
        "Database tables initialized \
         (content_owners, episodes, entities, entity_link_audit, associations)"
    );
    Ok(())
}

async fn create_content_owners_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content_owners (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            external_id TEXT,
            image_url TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_episodes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS episodes (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL REFERENCES content_owners(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            description TEXT,
            published_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_episodes_owner ON episodes(owner_id, published_at)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_entities_table(pool: &SqlitePool) -> Result<()> {
    // An active link must have a URL; the lifecycle manager enforces the rest
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            id TEXT PRIMARY KEY,
            owner_id TEXT REFERENCES content_owners(id) ON DELETE SET NULL,
            kind TEXT NOT NULL DEFAULT 'location',
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            description TEXT,
            address TEXT,
            phone TEXT,
            category_tags TEXT NOT NULL DEFAULT '[]',
            external_link TEXT,
            link_state TEXT NOT NULL DEFAULT 'unlinked'
                CHECK (link_state IN ('unlinked', 'candidate', 'active', 'inactive', 'corrected')),
            distinct_branch INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK (link_state != 'active' OR external_link IS NOT NULL)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entities_owner ON entities(owner_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_entity_link_audit_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entity_link_audit (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            timestamp TEXT NOT NULL,
            source TEXT NOT NULL,
            previous_url TEXT,
            new_url TEXT,
            from_state TEXT NOT NULL,
            to_state TEXT NOT NULL,
            reason TEXT,
            note TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_link_audit_entity ON entity_link_audit(entity_id, seq)",
    )
    .execute(pool)
    .await?;

    // Audit rows are append-only
    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS entity_link_audit_no_update
        BEFORE UPDATE ON entity_link_audit
        BEGIN
            SELECT RAISE(ABORT, 'entity_link_audit is append-only');
        END
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_associations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS associations (
            episode_id TEXT NOT NULL REFERENCES episodes(id) ON DELETE CASCADE,
            entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            scene_note TEXT,
            confidence_label TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (episode_id, entity_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_associations_entity ON associations(entity_id)")
        .execute(pool)
        .await?;

    Ok(())
}
