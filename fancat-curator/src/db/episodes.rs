//! Episode persistence
//!
//! Episodes are written by ingestion; the curation engine only reads them,
//! apart from enrichment filling an empty description.

use fancat_common::time;
use fancat_common::Episode;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{parse_ts, parse_uuid};
use crate::error::CurationResult;

/// Insert a new episode
pub async fn insert_episode(conn: &mut SqliteConnection, episode: &Episode) -> CurationResult<()> {
    sqlx::query(
        r#"
        INSERT INTO episodes (id, owner_id, title, description, published_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(episode.id.to_string())
    .bind(episode.owner_id.to_string())
    .bind(&episode.title)
    .bind(&episode.description)
    .bind(time::to_db(&episode.published_at))
    .execute(conn)
    .await?;

    Ok(())
}

/// Load episode by id
pub async fn load_episode(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> CurationResult<Option<Episode>> {
    let row = sqlx::query(
        "SELECT id, owner_id, title, description, published_at FROM episodes WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(conn)
    .await?;

    row.map(|r| episode_from_row(&r)).transpose()
}

/// Episodes of one owner, oldest first
pub async fn list_episodes_for_owner(
    conn: &mut SqliteConnection,
    owner_id: Uuid,
) -> CurationResult<Vec<Episode>> {
    let rows = sqlx::query(
        r#"
        SELECT id, owner_id, title, description, published_at
        FROM episodes
        WHERE owner_id = ?
        ORDER BY published_at, id
        "#,
    )
    .bind(owner_id.to_string())
    .fetch_all(conn)
    .await?;

    rows.iter().map(episode_from_row).collect()
}

/// Fill in a description; never overwrites an existing one
pub async fn fill_episode_description(
    conn: &mut SqliteConnection,
    id: Uuid,
    description: &str,
) -> CurationResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE episodes SET description = ?
        WHERE id = ? AND (description IS NULL OR description = '')
        "#,
    )
    .bind(description)
    .bind(id.to_string())
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn episode_from_row(row: &SqliteRow) -> CurationResult<Episode> {
    let id: String = row.get("id");
    let owner_id: String = row.get("owner_id");
    let published_at: String = row.get("published_at");

    Ok(Episode {
        id: parse_uuid("episodes.id", &id)?,
        owner_id: parse_uuid("episodes.owner_id", &owner_id)?,
        title: row.get("title"),
        description: row.get("description"),
        published_at: parse_ts(&published_at)?,
    })
}
