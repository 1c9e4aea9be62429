//! Episode/entity association persistence

use fancat_common::Association;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::parse_uuid;
use crate::error::CurationResult;

/// Insert an association; an existing (episode, entity) pair is left untouched.
///
/// Returns true when a row was inserted.
pub async fn insert_association(
    conn: &mut SqliteConnection,
    association: &Association,
) -> CurationResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO associations (episode_id, entity_id, scene_note, confidence_label)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(association.episode_id.to_string())
    .bind(association.entity_id.to_string())
    .bind(&association.scene_note)
    .bind(&association.confidence_label)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Associations of one entity, ordered by episode id
pub async fn list_for_entity(
    conn: &mut SqliteConnection,
    entity_id: Uuid,
) -> CurationResult<Vec<Association>> {
    let rows = sqlx::query(
        r#"
        SELECT episode_id, entity_id, scene_note, confidence_label
        FROM associations
        WHERE entity_id = ?
        ORDER BY episode_id
        "#,
    )
    .bind(entity_id.to_string())
    .fetch_all(conn)
    .await?;

    rows.iter().map(association_from_row).collect()
}

/// Associations whose episode belongs to `owner_id`
pub async fn list_for_owner(
    conn: &mut SqliteConnection,
    owner_id: Uuid,
) -> CurationResult<Vec<Association>> {
    let rows = sqlx::query(
        r#"
        SELECT a.episode_id, a.entity_id, a.scene_note, a.confidence_label
        FROM associations a
        JOIN episodes e ON e.id = a.episode_id
        WHERE e.owner_id = ?
        ORDER BY e.published_at, a.episode_id, a.entity_id
        "#,
    )
    .bind(owner_id.to_string())
    .fetch_all(conn)
    .await?;

    rows.iter().map(association_from_row).collect()
}

/// Move every association of `from` onto `to`.
///
/// Pairs `to` already has are kept as they are; `from` ends with no
/// associations. Returns the number of associations newly created on `to`.
pub async fn repoint(conn: &mut SqliteConnection, from: Uuid, to: Uuid) -> CurationResult<u64> {
    let moved = sqlx::query(
        r#"
        INSERT OR IGNORE INTO associations (
            episode_id, entity_id, scene_note, confidence_label, created_at
        )
        SELECT episode_id, ?, scene_note, confidence_label, created_at
        FROM associations
        WHERE entity_id = ?
        "#,
    )
    .bind(to.to_string())
    .bind(from.to_string())
    .execute(&mut *conn)
    .await?
    .rows_affected();

    sqlx::query("DELETE FROM associations WHERE entity_id = ?")
        .bind(from.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(moved)
}

fn association_from_row(row: &SqliteRow) -> CurationResult<Association> {
    let episode_id: String = row.get("episode_id");
    let entity_id: String = row.get("entity_id");

    Ok(Association {
        episode_id: parse_uuid("associations.episode_id", &episode_id)?,
        entity_id: parse_uuid("associations.entity_id", &entity_id)?,
        scene_note: row.get("scene_note"),
        confidence_label: row.get("confidence_label"),
    })
}
