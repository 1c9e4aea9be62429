//! Content owner persistence

use fancat_common::time;
use fancat_common::ContentOwner;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{parse_ts, parse_uuid};
use crate::error::CurationResult;

const OWNER_COLUMNS: &str = "id, display_name, slug, external_id, image_url, created_at";

/// Insert a new owner
pub async fn insert_owner(conn: &mut SqliteConnection, owner: &ContentOwner) -> CurationResult<()> {
    sqlx::query(
        r#"
        INSERT INTO content_owners (id, display_name, slug, external_id, image_url, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(owner.id.to_string())
    .bind(&owner.display_name)
    .bind(&owner.slug)
    .bind(&owner.external_id)
    .bind(&owner.image_url)
    .bind(time::to_db(&owner.created_at))
    .execute(conn)
    .await?;

    Ok(())
}

/// Load owner by id
pub async fn load_owner(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> CurationResult<Option<ContentOwner>> {
    let row = sqlx::query(&format!("SELECT {} FROM content_owners WHERE id = ?", OWNER_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?;

    row.map(|r| owner_from_row(&r)).transpose()
}

/// Load owner by slug
pub async fn load_owner_by_slug(
    conn: &mut SqliteConnection,
    slug: &str,
) -> CurationResult<Option<ContentOwner>> {
    let row = sqlx::query(&format!("SELECT {} FROM content_owners WHERE slug = ?", OWNER_COLUMNS))
        .bind(slug)
        .fetch_optional(conn)
        .await?;

    row.map(|r| owner_from_row(&r)).transpose()
}

/// All owners ordered by slug
pub async fn list_owners(conn: &mut SqliteConnection) -> CurationResult<Vec<ContentOwner>> {
    let rows = sqlx::query(&format!("SELECT {} FROM content_owners ORDER BY slug", OWNER_COLUMNS))
        .fetch_all(conn)
        .await?;

    rows.iter().map(owner_from_row).collect()
}

/// Store metadata found by enrichment
pub async fn update_owner_metadata(
    conn: &mut SqliteConnection,
    id: Uuid,
    external_id: Option<&str>,
    image_url: Option<&str>,
) -> CurationResult<()> {
    sqlx::query("UPDATE content_owners SET external_id = ?, image_url = ? WHERE id = ?")
        .bind(external_id)
        .bind(image_url)
        .bind(id.to_string())
        .execute(conn)
        .await?;

    Ok(())
}

fn owner_from_row(row: &SqliteRow) -> CurationResult<ContentOwner> {
    let id: String = row.get("id");
    let created_at: String = row.get("created_at");

    Ok(ContentOwner {
        id: parse_uuid("content_owners.id", &id)?,
        display_name: row.get("display_name"),
        slug: row.get("slug"),
        external_id: row.get("external_id"),
        image_url: row.get("image_url"),
        created_at: parse_ts(&created_at)?,
    })
}
