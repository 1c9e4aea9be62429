//! Entity persistence
//!
//! Entity rows plus their audit trail. Link state and audit are always written
//! together by the lifecycle manager; this module only provides the pieces.

use fancat_common::slug::{base_slug, unique_slug};
use fancat_common::time;
use fancat_common::{Entity, EntityKind, LinkState};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::collections::HashSet;
use uuid::Uuid;

use super::{link_audit, parse_ts, parse_uuid};
use crate::error::CurationResult;

const ENTITY_COLUMNS: &str = r#"
    id, owner_id, kind, name, slug, description, address, phone, category_tags,
    external_link, link_state, distinct_branch, created_at, updated_at
"#;

/// Insert a new entity row (audit entries are appended separately)
pub async fn insert_entity(conn: &mut SqliteConnection, entity: &Entity) -> CurationResult<()> {
    let tags = serde_json::to_string(&entity.category_tags)?;

    sqlx::query(
        r#"
        INSERT INTO entities (
            id, owner_id, kind, name, slug, description, address, phone, category_tags,
            external_link, link_state, distinct_branch, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entity.id.to_string())
    .bind(entity.owner_id.map(|id| id.to_string()))
    .bind(entity.kind.as_str())
    .bind(&entity.name)
    .bind(&entity.slug)
    .bind(&entity.description)
    .bind(&entity.address)
    .bind(&entity.phone)
    .bind(tags)
    .bind(&entity.external_link)
    .bind(entity.link_state.as_str())
    .bind(entity.distinct_branch)
    .bind(time::to_db(&entity.created_at))
    .bind(time::to_db(&entity.updated_at))
    .execute(conn)
    .await?;

    Ok(())
}

/// Overwrite every mutable column of an existing entity
pub async fn update_entity(conn: &mut SqliteConnection, entity: &Entity) -> CurationResult<()> {
    let tags = serde_json::to_string(&entity.category_tags)?;

    sqlx::query(
        r#"
        UPDATE entities SET
            kind = ?, name = ?, slug = ?, description = ?, address = ?, phone = ?,
            category_tags = ?, external_link = ?, link_state = ?, distinct_branch = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(entity.kind.as_str())
    .bind(&entity.name)
    .bind(&entity.slug)
    .bind(&entity.description)
    .bind(&entity.address)
    .bind(&entity.phone)
    .bind(tags)
    .bind(&entity.external_link)
    .bind(entity.link_state.as_str())
    .bind(entity.distinct_branch)
    .bind(time::to_db(&entity.updated_at))
    .bind(entity.id.to_string())
    .execute(conn)
    .await?;

    Ok(())
}

/// Delete an entity; associations and audit rows cascade
pub async fn delete_entity(conn: &mut SqliteConnection, id: Uuid) -> CurationResult<bool> {
    let result = sqlx::query("DELETE FROM entities WHERE id = ?")
        .bind(id.to_string())
        .execute(conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Load one entity with its audit trail
pub async fn load_entity(conn: &mut SqliteConnection, id: Uuid) -> CurationResult<Option<Entity>> {
    let row = sqlx::query(&format!("SELECT {} FROM entities WHERE id = ?", ENTITY_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => {
            let mut entity = entity_from_row(&row)?;
            entity.link_audit = link_audit::load_entries(conn, entity.id).await?;
            Ok(Some(entity))
        }
        None => Ok(None),
    }
}

/// Entities first observed under `owner_id`, oldest first, with audit trails
pub async fn list_entities_for_owner(
    conn: &mut SqliteConnection,
    owner_id: Uuid,
) -> CurationResult<Vec<Entity>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM entities WHERE owner_id = ? ORDER BY created_at, id",
        ENTITY_COLUMNS
    ))
    .bind(owner_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    with_audit(conn, rows).await
}

/// Entities in a given link state, optionally limited to one owner
pub async fn list_entities_in_state(
    conn: &mut SqliteConnection,
    state: LinkState,
    owner_id: Option<Uuid>,
) -> CurationResult<Vec<Entity>> {
    let rows = match owner_id {
        Some(owner_id) => {
            sqlx::query(&format!(
                "SELECT {} FROM entities \
                 WHERE link_state = ? AND owner_id = ? ORDER BY created_at, id",
                ENTITY_COLUMNS
            ))
            .bind(state.as_str())
            .bind(owner_id.to_string())
            .fetch_all(&mut *conn)
            .await?
        }
        None => {
            sqlx::query(&format!(
                "SELECT {} FROM entities WHERE link_state = ? ORDER BY created_at, id",
                ENTITY_COLUMNS
            ))
            .bind(state.as_str())
            .fetch_all(&mut *conn)
            .await?
        }
    };

    with_audit(conn, rows).await
}

/// Pick a slug for `name` that no other entity uses.
///
/// `own_id` is excluded from the collision check so a renamed entity may keep
/// its current slug.
pub async fn allocate_slug(
    conn: &mut SqliteConnection,
    name: &str,
    own_id: Uuid,
) -> CurationResult<String> {
    let base = base_slug(name, own_id);

    let taken: Vec<String> =
        sqlx::query_scalar("SELECT slug FROM entities WHERE (slug = ? OR slug LIKE ?) AND id != ?")
            .bind(&base)
            .bind(format!("{}-%", base))
            .bind(own_id.to_string())
            .fetch_all(conn)
            .await?;

    let taken: HashSet<String> = taken.into_iter().collect();
    Ok(unique_slug(&base, |candidate| taken.contains(candidate)))
}

async fn with_audit(
    conn: &mut SqliteConnection,
    rows: Vec<SqliteRow>,
) -> CurationResult<Vec<Entity>> {
    let mut entities = Vec::with_capacity(rows.len());
    for row in rows {
        let mut entity = entity_from_row(&row)?;
        entity.link_audit = link_audit::load_entries(&mut *conn, entity.id).await?;
        entities.push(entity);
    }
    Ok(entities)
}

fn entity_from_row(row: &SqliteRow) -> CurationResult<Entity> {
    let id: String = row.get("id");
    let owner_id: Option<String> = row.get("owner_id");
    let kind: String = row.get("kind");
    let tags: String = row.get("category_tags");
    let link_state: String = row.get("link_state");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Entity {
        id: parse_uuid("entities.id", &id)?,
        owner_id: owner_id
            .map(|s| parse_uuid("entities.owner_id", &s))
            .transpose()?,
        kind: kind.parse::<EntityKind>()?,
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        address: row.get("address"),
        phone: row.get("phone"),
        category_tags: serde_json::from_str(&tags)?,
        external_link: row.get("external_link"),
        link_state: link_state.parse::<LinkState>()?,
        link_audit: Vec::new(),
        distinct_branch: row.get("distinct_branch"),
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{associations, episodes, owners};
    use fancat_common::db::open_in_memory;
    use fancat_common::{Association, ContentOwner, Episode, LinkAuditEntry, NewEntity};

    async fn stored_entity(conn: &mut SqliteConnection, name: &str) -> Entity {
        let id = Uuid::new_v4();
        let slug = allocate_slug(conn, name, id).await.unwrap();
        let mut entity = Entity::from_new(&NewEntity::named(name), None, slug);
        entity.id = id;
        insert_entity(conn, &entity).await.unwrap();
        entity
    }

    #[tokio::test]
    async fn test_entity_round_trip_with_audit() {
        let pool = open_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let mut entity = stored_entity(&mut conn, "Ichiban Sushi").await;
        entity.category_tags = vec!["sushi".to_string(), "寿司".to_string()];
        entity.external_link = Some("https://tabelog.com/tokyo/A1301/".to_string());
        entity.link_state = LinkState::Candidate;
        update_entity(&mut conn, &entity).await.unwrap();

        let entry = LinkAuditEntry {
            timestamp: time::now(),
            source: "test".to_string(),
            previous_url: None,
            new_url: entity.external_link.clone(),
            from_state: LinkState::Unlinked,
            to_state: LinkState::Candidate,
            reason: None,
            note: "attached".to_string(),
        };
        link_audit::append_entry(&mut conn, entity.id, &entry).await.unwrap();

        let loaded = load_entity(&mut conn, entity.id).await.unwrap().unwrap();
        assert_eq!(loaded.category_tags, entity.category_tags);
        assert_eq!(loaded.link_state, LinkState::Candidate);
        assert_eq!(loaded.link_audit, vec![entry]);
    }

    #[tokio::test]
    async fn test_allocate_slug_skips_taken() {
        let pool = open_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let first = stored_entity(&mut conn, "Daruma").await;
        let second = stored_entity(&mut conn, "daruma!").await;

        assert_eq!(first.slug, "daruma");
        assert_eq!(second.slug, "daruma-2");

        // Own slug is not a collision
        let again = allocate_slug(&mut conn, "Daruma", first.id).await.unwrap();
        assert_eq!(again, "daruma");
    }

    #[tokio::test]
    async fn test_delete_cascades_associations() {
        let pool = open_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let owner = ContentOwner::new("Owner", "owner");
        owners::insert_owner(&mut conn, &owner).await.unwrap();
        let episode = Episode::new(owner.id, "Sushi day", None, time::now());
        episodes::insert_episode(&mut conn, &episode).await.unwrap();

        let entity = stored_entity(&mut conn, "Ichiban Sushi").await;
        associations::insert_association(&mut conn, &Association::new(episode.id, entity.id))
            .await
            .unwrap();

        assert!(delete_entity(&mut conn, entity.id).await.unwrap());
        let remaining = associations::list_for_entity(&mut conn, entity.id).await.unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn test_repoint_keeps_existing_pairs() {
        let pool = open_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let owner = ContentOwner::new("Owner", "owner");
        owners::insert_owner(&mut conn, &owner).await.unwrap();
        let ep1 = Episode::new(owner.id, "Episode 1", None, time::now());
        let ep2 = Episode::new(owner.id, "Episode 2", None, time::now());
        episodes::insert_episode(&mut conn, &ep1).await.unwrap();
        episodes::insert_episode(&mut conn, &ep2).await.unwrap();

        let a = stored_entity(&mut conn, "Daruma Higashiyo").await;
        let b = stored_entity(&mut conn, "Daruma Shinmaruko").await;
        for assoc in [
            Association::new(ep1.id, a.id),
            Association::new(ep2.id, a.id),
            Association::new(ep1.id, b.id),
        ] {
            associations::insert_association(&mut conn, &assoc).await.unwrap();
        }

        let moved = associations::repoint(&mut conn, a.id, b.id).await.unwrap();

        assert_eq!(moved, 1);
        assert!(associations::list_for_entity(&mut conn, a.id).await.unwrap().is_empty());
        assert_eq!(associations::list_for_entity(&mut conn, b.id).await.unwrap().len(), 2);
    }
}
