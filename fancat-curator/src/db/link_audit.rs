//! Link audit trail persistence
//!
//! Insert-only. Rows disappear only through the cascade when their entity is
//! deleted by a duplicate merge.

use fancat_common::time;
use fancat_common::{InactiveReason, LinkAuditEntry, LinkState};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::parse_ts;
use crate::error::CurationResult;

/// Append one audit entry
pub async fn append_entry(
    conn: &mut SqliteConnection,
    entity_id: Uuid,
    entry: &LinkAuditEntry,
) -> CurationResult<()> {
    sqlx::query(
        r#"
        INSERT INTO entity_link_audit (
            entity_id, timestamp, source, previous_url, new_url,
            from_state, to_state, reason, note
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entity_id.to_string())
    .bind(time::to_db(&entry.timestamp))
    .bind(&entry.source)
    .bind(&entry.previous_url)
    .bind(&entry.new_url)
    .bind(entry.from_state.as_str())
    .bind(entry.to_state.as_str())
    .bind(entry.reason.map(|r| r.as_str()))
    .bind(&entry.note)
    .execute(conn)
    .await?;

    Ok(())
}

/// Audit trail of one entity, oldest first
pub async fn load_entries(
    conn: &mut SqliteConnection,
    entity_id: Uuid,
) -> CurationResult<Vec<LinkAuditEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT timestamp, source, previous_url, new_url, from_state, to_state, reason, note
        FROM entity_link_audit
        WHERE entity_id = ?
        ORDER BY seq
        "#,
    )
    .bind(entity_id.to_string())
    .fetch_all(conn)
    .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let timestamp: String = row.get("timestamp");
        let from_state: String = row.get("from_state");
        let to_state: String = row.get("to_state");
        let reason: Option<String> = row.get("reason");

        entries.push(LinkAuditEntry {
            timestamp: parse_ts(&timestamp)?,
            source: row.get("source"),
            previous_url: row.get("previous_url"),
            new_url: row.get("new_url"),
            from_state: from_state.parse::<LinkState>()?,
            to_state: to_state.parse::<LinkState>()?,
            reason: reason.map(|r| r.parse::<InactiveReason>()).transpose()?,
            note: row.get("note"),
        });
    }

    Ok(entries)
}
