//! SQLite system event repository implementation.
//!
//! Events are append-only. Listing builds its WHERE clause from the
//! optional filters with `QueryBuilder`, newest first.

use formflow_core::repository::event::EventRepository;
use formflow_types::error::RepositoryError;
use formflow_types::event::{EventFilter, SystemEvent};
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{QueryBuilder, Row};

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_json, parse_uuid, to_json};

/// SQLite-backed implementation of `EventRepository`.
pub struct SqliteEventRepository {
    pool: DatabasePool,
}

impl SqliteEventRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn row_to_event(row: &SqliteRow) -> Result<SystemEvent, RepositoryError> {
    let get = |e: sqlx::Error| RepositoryError::Query(e.to_string());

    let id: String = row.try_get("id").map_err(get)?;
    let metadata: String = row.try_get("metadata").map_err(get)?;
    let created_at: String = row.try_get("created_at").map_err(get)?;

    Ok(SystemEvent {
        id: parse_uuid(&id)?,
        event_type: row.try_get("event_type").map_err(get)?,
        event_category: row.try_get("event_category").map_err(get)?,
        event_name: row.try_get("event_name").map_err(get)?,
        description: row.try_get("description").map_err(get)?,
        metadata: parse_json(&metadata, "metadata")?,
        session_id: row.try_get("session_id").map_err(get)?,
        user_agent: row.try_get("user_agent").map_err(get)?,
        ip_address: row.try_get("ip_address").map_err(get)?,
        created_at: parse_datetime(&created_at)?,
    })
}

impl EventRepository for SqliteEventRepository {
    async fn insert_event(&self, event: &SystemEvent) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO system_events (id, event_type, event_category, event_name, description,
                   metadata, session_id, user_agent, ip_address, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(event.id.to_string())
        .bind(&event.event_type)
        .bind(&event.event_category)
        .bind(&event.event_name)
        .bind(&event.description)
        .bind(to_json(&event.metadata)?)
        .bind(&event.session_id)
        .bind(&event.user_agent)
        .bind(&event.ip_address)
        .bind(format_datetime(&event.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<SystemEvent>, RepositoryError> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM system_events WHERE 1 = 1");

        if let Some(event_type) = &filter.event_type {
            query.push(" AND event_type = ").push_bind(event_type.clone());
        }
        if let Some(category) = &filter.category {
            query.push(" AND event_category = ").push_bind(category.clone());
        }
        if let Some(from) = &filter.from {
            query.push(" AND created_at >= ").push_bind(format_datetime(from));
        }
        if let Some(to) = &filter.to {
            query.push(" AND created_at <= ").push_bind(format_datetime(to));
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", escape_like(search));
            query
                .push(" AND (event_name LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR description LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
        if let Some(user_id) = &filter.user_id {
            query
                .push(" AND json_extract(metadata, '$.user_id') = ")
                .push_bind(user_id.clone());
        }
        if let Some(session_id) = &filter.session_id {
            query.push(" AND session_id = ").push_bind(session_id.clone());
        }

        query
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(filter.limit as i64)
            .push(" OFFSET ")
            .push_bind(filter.offset as i64);

        let rows = query
            .build()
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter().map(row_to_event).collect()
    }
}

/// Escape LIKE wildcards so user input only matches literally.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
