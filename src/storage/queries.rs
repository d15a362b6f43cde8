//! Database queries for memory and conversation operations

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;

use crate::error::{DurandalError, Result};
use crate::types::*;

/// Process-wide monotonic timestamp source
///
/// `created_at` must be non-decreasing within a process even if the wall
/// clock steps backwards; ties are bumped by a microsecond so insertion
/// order survives the `created_at desc` sort.
static LAST_TIMESTAMP: Lazy<Mutex<DateTime<Utc>>> = Lazy::new(|| Mutex::new(DateTime::UNIX_EPOCH));

pub fn next_timestamp() -> DateTime<Utc> {
    let mut last = LAST_TIMESTAMP.lock();
    let now = Utc::now();
    let ts = if now > *last {
        now
    } else {
        *last + chrono::Duration::microseconds(1)
    };
    *last = ts;
    ts
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Parse a memory from a database row
///
/// Corrupt metadata JSON is repaired to the default record and logged;
/// availability wins over strictness for a personal store.
pub fn memory_from_row(row: &Row) -> rusqlite::Result<Memory> {
    let id: i64 = row.get("id")?;
    let content: String = row.get("content")?;
    let metadata_str: String = row.get("metadata")?;
    let created_at: String = row.get("created_at")?;

    let metadata = match serde_json::from_str::<MemoryMetadata>(&metadata_str) {
        Ok(meta) => meta,
        Err(e) => {
            tracing::warn!(memory_id = id, error = %e, "repairing corrupt metadata to default");
            MemoryMetadata::default()
        }
    };

    Ok(Memory {
        id,
        content,
        metadata,
        created_at: parse_ts(&created_at),
    })
}

/// Insert a new memory and return the stored row
pub fn store_memory(conn: &Connection, content: &str, metadata: &MemoryMetadata) -> Result<Memory> {
    if content.is_empty() {
        return Err(DurandalError::validation("content", "must not be empty"));
    }
    if content.len() > CONTENT_SOFT_LIMIT_BYTES {
        tracing::warn!(bytes = content.len(), "content exceeds 1 MB soft limit");
    }
    if !(0.0..=1.0).contains(&metadata.importance) {
        return Err(DurandalError::validation(
            "metadata.importance",
            "must be within [0,1]",
        ));
    }

    let created_at = next_timestamp();
    let metadata_json = serde_json::to_string(metadata)?;

    tracing::debug!(bytes = content.len(), "inserting memory");
    conn.execute(
        "INSERT INTO memories (content, metadata, created_at) VALUES (?1, ?2, ?3)",
        params![content, metadata_json, format_ts(created_at)],
    )?;
    let id = conn.last_insert_rowid();

    Ok(Memory {
        id,
        content: content.to_string(),
        metadata: metadata.clone(),
        created_at,
    })
}

/// Substring search over content, case-insensitive, with metadata filters
///
/// Results are ordered newest-first; the relevance pipeline reorders them
/// afterwards. `limit` is clamped to [1, 100] by the dispatcher.
pub fn search_memories(
    conn: &Connection,
    query: &str,
    filters: &SearchFilters,
    limit: i64,
) -> Result<Vec<Memory>> {
    let mut sql = String::from(
        "SELECT id, content, metadata, created_at FROM memories
         WHERE lower(content) LIKE '%' || lower(?1) || '%'",
    );
    let mut bound: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(query.to_string())];

    push_filter_conditions(filters, &mut sql, &mut bound);

    bound.push(Box::new(limit));
    sql.push_str(&format!(" ORDER BY created_at DESC, id DESC LIMIT ?{}", bound.len()));

    tracing::debug!(query, limit, "substring prefilter");
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params_from_iter(bound.iter().map(|p| p.as_ref())),
        memory_from_row,
    )?;

    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// OR-of-terms substring prefilter feeding the relevance scorer
///
/// A memory qualifies when any term appears in its content. An empty term
/// list degrades to a recency-ordered scan so the scorer still sees
/// candidates for keyword-free queries.
pub fn prefilter_memories(
    conn: &Connection,
    terms: &[String],
    filters: &SearchFilters,
    limit: i64,
) -> Result<Vec<Memory>> {
    let mut sql = String::from("SELECT id, content, metadata, created_at FROM memories WHERE 1=1");
    let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if !terms.is_empty() {
        let mut clauses = Vec::with_capacity(terms.len());
        for term in terms {
            bound.push(Box::new(term.clone()));
            clauses.push(format!(
                "lower(content) LIKE '%' || lower(?{}) || '%'",
                bound.len()
            ));
        }
        sql.push_str(&format!(" AND ({})", clauses.join(" OR ")));
    }

    push_filter_conditions(filters, &mut sql, &mut bound);

    bound.push(Box::new(limit));
    sql.push_str(&format!(" ORDER BY created_at DESC, id DESC LIMIT ?{}", bound.len()));

    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params_from_iter(bound.iter().map(|p| p.as_ref())),
        memory_from_row,
    )?;

    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

fn push_filter_conditions(
    filters: &SearchFilters,
    sql: &mut String,
    bound: &mut Vec<Box<dyn rusqlite::ToSql>>,
) {
    // json functions raise on malformed JSON, so every metadata condition
    // is guarded; corrupt rows simply never match a filter.
    if let Some(min) = filters.min_importance {
        bound.push(Box::new(min as f64));
        sql.push_str(&format!(
            " AND json_valid(metadata)
               AND CAST(json_extract(metadata, '$.importance') AS REAL) >= ?{}",
            bound.len()
        ));
    }
    if let Some(project) = &filters.project {
        bound.push(Box::new(project.clone()));
        sql.push_str(&format!(
            " AND json_valid(metadata) AND json_extract(metadata, '$.project') = ?{}",
            bound.len()
        ));
    }
    if let Some(session) = &filters.session {
        bound.push(Box::new(session.clone()));
        sql.push_str(&format!(
            " AND json_valid(metadata) AND json_extract(metadata, '$.session') = ?{}",
            bound.len()
        ));
    }
    if let Some(categories) = &filters.categories {
        for category in categories {
            bound.push(Box::new(category.clone()));
            sql.push_str(&format!(
                " AND json_valid(metadata)
                   AND EXISTS (SELECT 1 FROM json_each(metadata, '$.categories')
                               WHERE json_each.value = ?{})",
                bound.len()
            ));
        }
    }
}

/// Most recent memories, optionally restricted to a project and/or session
pub fn get_recent_memories(
    conn: &Connection,
    limit: i64,
    project: Option<&str>,
    session: Option<&str>,
) -> Result<Vec<Memory>> {
    let mut sql = String::from("SELECT id, content, metadata, created_at FROM memories WHERE 1=1");
    let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(project) = project {
        bound.push(Box::new(project.to_string()));
        sql.push_str(&format!(
            " AND json_extract(metadata, '$.project') = ?{}",
            bound.len()
        ));
    }
    if let Some(session) = session {
        bound.push(Box::new(session.to_string()));
        sql.push_str(&format!(
            " AND json_extract(metadata, '$.session') = ?{}",
            bound.len()
        ));
    }
    bound.push(Box::new(limit));
    sql.push_str(&format!(" ORDER BY created_at DESC, id DESC LIMIT ?{}", bound.len()));

    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params_from_iter(bound.iter().map(|p| p.as_ref())),
        memory_from_row,
    )?;

    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Fetch a memory by id
pub fn get_memory_by_id(conn: &Connection, id: MemoryId) -> Result<Option<Memory>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, content, metadata, created_at FROM memories WHERE id = ?1",
    )?;
    Ok(stmt.query_row(params![id], memory_from_row).optional()?)
}

/// Delete a memory row; NotFound when the id does not exist
pub fn delete_memory(conn: &Connection, id: MemoryId) -> Result<()> {
    let affected = conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
    if affected == 0 {
        return Err(DurandalError::NotFound(id));
    }
    Ok(())
}

/// Replace a memory's metadata
pub fn update_memory_metadata(
    conn: &Connection,
    id: MemoryId,
    metadata: &MemoryMetadata,
) -> Result<()> {
    let metadata_json = serde_json::to_string(metadata)?;
    let affected = conn.execute(
        "UPDATE memories SET metadata = ?1 WHERE id = ?2",
        params![metadata_json, id],
    )?;
    if affected == 0 {
        return Err(DurandalError::NotFound(id));
    }
    Ok(())
}

pub fn count_memories(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?)
}

/// Store-wide statistics
pub fn stats(conn: &Connection) -> Result<StoreStats> {
    let count = |table: &str| -> Result<i64> {
        Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?)
    };
    let db_size_bytes: i64 = conn.query_row(
        "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
        [],
        |row| row.get(0),
    )?;
    let schema_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(StoreStats {
        total_memories: count("memories")?,
        total_projects: count("projects")?,
        total_sessions: count("conversation_sessions")?,
        total_messages: count("conversation_messages")?,
        total_artifacts: count("extracted_artifacts")?,
        db_size_bytes,
        schema_version,
    })
}

fn project_from_row(row: &Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get("id")?,
        name: row.get("name")?,
        path: row.get("path")?,
        created_at: parse_ts(&row.get::<_, String>("created_at")?),
    })
}

fn session_from_row(row: &Row) -> rusqlite::Result<Session> {
    let last_message_at: Option<String> = row.get("last_message_at")?;
    Ok(Session {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        session_name: row.get("session_name")?,
        created_at: parse_ts(&row.get::<_, String>("created_at")?),
        last_message_at: last_message_at.as_deref().map(parse_ts),
        is_active: row.get::<_, i64>("is_active")? != 0,
    })
}

/// Fetch a project by name, creating it on first reference
pub fn get_or_create_project(conn: &Connection, name: &str, path: Option<&str>) -> Result<Project> {
    if name.trim().is_empty() {
        return Err(DurandalError::validation("project", "must not be empty"));
    }

    let existing = conn
        .prepare_cached("SELECT id, name, path, created_at FROM projects WHERE name = ?1")?
        .query_row(params![name], project_from_row)
        .optional()?;
    if let Some(project) = existing {
        return Ok(project);
    }

    let created_at = next_timestamp();
    conn.execute(
        "INSERT INTO projects (name, path, created_at) VALUES (?1, ?2, ?3)",
        params![name, path, format_ts(created_at)],
    )?;

    Ok(Project {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        path: path.map(String::from),
        created_at,
    })
}

/// Fetch a session by name within a project, creating it on first reference
pub fn get_or_create_session(conn: &Connection, project_id: i64, name: &str) -> Result<Session> {
    if name.trim().is_empty() {
        return Err(DurandalError::validation("session", "must not be empty"));
    }

    let existing = conn
        .prepare_cached(
            "SELECT id, project_id, session_name, created_at, last_message_at, is_active
             FROM conversation_sessions WHERE project_id = ?1 AND session_name = ?2",
        )?
        .query_row(params![project_id, name], session_from_row)
        .optional()?;
    if let Some(session) = existing {
        return Ok(session);
    }

    let created_at = next_timestamp();
    conn.execute(
        "INSERT INTO conversation_sessions (project_id, session_name, created_at, is_active)
         VALUES (?1, ?2, ?3, 1)",
        params![project_id, name, format_ts(created_at)],
    )?;

    Ok(Session {
        id: conn.last_insert_rowid(),
        project_id,
        session_name: name.to_string(),
        created_at,
        last_message_at: None,
        is_active: true,
    })
}

fn message_from_row(row: &Row) -> rusqlite::Result<Message> {
    let role_str: String = row.get("role")?;
    let metadata_str: String = row.get("metadata")?;
    let metadata: HashMap<String, serde_json::Value> =
        serde_json::from_str(&metadata_str).unwrap_or_default();

    Ok(Message {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        role: role_str.parse().unwrap_or(Role::User),
        content: row.get("content")?,
        metadata,
        timestamp: parse_ts(&row.get::<_, String>("timestamp")?),
    })
}

/// Append a conversation message and bump the session's last_message_at
pub fn add_message(
    conn: &Connection,
    session_id: i64,
    role: Role,
    content: &str,
    metadata: &HashMap<String, serde_json::Value>,
) -> Result<Message> {
    let timestamp = next_timestamp();
    let metadata_json = serde_json::to_string(metadata)?;

    conn.execute(
        "INSERT INTO conversation_messages (session_id, role, content, metadata, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![session_id, role.as_str(), content, metadata_json, format_ts(timestamp)],
    )?;
    let id = conn.last_insert_rowid();

    conn.execute(
        "UPDATE conversation_sessions SET last_message_at = ?1 WHERE id = ?2",
        params![format_ts(timestamp), session_id],
    )?;

    Ok(Message {
        id,
        session_id,
        role,
        content: content.to_string(),
        metadata: metadata.clone(),
        timestamp,
    })
}

/// Most recent messages for a session, oldest-first within the window
pub fn recent_messages(conn: &Connection, session_id: i64, limit: i64) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, session_id, role, content, metadata, timestamp
         FROM conversation_messages WHERE session_id = ?1
         ORDER BY timestamp DESC, id DESC LIMIT ?2",
    )?;
    let mut messages: Vec<Message> = stmt
        .query_map(params![session_id, limit], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    messages.reverse();
    Ok(messages)
}

/// Most recent messages for a session looked up by name across projects
pub fn recent_messages_by_session_name(
    conn: &Connection,
    session_name: &str,
    limit: i64,
) -> Result<Vec<Message>> {
    let session_id: Option<i64> = conn
        .prepare_cached(
            "SELECT id FROM conversation_sessions WHERE session_name = ?1
             ORDER BY last_message_at DESC LIMIT 1",
        )?
        .query_row(params![session_name], |row| row.get(0))
        .optional()?;

    match session_id {
        Some(id) => recent_messages(conn, id, limit),
        None => Ok(Vec::new()),
    }
}

fn artifact_from_row(row: &Row) -> rusqlite::Result<Artifact> {
    let metadata_str: String = row.get("metadata")?;
    Ok(Artifact {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        artifact_type: row.get("artifact_type")?,
        title: row.get("title")?,
        content: row.get("content")?,
        metadata: serde_json::from_str(&metadata_str).unwrap_or_default(),
        importance_score: row.get("importance_score")?,
        created_at: parse_ts(&row.get::<_, String>("created_at")?),
    })
}

/// Record extracted knowledge against a session
pub fn add_artifact(
    conn: &Connection,
    session_id: i64,
    artifact_type: &str,
    title: Option<&str>,
    content: &str,
    importance_score: f32,
) -> Result<Artifact> {
    if content.is_empty() {
        return Err(DurandalError::validation("content", "must not be empty"));
    }

    let created_at = next_timestamp();
    conn.execute(
        "INSERT INTO extracted_artifacts
           (session_id, artifact_type, title, content, metadata, importance_score, created_at)
         VALUES (?1, ?2, ?3, ?4, '{}', ?5, ?6)",
        params![session_id, artifact_type, title, content, importance_score as f64, format_ts(created_at)],
    )?;

    Ok(Artifact {
        id: conn.last_insert_rowid(),
        session_id,
        artifact_type: artifact_type.to_string(),
        title: title.map(String::from),
        content: content.to_string(),
        metadata: HashMap::new(),
        importance_score,
        created_at,
    })
}

/// Artifacts for a session ordered by importance
pub fn artifacts_for_session(conn: &Connection, session_id: i64) -> Result<Vec<Artifact>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, session_id, artifact_type, title, content, metadata, importance_score, created_at
         FROM extracted_artifacts WHERE session_id = ?1
         ORDER BY importance_score DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![session_id], artifact_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Linear importance decay for aggressive optimize
///
/// importance -= rate × age_days, clamped to [0,1]. Age is measured from
/// created_at; the schema does not track last access.
pub fn decay_importance(conn: &Connection, rate_per_day: f64) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE memories SET metadata = json_set(
            metadata, '$.importance',
            max(0.0, min(1.0,
                CAST(json_extract(metadata, '$.importance') AS REAL)
                - ?1 * (julianday('now') - julianday(created_at))
            ))
         )
         WHERE json_valid(metadata)",
        params![rate_per_day],
    )?;
    Ok(affected)
}

/// Drop old rows that carry no metadata beyond importance and score < 0.2
pub fn prune_stale_memories(conn: &Connection, older_than_days: i64) -> Result<usize> {
    let affected = conn.execute(
        "DELETE FROM memories
         WHERE julianday('now') - julianday(created_at) > ?1
           AND json_valid(metadata)
           AND CAST(json_extract(metadata, '$.importance') AS REAL) < 0.2
           AND NOT EXISTS (
               SELECT 1 FROM json_each(metadata) WHERE json_each.key != 'importance'
           )",
        params![older_than_days],
    )?;
    Ok(affected)
}

/// Refresh planner statistics and derived indices
pub fn analyze_and_reindex(conn: &Connection) -> Result<()> {
    conn.execute_batch("ANALYZE; REINDEX;")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;
    use serde_json::json;

    fn meta(importance: f32) -> MemoryMetadata {
        MemoryMetadata {
            importance,
            ..Default::default()
        }
    }

    #[test]
    fn timestamps_are_monotonic() {
        let mut prev = next_timestamp();
        for _ in 0..100 {
            let ts = next_timestamp();
            assert!(ts >= prev);
            prev = ts;
        }
    }

    #[test]
    fn store_and_get_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let mut metadata = meta(0.8);
        metadata.categories = vec!["auth".to_string()];
        metadata.extra.insert("ticket".to_string(), json!("ENG-42"));

        let stored = store
            .with_transaction(|conn| store_memory(conn, "JWT tokens rotate weekly", &metadata))
            .unwrap();

        let fetched = store
            .with_connection(|conn| get_memory_by_id(conn, stored.id))
            .unwrap()
            .unwrap();
        assert_eq!(fetched.content, "JWT tokens rotate weekly");
        assert_eq!(fetched.metadata, metadata);
    }

    #[test]
    fn empty_content_rejected() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .with_transaction(|conn| store_memory(conn, "", &meta(0.5)))
            .unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[test]
    fn substring_search_is_case_insensitive() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_transaction(|conn| {
                store_memory(conn, "The Database Uses WAL Mode", &meta(0.5))?;
                store_memory(conn, "unrelated note", &meta(0.5))
            })
            .unwrap();

        let hits = store
            .with_connection(|conn| {
                search_memories(conn, "database uses", &SearchFilters::default(), 10)
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn filters_narrow_results() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_transaction(|conn| {
                let mut important = meta(0.9);
                important.project = Some("api".to_string());
                important.categories = vec!["auth".to_string()];
                store_memory(conn, "token refresh flow", &important)?;
                let mut minor = meta(0.1);
                minor.project = Some("web".to_string());
                store_memory(conn, "token styling tweak", &minor)
            })
            .unwrap();

        let filters = SearchFilters {
            min_importance: Some(0.5),
            project: Some("api".to_string()),
            categories: Some(vec!["auth".to_string()]),
            ..Default::default()
        };
        let hits = store
            .with_connection(|conn| search_memories(conn, "token", &filters, 10))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "token refresh flow");
    }

    #[test]
    fn recent_memories_newest_first() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_transaction(|conn| {
                for i in 0..5 {
                    store_memory(conn, &format!("note {i}"), &meta(0.5))?;
                }
                Ok(())
            })
            .unwrap();

        let recent = store
            .with_connection(|conn| get_recent_memories(conn, 3, None, None))
            .unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "note 4");
        assert_eq!(recent[2].content, "note 2");
    }

    #[test]
    fn corrupt_metadata_repaired_to_default() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO memories (content, metadata, created_at)
                     VALUES ('broken', '{not json', '2026-01-01T00:00:00Z')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let memory = store
            .with_connection(|conn| get_memory_by_id(conn, 1))
            .unwrap()
            .unwrap();
        assert_eq!(memory.metadata, MemoryMetadata::default());
    }

    #[test]
    fn ids_not_reused_after_delete() {
        let store = Store::open_in_memory().unwrap();
        let first = store
            .with_transaction(|conn| store_memory(conn, "one", &meta(0.5)))
            .unwrap();
        store
            .with_transaction(|conn| delete_memory(conn, first.id))
            .unwrap();
        let second = store
            .with_transaction(|conn| store_memory(conn, "two", &meta(0.5)))
            .unwrap();
        assert!(second.id > first.id);
    }

    #[test]
    fn session_graph_lazily_created() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_transaction(|conn| {
                let project = get_or_create_project(conn, "durandal", Some("/src/durandal"))?;
                let again = get_or_create_project(conn, "durandal", None)?;
                assert_eq!(project.id, again.id);

                let session = get_or_create_session(conn, project.id, "main")?;
                add_message(conn, session.id, Role::User, "hello", &HashMap::new())?;
                add_message(conn, session.id, Role::Assistant, "hi", &HashMap::new())?;

                let messages = recent_messages(conn, session.id, 10)?;
                assert_eq!(messages.len(), 2);
                assert_eq!(messages[0].role, Role::User);

                let artifact =
                    add_artifact(conn, session.id, "decision", Some("WAL"), "use WAL", 0.9)?;
                assert_eq!(artifacts_for_session(conn, session.id)?[0].id, artifact.id);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn prune_drops_only_bare_low_value_rows() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO memories (content, metadata, created_at)
                     VALUES ('old junk', '{\"importance\":0.1}', '2020-01-01T00:00:00Z')",
                    [],
                )?;
                conn.execute(
                    "INSERT INTO memories (content, metadata, created_at)
                     VALUES ('old but tagged', '{\"importance\":0.1,\"categories\":[\"keep\"]}',
                             '2020-01-01T00:00:00Z')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let pruned = store
            .with_transaction(|conn| prune_stale_memories(conn, 30))
            .unwrap();
        assert_eq!(pruned, 1);
        let remaining = store.with_connection(count_memories).unwrap();
        assert_eq!(remaining, 1);
    }

    #[test]
    fn decay_clamps_to_zero() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO memories (content, metadata, created_at)
                     VALUES ('ancient', '{\"importance\":0.3}', '2019-01-01T00:00:00Z')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        store
            .with_transaction(|conn| decay_importance(conn, 0.01))
            .unwrap();
        let memory = store
            .with_connection(|conn| get_memory_by_id(conn, 1))
            .unwrap()
            .unwrap();
        assert_eq!(memory.metadata.importance, 0.0);
    }
}
