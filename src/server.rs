//! Tool dispatcher
//!
//! Maps the four named tools onto the store, cache, analyzer, and scorer.
//! Arguments are validated with field paths before any effect; recoverable
//! failures come back as structured `{success:false, error}` values and
//! panics are caught at this boundary so the server never crashes on a
//! single request.

use serde_json::{json, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use crate::analysis::query::{analyze, HistoryMessage};
use crate::analysis::relevance::{RelevanceScorer, ScorerConfig};
use crate::cache::MemoryCache;
use crate::config::Config;
use crate::error::{DurandalError, Result};
use crate::mcp::{
    get_tool_definitions, methods, InitializeResult, McpHandler, McpRequest, McpResponse,
    RequestContext, ToolCallResult,
};
use crate::storage::{queries, Store};
use crate::types::*;

/// How many messages feed the analyzer's conversation window
const HISTORY_WINDOW: i64 = 10;

/// How many substring-prefiltered candidates the scorer sees
const CANDIDATE_POOL: i64 = MAX_SEARCH_LIMIT;

/// MCP request handler owning the memory pipeline
pub struct DurandalHandler {
    store: Store,
    cache: Arc<MemoryCache>,
    log_tools: bool,
}

impl DurandalHandler {
    pub fn new(store: Store, config: &Config) -> Self {
        Self {
            store,
            cache: Arc::new(MemoryCache::new(&config.cache)),
            log_tools: config.log_mcp_tools,
        }
    }

    /// Cache handle (stats, self-test assertions)
    pub fn cache(&self) -> &MemoryCache {
        &self.cache
    }

    /// Store handle
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Dispatch one tool call; always returns a structured value
    pub fn handle_tool_call(&self, name: &str, args: Value, ctx: &RequestContext) -> Value {
        let started = Instant::now();
        if self.log_tools {
            tracing::debug!(correlation_id = %ctx.correlation_id, tool = name, args = %args, "tool call");
        }

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| match name {
            "store_memory" => self.tool_store_memory(&args, ctx),
            "search_memories" => self.tool_search_memories(&args, ctx),
            "get_context" => self.tool_get_context(&args, ctx),
            "optimize_memory" => self.tool_optimize_memory(&args, ctx),
            _ => Err(DurandalError::validation(
                "name",
                format!("unknown tool: {}", name),
            )),
        }));

        let value = match result {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => {
                tracing::error!(
                    correlation_id = %ctx.correlation_id,
                    tool = name,
                    code = err.kind(),
                    hint = err.hint(),
                    "{}", err
                );
                error_value(&err)
            }
            Err(_) => {
                let err = DurandalError::Internal(format!("panic while handling {}", name));
                tracing::error!(correlation_id = %ctx.correlation_id, tool = name, "{}", err);
                error_value(&err)
            }
        };

        tracing::info!(
            correlation_id = %ctx.correlation_id,
            tool = name,
            duration_ms = started.elapsed().as_millis() as u64,
            success = value.get("success").and_then(|v| v.as_bool()).unwrap_or(false),
            "tool call finished"
        );
        value
    }

    fn tool_store_memory(&self, args: &Value, ctx: &RequestContext) -> Result<Value> {
        if ctx.is_cancelled() {
            return Err(DurandalError::Cancelled);
        }

        let content = match args.get("content") {
            Some(Value::String(s)) if !s.is_empty() => s.as_str(),
            Some(Value::String(_)) => {
                return Err(DurandalError::validation("content", "must not be empty"))
            }
            Some(_) | None => {
                return Err(DurandalError::validation(
                    "content",
                    "required and must be a string",
                ))
            }
        };

        let mut metadata = match args.get("metadata") {
            None | Some(Value::Null) => MemoryMetadata::default(),
            Some(value @ Value::Object(_)) => serde_json::from_value(value.clone())
                .map_err(|e| DurandalError::validation("metadata", e.to_string()))?,
            Some(_) => return Err(DurandalError::validation("metadata", "must be an object")),
        };
        if !(0.0..=1.0).contains(&metadata.importance) {
            return Err(DurandalError::validation(
                "metadata.importance",
                "must be within [0,1]",
            ));
        }

        // Pre-compute retrieval hints: backfill keywords from the content so
        // future content-match scoring has tokens to work with.
        if metadata.keywords.is_empty() {
            metadata.keywords = analyze(content, &[]).keywords.into_iter().take(10).collect();
        }

        let memory = self
            .store
            .with_transaction(|conn| queries::store_memory(conn, content, &metadata))?;

        // Invalidate before returning so no stale fingerprint survives the
        // write; then warm the id tier with the fresh row.
        self.cache.invalidate_searches();
        self.cache.put_memory(memory.clone());

        Ok(json!({
            "success": true,
            "id": memory.id,
            "message": format!("Memory {} stored", memory.id),
        }))
    }

    fn tool_search_memories(&self, args: &Value, ctx: &RequestContext) -> Result<Value> {
        if ctx.is_cancelled() {
            return Err(DurandalError::Cancelled);
        }

        let query = match args.get("query") {
            Some(Value::String(s)) => s.clone(),
            Some(_) | None => {
                return Err(DurandalError::validation(
                    "query",
                    "required and must be a string",
                ))
            }
        };
        let limit = parse_limit(args.get("limit"), "limit")?;
        let filters = parse_filters(args.get("filters"))?;

        let fingerprint = MemoryCache::fingerprint(&query, &filters, limit);
        let hits = self.cache.search_through(&fingerprint, || {
            if ctx.is_cancelled() {
                return Err(DurandalError::Cancelled);
            }

            let history: Vec<HistoryMessage> = match &filters.session {
                Some(session) => self
                    .store
                    .with_connection(|conn| {
                        queries::recent_messages_by_session_name(conn, session, HISTORY_WINDOW)
                    })?
                    .iter()
                    .map(HistoryMessage::from)
                    .collect(),
                None => Vec::new(),
            };

            let analysis = analyze(&query, &history);

            // Prefilter on every extracted token class; a signal-free query
            // falls back to the raw phrase so the substring contract holds.
            let mut terms = analysis.keywords.clone();
            terms.extend(analysis.functions.iter().map(|f| f.to_lowercase()));
            terms.extend(analysis.classes.iter().map(|c| c.to_lowercase()));
            terms.extend(analysis.explicit_files.iter().cloned());
            terms.extend(
                analysis
                    .recently_mentioned_files
                    .iter()
                    .map(|m| m.filename.clone()),
            );
            terms.sort();
            terms.dedup();
            if terms.is_empty() {
                terms.push(query.trim().to_lowercase());
            }
            let candidates = self.store.with_connection(|conn| {
                queries::prefilter_memories(conn, &terms, &filters, CANDIDATE_POOL)
            })?;

            if ctx.is_cancelled() {
                return Err(DurandalError::Cancelled);
            }

            let scorer = RelevanceScorer::with_config(ScorerConfig {
                max_results: limit as usize,
                min_importance: filters.min_importance.unwrap_or(0.0),
                ..Default::default()
            });
            let hits = scorer.rank_to_hits(&analysis, candidates);

            for hit in &hits {
                self.cache.put_memory(hit.memory.clone());
            }
            Ok(hits)
        })?;

        Ok(json!({
            "success": true,
            "count": hits.len(),
            "results": hits,
            "query": query,
        }))
    }

    fn tool_get_context(&self, args: &Value, ctx: &RequestContext) -> Result<Value> {
        if ctx.is_cancelled() {
            return Err(DurandalError::Cancelled);
        }

        let session_id = match args.get("session_id") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(DurandalError::validation("session_id", "must be a string")),
        };
        let limit = parse_limit(args.get("limit"), "limit")?;

        let (memories, total) = self.store.with_connection(|conn| {
            let memories =
                queries::get_recent_memories(conn, limit, None, session_id.as_deref())?;
            let total = queries::count_memories(conn)?;
            Ok((memories, total))
        })?;

        Ok(json!({
            "success": true,
            "memories": memories,
            "stats": {
                "total_memories": total,
                "recent_count": memories.len(),
                "session_id": session_id,
            },
        }))
    }

    fn tool_optimize_memory(&self, args: &Value, ctx: &RequestContext) -> Result<Value> {
        if ctx.is_cancelled() {
            return Err(DurandalError::Cancelled);
        }

        let aggressive = match args.get("aggressive") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => return Err(DurandalError::validation("aggressive", "must be a boolean")),
        };

        let before = self.snapshot()?;
        let mut optimizations = Vec::new();

        if aggressive {
            let (decayed, pruned) = self.store.with_transaction(|conn| {
                let decayed = queries::decay_importance(conn, 0.01)?;
                let pruned = queries::prune_stale_memories(conn, 30)?;
                Ok((decayed, pruned))
            })?;
            optimizations.push(format!("decayed importance on {} memories", decayed));
            optimizations.push(format!("pruned {} stale low-value memories", pruned));
        }

        if ctx.is_cancelled() {
            return Err(DurandalError::Cancelled);
        }

        self.store.optimize()?;
        optimizations.push("refreshed planner statistics and indices".to_string());
        optimizations.push("vacuumed the store".to_string());

        if aggressive {
            self.cache.clear();
            let recent = self
                .store
                .with_connection(|conn| queries::get_recent_memories(conn, 10, None, None))?;
            let warmed = recent.len();
            for memory in recent {
                self.cache.put_memory(memory);
            }
            optimizations.push(format!("rebuilt cache ({} rows warmed)", warmed));
        } else {
            self.cache.invalidate_searches();
        }

        let after = self.snapshot()?;

        let cache_stats = self.cache.stats();
        tracing::debug!(
            hits = cache_stats.hits,
            misses = cache_stats.misses,
            evictions = cache_stats.evictions,
            coalesces = cache_stats.coalesces,
            "cache counters after optimize"
        );

        Ok(json!({
            "success": true,
            "optimizations": optimizations,
            "stats": OptimizeStats { before, after },
        }))
    }

    fn snapshot(&self) -> Result<StoreSnapshot> {
        let total_memories = self.store.with_connection(queries::count_memories)?;
        let db_size_bytes = self.store.db_size()?;
        Ok(StoreSnapshot {
            total_memories,
            db_size_bytes,
        })
    }
}

/// Shape an error into the structured tool response
fn error_value(err: &DurandalError) -> Value {
    json!({
        "success": false,
        "error": {
            "code": err.kind(),
            "message": err.to_string(),
            "hint": err.hint(),
        },
    })
}

fn parse_limit(value: Option<&Value>, field: &str) -> Result<i64> {
    match value {
        None | Some(Value::Null) => Ok(DEFAULT_SEARCH_LIMIT),
        Some(Value::Number(n)) => {
            let limit = n
                .as_i64()
                .ok_or_else(|| DurandalError::validation(field, "must be an integer"))?;
            if !(1..=MAX_SEARCH_LIMIT).contains(&limit) {
                return Err(DurandalError::validation(
                    field,
                    format!("must be within [1,{}]", MAX_SEARCH_LIMIT),
                ));
            }
            Ok(limit)
        }
        Some(_) => Err(DurandalError::validation(field, "must be an integer")),
    }
}

fn parse_filters(value: Option<&Value>) -> Result<SearchFilters> {
    let filters = match value {
        None | Some(Value::Null) => SearchFilters::default(),
        Some(value @ Value::Object(_)) => serde_json::from_value(value.clone())
            .map_err(|e| DurandalError::validation("filters", e.to_string()))?,
        Some(_) => return Err(DurandalError::validation("filters", "must be an object")),
    };
    if let Some(min) = filters.min_importance {
        if !(0.0..=1.0).contains(&min) {
            return Err(DurandalError::validation(
                "filters.minImportance",
                "must be within [0,1]",
            ));
        }
    }
    Ok(filters)
}

impl McpHandler for DurandalHandler {
    fn handle_request(&self, request: McpRequest, ctx: &RequestContext) -> Option<McpResponse> {
        match request.method.as_str() {
            methods::INITIALIZE => Some(McpResponse::success(
                request.id,
                serde_json::to_value(InitializeResult::default()).unwrap_or_default(),
            )),
            methods::LIST_TOOLS => Some(McpResponse::success(
                request.id,
                json!({ "tools": get_tool_definitions() }),
            )),
            methods::CALL_TOOL => {
                let name = request
                    .params
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let args = request
                    .params
                    .get("arguments")
                    .cloned()
                    .unwrap_or_else(|| json!({}));
                let value = self.handle_tool_call(&name, args, ctx);
                Some(McpResponse::success(
                    request.id,
                    serde_json::to_value(ToolCallResult::json(value)).unwrap_or_default(),
                ))
            }
            method if method.starts_with("notifications/") => None,
            other => Some(McpResponse::error(
                request.id,
                -32601,
                format!("Method not found: {}", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_handler() -> DurandalHandler {
        let store = Store::open_in_memory().unwrap();
        DurandalHandler::new(store, &Config::default())
    }

    fn call(handler: &DurandalHandler, name: &str, args: Value) -> Value {
        handler.handle_tool_call(name, args, &RequestContext::new())
    }

    #[test]
    fn store_then_search_round_trip() {
        let handler = test_handler();

        let stored = call(
            &handler,
            "store_memory",
            json!({
                "content": "JWT refresh tokens expire after 7 days",
                "metadata": {"importance": 0.8, "categories": ["auth"], "keywords": ["jwt", "refresh"]}
            }),
        );
        assert_eq!(stored["success"], true);
        let id = stored["id"].as_i64().unwrap();

        let found = call(
            &handler,
            "search_memories",
            json!({"query": "jwt refresh", "limit": 5}),
        );
        assert_eq!(found["success"], true);
        assert!(found["count"].as_u64().unwrap() >= 1);
        assert_eq!(found["results"][0]["id"].as_i64().unwrap(), id);
    }

    #[test]
    fn null_content_is_validation_error_without_effects() {
        let handler = test_handler();
        let result = call(&handler, "store_memory", json!({"content": null}));
        assert_eq!(result["success"], false);
        assert_eq!(result["error"]["code"], "ValidationError");

        let context = call(&handler, "get_context", json!({}));
        assert_eq!(context["stats"]["total_memories"], 0);
    }

    #[test]
    fn limit_boundaries() {
        let handler = test_handler();
        for (limit, ok) in [(0, false), (1, true), (100, true), (101, false)] {
            let result = call(
                &handler,
                "search_memories",
                json!({"query": "x", "limit": limit}),
            );
            assert_eq!(result["success"], ok, "limit={limit}");
            if !ok {
                assert_eq!(result["error"]["code"], "ValidationError");
            }
        }
    }

    #[test]
    fn min_importance_out_of_range_rejected() {
        let handler = test_handler();
        let result = call(
            &handler,
            "search_memories",
            json!({"query": "x", "filters": {"minImportance": 1.5}}),
        );
        assert_eq!(result["error"]["code"], "ValidationError");
        assert!(result["error"]["message"]
            .as_str()
            .unwrap()
            .contains("minImportance"));
    }

    #[test]
    fn unknown_tool_rejected() {
        let handler = test_handler();
        let result = call(&handler, "drop_all_memories", json!({}));
        assert_eq!(result["success"], false);
    }

    #[test]
    fn get_context_scopes_by_session() {
        let handler = test_handler();
        call(
            &handler,
            "store_memory",
            json!({"content": "session note", "metadata": {"session": "alpha"}}),
        );
        call(&handler, "store_memory", json!({"content": "global note"}));

        let context = call(&handler, "get_context", json!({"session_id": "alpha"}));
        assert_eq!(context["stats"]["recent_count"], 1);
        assert_eq!(context["stats"]["total_memories"], 2);
        assert_eq!(context["memories"][0]["content"], "session note");
    }

    #[test]
    fn optimize_is_idempotent_without_writes() {
        let handler = test_handler();
        for i in 0..5 {
            call(
                &handler,
                "store_memory",
                json!({"content": format!("note {i}")}),
            );
        }

        let first = call(&handler, "optimize_memory", json!({"aggressive": true}));
        let second = call(&handler, "optimize_memory", json!({"aggressive": true}));
        assert_eq!(first["success"], true);
        assert_eq!(first["stats"]["after"], second["stats"]["after"]);
    }

    #[test]
    fn search_results_cached_and_invalidated_on_write() {
        let handler = test_handler();
        call(&handler, "store_memory", json!({"content": "alpha beta"}));

        call(&handler, "search_memories", json!({"query": "alpha"}));
        let stats_before = handler.cache().stats();
        call(&handler, "search_memories", json!({"query": "alpha"}));
        let stats_after = handler.cache().stats();
        assert!(stats_after.hits > stats_before.hits);

        // A write clears search fingerprints; next search misses
        call(&handler, "store_memory", json!({"content": "alpha gamma"}));
        let found = call(&handler, "search_memories", json!({"query": "alpha"}));
        assert_eq!(found["count"], 2);
    }

    #[test]
    fn cancelled_context_aborts() {
        let handler = test_handler();
        let ctx = RequestContext::new();
        ctx.cancelled.store(true, std::sync::atomic::Ordering::Relaxed);
        let result = handler.handle_tool_call("search_memories", json!({"query": "x"}), &ctx);
        assert_eq!(result["error"]["code"], "Cancelled");
    }

    #[test]
    fn conversation_context_biases_ranking() {
        let handler = test_handler();

        // Seed a session with conversation about a specific file
        handler
            .store()
            .with_transaction(|conn| {
                let project = queries::get_or_create_project(conn, "demo", None)?;
                let session = queries::get_or_create_session(conn, project.id, "debug-session")?;
                queries::add_message(
                    conn,
                    session.id,
                    Role::User,
                    "Working on user-service.js authentication bug",
                    &Default::default(),
                )?;
                queries::add_message(
                    conn,
                    session.id,
                    Role::Assistant,
                    "The authenticate method has issues",
                    &Default::default(),
                )
            })
            .unwrap();

        call(
            &handler,
            "store_memory",
            json!({"content": "user-service.js wraps the authenticate method", "metadata": {"session": "debug-session"}}),
        );
        call(
            &handler,
            "store_memory",
            json!({"content": "authentication bug backlog", "metadata": {"session": "debug-session"}}),
        );

        let found = call(
            &handler,
            "search_memories",
            json!({
                "query": "Fix the authentication bug in UserService",
                "filters": {"session": "debug-session"}
            }),
        );
        assert_eq!(found["success"], true);
        assert_eq!(
            found["results"][0]["content"],
            "user-service.js wraps the authenticate method"
        );
        assert!(found["results"][0]["score"].as_f64().unwrap()
            > found["results"][1]["score"].as_f64().unwrap());
    }

    #[test]
    fn protocol_level_dispatch() {
        let handler = test_handler();
        let ctx = RequestContext::new();

        let init = handler
            .handle_request(
                McpRequest {
                    jsonrpc: "2.0".to_string(),
                    id: Some(json!(1)),
                    method: "initialize".to_string(),
                    params: json!({}),
                },
                &ctx,
            )
            .unwrap();
        assert_eq!(init.result.unwrap()["serverInfo"]["name"], "durandal-mcp");

        let unknown = handler
            .handle_request(
                McpRequest {
                    jsonrpc: "2.0".to_string(),
                    id: Some(json!(2)),
                    method: "resources/list".to_string(),
                    params: json!({}),
                },
                &ctx,
            )
            .unwrap();
        assert_eq!(unknown.error.unwrap().code, -32601);
    }
}
