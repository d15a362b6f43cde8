//! Built-in self-test
//!
//! Exercises the store, cache, analyzer, scorer, and dispatcher against a
//! scratch database in a temporary directory. Run with `--test`; prints a
//! summary with per-check durations on stderr and returns a process exit
//! code (0 all-pass, 1 otherwise).

use serde_json::json;
use std::time::Instant;

use crate::config::Config;
use crate::mcp::{McpHandler, McpRequest, RequestContext};
use crate::server::DurandalHandler;
use crate::storage::{queries, Store};
use crate::types::*;

struct CheckResult {
    name: &'static str,
    outcome: Result<(), String>,
    elapsed_ms: u128,
}

fn run_check(
    results: &mut Vec<CheckResult>,
    name: &'static str,
    check: impl FnOnce() -> Result<(), String>,
) {
    let started = Instant::now();
    let outcome = check();
    results.push(CheckResult {
        name,
        outcome,
        elapsed_ms: started.elapsed().as_millis(),
    });
}

fn expect(condition: bool, message: &str) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(message.to_string())
    }
}

/// Run all checks; returns the process exit code
pub fn run_self_test() -> i32 {
    eprintln!("durandal-mcp self-test");

    let scratch = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("FAIL could not create scratch directory: {}", e);
            return 1;
        }
    };
    let db_path = scratch.path().join("selftest.db").display().to_string();

    let mut results = Vec::new();

    let store = match Store::open(&db_path) {
        Ok(store) => {
            results.push(CheckResult {
                name: "connection",
                outcome: Ok(()),
                elapsed_ms: 0,
            });
            store
        }
        Err(e) => {
            eprintln!("FAIL connection: {}", e);
            return 1;
        }
    };

    let config = Config {
        database_path: db_path,
        ..Config::default()
    };
    let handler = DurandalHandler::new(store.clone(), &config);
    let ctx = RequestContext::new();

    run_check(&mut results, "schema", || {
        let tables = store
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = $1",
                &[json!("memories")],
            )
            .map_err(|e| e.to_string())?;
        expect(tables.row_count == 1, "memories table missing")?;
        for table in [
            "projects",
            "conversation_sessions",
            "conversation_messages",
            "extracted_artifacts",
        ] {
            let out = store
                .query(
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = $1",
                    &[json!(table)],
                )
                .map_err(|e| e.to_string())?;
            expect(out.row_count == 1, &format!("{} table missing", table))?;
        }
        let index = store
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'index' AND name = $1",
                &[json!("idx_memories_created_at")],
            )
            .map_err(|e| e.to_string())?;
        expect(index.row_count == 1, "created_at index missing")
    });

    run_check(&mut results, "round-trip", || {
        let content = "Shāo kǎo 烧烤 notes 🔥 with \"quotes\"\nand a second line";
        let mut metadata = MemoryMetadata {
            importance: 0.9,
            ..Default::default()
        };
        metadata.categories = vec!["food".to_string()];
        metadata
            .extra
            .insert("venue".to_string(), json!({"city": "São Paulo"}));

        let stored = store
            .with_transaction(|conn| queries::store_memory(conn, content, &metadata))
            .map_err(|e| e.to_string())?;
        let fetched = store
            .with_connection(|conn| queries::get_memory_by_id(conn, stored.id))
            .map_err(|e| e.to_string())?
            .ok_or("stored row not observed")?;

        expect(fetched.content == content, "content not byte-identical")?;
        expect(fetched.metadata == metadata, "metadata did not round-trip")
    });

    run_check(&mut results, "search", || {
        store
            .with_transaction(|conn| {
                let mut meta = MemoryMetadata::default();
                meta.project = Some("selftest".to_string());
                queries::store_memory(conn, "the cache layer fronts the store", &meta)?;
                queries::store_memory(conn, "unrelated grocery list", &MemoryMetadata::default())
            })
            .map_err(|e| e.to_string())?;

        let hits = store
            .with_connection(|conn| {
                queries::search_memories(
                    conn,
                    "CACHE LAYER",
                    &SearchFilters {
                        project: Some("selftest".to_string()),
                        ..Default::default()
                    },
                    10,
                )
            })
            .map_err(|e| e.to_string())?;
        expect(hits.len() == 1, "substring + filter search missed")
    });

    run_check(&mut results, "recent-ordering", || {
        let recent = store
            .with_connection(|conn| queries::get_recent_memories(conn, 10, None, None))
            .map_err(|e| e.to_string())?;
        expect(recent.len() >= 3, "expected at least three rows")?;
        let ordered = recent
            .windows(2)
            .all(|pair| pair[0].created_at >= pair[1].created_at);
        expect(ordered, "recent rows not newest-first")
    });

    run_check(&mut results, "cache", || {
        let result = handler.handle_tool_call(
            "search_memories",
            json!({"query": "cache layer"}),
            &ctx,
        );
        expect(result["success"] == true, "search failed")?;
        let misses_before = handler.cache().stats().misses;
        let hits_before = handler.cache().stats().hits;

        handler.handle_tool_call("search_memories", json!({"query": "cache layer"}), &ctx);
        let stats = handler.cache().stats();
        expect(stats.hits > hits_before, "repeat search did not hit the cache")?;

        // A write invalidates the fingerprint; the next search misses again
        handler.handle_tool_call(
            "store_memory",
            json!({"content": "cache invalidation probe"}),
            &ctx,
        );
        handler.handle_tool_call("search_memories", json!({"query": "cache layer"}), &ctx);
        let stats = handler.cache().stats();
        expect(stats.misses > misses_before, "write did not invalidate the cache")
    });

    run_check(&mut results, "dispatcher", || {
        let response = handler
            .handle_request(
                McpRequest {
                    jsonrpc: "2.0".to_string(),
                    id: Some(json!(1)),
                    method: "tools/list".to_string(),
                    params: json!({}),
                },
                &ctx,
            )
            .ok_or("tools/list produced no response")?;
        let tools = response
            .result
            .ok_or("tools/list had no result")?
            .get("tools")
            .and_then(|t| t.as_array())
            .map(|t| t.len())
            .unwrap_or(0);
        expect(tools == 4, "expected exactly four tools")
    });

    run_check(&mut results, "error-propagation", || {
        let result = handler.handle_tool_call("store_memory", json!({"content": null}), &ctx);
        expect(
            result["error"]["code"] == "ValidationError",
            "null content not rejected as ValidationError",
        )?;
        let result =
            handler.handle_tool_call("search_memories", json!({"query": "x", "limit": 101}), &ctx);
        expect(
            result["error"]["code"] == "ValidationError",
            "limit=101 not rejected",
        )
    });

    run_check(&mut results, "insert-rate", || {
        let count = 200;
        let started = Instant::now();
        store
            .with_transaction(|conn| {
                for i in 0..count {
                    queries::store_memory(
                        conn,
                        &format!("throughput probe {}", i),
                        &MemoryMetadata::default(),
                    )?;
                }
                Ok(())
            })
            .map_err(|e| e.to_string())?;
        let rate = count as f64 / started.elapsed().as_secs_f64();
        expect(
            rate >= 100.0,
            &format!("insert rate {:.0}/s below 100/s", rate),
        )
    });

    let mut failed = 0;
    for result in &results {
        match &result.outcome {
            Ok(()) => eprintln!("  PASS {:<20} {:>5} ms", result.name, result.elapsed_ms),
            Err(reason) => {
                failed += 1;
                eprintln!(
                    "  FAIL {:<20} {:>5} ms  {}",
                    result.name, result.elapsed_ms, reason
                );
            }
        }
    }
    eprintln!(
        "{} checks, {} failed",
        results.len(),
        failed
    );

    store.close();
    if failed == 0 {
        0
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_test_passes_on_scratch_store() {
        assert_eq!(run_self_test(), 0);
    }
}
