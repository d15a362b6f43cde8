//! Update availability checking
//!
//! Queries the npm registry for the latest published version on a
//! background thread, caches the answer under `~/.durandal-mcp/`, and
//! renders any notification on stderr only. Installs happen exclusively
//! when AUTO_UPDATE is set, with a validated version specifier and no
//! shell interpolation.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::UpdateConfig;
use crate::error::{DurandalError, Result};

/// Published package name on the npm registry
pub const NPM_PACKAGE: &str = "durandal-mcp";

/// Registry request timeout
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

static SEMVER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+$").unwrap());

/// On-disk record of the last registry check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCacheEntry {
    pub checked_at: DateTime<Utc>,
    pub latest: String,
}

/// Location of the update cache file
pub fn cache_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".durandal-mcp").join("update-cache.json"))
}

/// A version specifier is either an exact semver triple or `latest`
pub fn validate_specifier(spec: &str) -> bool {
    spec == "latest" || SEMVER_RE.is_match(spec)
}

/// Strict triple comparison; malformed versions never count as newer
pub fn is_newer(candidate: &str, current: &str) -> bool {
    fn triple(v: &str) -> Option<(u64, u64, u64)> {
        let mut parts = v.trim().trim_start_matches('v').splitn(3, '.');
        Some((
            parts.next()?.parse().ok()?,
            parts.next()?.parse().ok()?,
            parts.next()?.parse().ok()?,
        ))
    }
    match (triple(candidate), triple(current)) {
        (Some(a), Some(b)) => a > b,
        _ => false,
    }
}

fn read_cache() -> Option<UpdateCacheEntry> {
    let path = cache_path()?;
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

fn write_cache(entry: &UpdateCacheEntry) {
    let Some(path) = cache_path() else { return };
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Ok(raw) = serde_json::to_string_pretty(entry) {
        let _ = std::fs::write(path, raw);
    }
}

async fn fetch_latest() -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| DurandalError::Internal(e.to_string()))?;
    let url = format!("https://registry.npmjs.org/{}", NPM_PACKAGE);
    let body: serde_json::Value = client
        .get(&url)
        .send()
        .await
        .map_err(|e| DurandalError::Internal(e.to_string()))?
        .json()
        .await
        .map_err(|e| DurandalError::Internal(e.to_string()))?;

    body.get("dist-tags")
        .and_then(|t| t.get("latest"))
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| DurandalError::Internal("registry response missing dist-tags.latest".into()))
}

/// Resolve the latest version, consulting the cache before the network
fn resolve_latest(interval: Duration) -> Result<String> {
    if let Some(entry) = read_cache() {
        let age = Utc::now() - entry.checked_at;
        if age.to_std().map(|age| age < interval).unwrap_or(false) {
            return Ok(entry.latest);
        }
    }

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| DurandalError::Internal(e.to_string()))?;
    let latest = runtime.block_on(fetch_latest())?;
    write_cache(&UpdateCacheEntry {
        checked_at: Utc::now(),
        latest: latest.clone(),
    });
    Ok(latest)
}

/// Install a version via npm, without a shell
fn run_install(spec: &str) -> Result<()> {
    if !validate_specifier(spec) {
        return Err(DurandalError::validation(
            "version",
            "must match MAJOR.MINOR.PATCH or be 'latest'",
        ));
    }

    let status = std::process::Command::new("npm")
        .args(["install", "-g", &format!("{}@{}", NPM_PACKAGE, spec)])
        .status()
        .map_err(|e| DurandalError::Internal(format!("npm not runnable: {}", e)))?;
    if !status.success() {
        return Err(DurandalError::Internal(format!(
            "npm install exited with {}",
            status
        )));
    }
    Ok(())
}

/// Run the update check on a background thread
pub fn spawn_check(config: &UpdateConfig) {
    if !config.enabled {
        return;
    }
    let config = config.clone();

    std::thread::spawn(move || {
        let current = env!("CARGO_PKG_VERSION");
        let latest = match resolve_latest(config.interval) {
            Ok(latest) => latest,
            Err(e) => {
                tracing::debug!(error = %e, "update check failed");
                return;
            }
        };

        if !is_newer(&latest, current) {
            return;
        }

        if config.notify {
            tracing::warn!(
                current,
                latest = latest.as_str(),
                "update available: run `npm install -g {}@{}`",
                NPM_PACKAGE,
                latest
            );
        }

        if config.auto_update {
            match run_install(&latest) {
                Ok(()) => tracing::info!(version = latest.as_str(), "auto-update installed"),
                Err(e) => tracing::error!(error = %e, "auto-update failed"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specifier_validation() {
        assert!(validate_specifier("latest"));
        assert!(validate_specifier("3.0.0"));
        assert!(validate_specifier("10.20.30"));
        assert!(!validate_specifier("3.0"));
        assert!(!validate_specifier("3.0.0-beta"));
        assert!(!validate_specifier("3.0.0; rm -rf /"));
        assert!(!validate_specifier("$(whoami)"));
    }

    #[test]
    fn version_comparison() {
        assert!(is_newer("3.0.1", "3.0.0"));
        assert!(is_newer("4.0.0", "3.9.9"));
        assert!(!is_newer("3.0.0", "3.0.0"));
        assert!(!is_newer("2.9.9", "3.0.0"));
        assert!(!is_newer("not-a-version", "3.0.0"));
    }

    #[test]
    fn cache_entry_round_trips() {
        let entry = UpdateCacheEntry {
            checked_at: Utc::now(),
            latest: "3.1.0".to_string(),
        };
        let raw = serde_json::to_string(&entry).unwrap();
        let back: UpdateCacheEntry = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.latest, "3.1.0");
    }
}
