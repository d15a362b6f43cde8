//! Relevance scorer
//!
//! Combines a `QueryAnalysis` with per-memory derived features into a
//! weighted total with a per-subscore breakdown and a short reasoning
//! string. Malformed or empty inputs score zero instead of failing; the
//! scorer runs over cached and batched candidates and must never abort a
//! batch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::query::{QueryAnalysis, QueryType};
use crate::analysis::query::{extract_classes, extract_files, extract_functions, Intent};
use crate::types::{Memory, SearchHit};

/// Weight applied to each subscore when summing the total
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub explicit: f32,
    pub content: f32,
    pub conversation: f32,
    pub structure: f32,
    pub intent: f32,
    pub query_type: f32,
    pub temporal: f32,
    pub recent_activity: f32,
    pub user_preference: f32,
    pub importance: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            explicit: 3.0,
            content: 2.0,
            conversation: 2.5,
            structure: 1.8,
            intent: 1.5,
            query_type: 1.4,
            temporal: 1.3,
            recent_activity: 1.2,
            user_preference: 0.8,
            importance: 1.0,
        }
    }
}

/// Scorer configuration
#[derive(Debug, Clone)]
pub struct ScorerConfig {
    pub weights: ScoreWeights,
    /// Ranked list length
    pub max_results: usize,
    /// Items below this importance are excluded before scoring
    pub min_importance: f32,
    /// Extensions treated as a user preference signal
    pub preferred_extensions: Vec<String>,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            max_results: 10,
            min_importance: 0.0,
            preferred_extensions: vec!["js".to_string(), "ts".to_string(), "py".to_string()],
        }
    }
}

/// Features derived from a stored item
///
/// Every field is optional or defaultable; the scorer tolerates absence
/// uniformly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemFeatures {
    pub file_name: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
    pub extension: Option<String>,
    #[serde(default)]
    pub words: Vec<String>,
    #[serde(default)]
    pub functions: Vec<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub is_test_file: bool,
    #[serde(default)]
    pub is_server: bool,
    #[serde(default)]
    pub has_debug_output: bool,
    pub modified: Option<DateTime<Utc>>,
    /// Integer importance on a 0-10 scale
    #[serde(default)]
    pub importance: i64,
}

const MAX_FEATURE_WORDS: usize = 200;

fn language_of(extension: &str) -> Option<&'static str> {
    match extension {
        "js" => Some("javascript"),
        "ts" => Some("typescript"),
        "py" => Some("python"),
        "sql" => Some("sql"),
        "sh" | "bat" => Some("shell"),
        "html" | "css" => Some("markup"),
        "md" | "txt" => Some("prose"),
        "json" | "yml" | "yaml" | "env" => Some("config"),
        _ => None,
    }
}

impl ItemFeatures {
    /// Derive scoring features from a stored memory
    pub fn from_memory(memory: &Memory) -> Self {
        let content_lower = memory.content.to_lowercase();

        let file_name = extract_files(&memory.content).into_iter().next().or_else(|| {
            memory
                .metadata
                .extra
                .get("file")
                .or_else(|| memory.metadata.extra.get("filename"))
                .or_else(|| memory.metadata.extra.get("path"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_lowercase())
        });
        let extension = file_name
            .as_ref()
            .and_then(|f| f.rsplit_once('.'))
            .map(|(_, ext)| ext.to_string());
        let language = extension
            .as_deref()
            .and_then(language_of)
            .map(String::from);

        let mut words: Vec<String> = content_lower
            .split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
            .filter(|w| w.len() > 1)
            .map(String::from)
            .collect();
        words.extend(memory.metadata.keywords.iter().map(|k| k.to_lowercase()));
        words.sort();
        words.dedup();
        words.truncate(MAX_FEATURE_WORDS);

        let category = memory.metadata.categories.first().map(|c| c.to_lowercase());
        let is_test_file = memory
            .metadata
            .categories
            .iter()
            .any(|c| c.eq_ignore_ascii_case("test"))
            || file_name
                .as_deref()
                .map(|f| f.contains("test") || f.contains("spec"))
                .unwrap_or(false);
        let is_server = content_lower.contains("express")
            || content_lower.contains("server")
            || content_lower.contains("listen(");
        let has_debug_output = content_lower.contains("console.log")
            || content_lower.contains("debug")
            || content_lower.contains("stack trace")
            || content_lower.contains("traceback");

        Self {
            file_name,
            category,
            language,
            extension,
            words,
            functions: extract_functions(&memory.content),
            classes: extract_classes(&memory.content),
            is_test_file,
            is_server,
            has_debug_output,
            modified: Some(memory.created_at),
            importance: (memory.metadata.importance.clamp(0.0, 1.0) * 10.0).round() as i64,
        }
    }
}

/// Per-subscore breakdown of a total
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub explicit_match: f32,
    pub content_match: f32,
    pub intent_match: f32,
    pub structure_match: f32,
    pub recent_activity: f32,
    pub user_preference: f32,
    pub importance: f32,
    pub conversation_relevance: f32,
    pub query_type_match: f32,
    pub temporal_relevance: f32,
}

/// A scored candidate with its explanation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMemory {
    pub memory: Memory,
    pub total: f32,
    pub breakdown: ScoreBreakdown,
    pub reasoning: String,
}

/// Weighted scorer over analyzer output and item features
#[derive(Debug, Clone, Default)]
pub struct RelevanceScorer {
    config: ScorerConfig,
}

impl RelevanceScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ScorerConfig) -> Self {
        Self { config }
    }

    pub fn max_results(&self) -> usize {
        self.config.max_results
    }

    /// Score one item; never fails, malformed input scores zero
    pub fn score(&self, analysis: &QueryAnalysis, features: &ItemFeatures) -> ScoreBreakdown {
        let mut breakdown = ScoreBreakdown {
            explicit_match: self.explicit_match(analysis, features),
            content_match: self.content_match(analysis, features),
            intent_match: self.intent_match(analysis, features),
            structure_match: self.structure_match(analysis, features),
            recent_activity: Self::recency_bonus(features.modified, &[(1, 3.0), (3, 2.0), (7, 1.0)]),
            user_preference: self.user_preference(features),
            importance: features.importance.clamp(0, 10) as f32 * 0.1,
            conversation_relevance: self.conversation_relevance(analysis, features),
            query_type_match: self.query_type_match(analysis, features),
            temporal_relevance: 0.0,
        };
        breakdown.temporal_relevance = self.temporal_relevance(analysis, features);
        breakdown
    }

    /// Weighted total of a breakdown
    pub fn total(&self, breakdown: &ScoreBreakdown) -> f32 {
        let w = &self.config.weights;
        breakdown.explicit_match * w.explicit
            + breakdown.content_match * w.content
            + breakdown.conversation_relevance * w.conversation
            + breakdown.structure_match * w.structure
            + breakdown.intent_match * w.intent
            + breakdown.query_type_match * w.query_type
            + breakdown.temporal_relevance * w.temporal
            + breakdown.recent_activity * w.recent_activity
            + breakdown.user_preference * w.user_preference
            + breakdown.importance * w.importance
    }

    /// Rank candidates: filter by minimum importance, score, sort, bound
    pub fn rank(&self, analysis: &QueryAnalysis, candidates: Vec<Memory>) -> Vec<ScoredMemory> {
        let mut scored: Vec<ScoredMemory> = candidates
            .into_iter()
            .filter(|m| m.metadata.importance >= self.config.min_importance)
            .map(|memory| {
                let features = ItemFeatures::from_memory(&memory);
                let breakdown = self.score(analysis, &features);
                let total = self.total(&breakdown);
                let reasoning = self.reasoning(&breakdown);
                ScoredMemory {
                    memory,
                    total,
                    breakdown,
                    reasoning,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.total
                .partial_cmp(&a.total)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.memory.created_at.cmp(&a.memory.created_at))
                .then(b.memory.id.cmp(&a.memory.id))
        });
        scored.truncate(self.config.max_results);
        scored
    }

    /// Rank and shape into search hits
    pub fn rank_to_hits(&self, analysis: &QueryAnalysis, candidates: Vec<Memory>) -> Vec<SearchHit> {
        self.rank(analysis, candidates)
            .into_iter()
            .map(|scored| SearchHit {
                memory: scored.memory,
                score: scored.total,
                reasoning: scored.reasoning,
            })
            .collect()
    }

    // Filename/path contains an explicit file token. Cap 15.
    fn explicit_match(&self, analysis: &QueryAnalysis, features: &ItemFeatures) -> f32 {
        let Some(file_name) = features.file_name.as_deref() else {
            return 0.0;
        };
        let mut score: f32 = 0.0;
        for token in &analysis.explicit_files {
            if file_name.contains(token.as_str()) || token.contains(file_name) {
                score += 8.0;
            }
        }
        score.min(15.0)
    }

    // Token-set intersection with keywords; partial matches count half. Cap 20.
    fn content_match(&self, analysis: &QueryAnalysis, features: &ItemFeatures) -> f32 {
        if features.words.is_empty() {
            return 0.0;
        }
        let mut score: f32 = 0.0;
        for keyword in &analysis.keywords {
            if features.words.iter().any(|w| w == keyword) {
                score += 2.0;
            } else if features
                .words
                .iter()
                .any(|w| w.contains(keyword.as_str()) || keyword.contains(w.as_str()))
            {
                score += 1.0;
            }
        }
        score.min(20.0)
    }

    // Per-intent bonuses against categories and feature flags. Cap 15.
    fn intent_match(&self, analysis: &QueryAnalysis, features: &ItemFeatures) -> f32 {
        let category = features.category.as_deref().unwrap_or("");
        let extension = features.extension.as_deref().unwrap_or("");
        let mut score: f32 = 0.0;

        for intent in &analysis.intents {
            score += match intent {
                Intent::Config => {
                    if category == "config" || matches!(extension, "env" | "yml" | "yaml" | "json") {
                        5.0
                    } else {
                        0.0
                    }
                }
                Intent::Test => {
                    if features.is_test_file {
                        4.0
                    } else {
                        0.0
                    }
                }
                Intent::Documentation => {
                    if category == "docs" || extension == "md" {
                        4.0
                    } else {
                        0.0
                    }
                }
                Intent::Error => {
                    if features.has_debug_output {
                        3.0
                    } else {
                        0.0
                    }
                }
                Intent::Database => {
                    if category == "database" || extension == "sql" {
                        4.0
                    } else {
                        0.0
                    }
                }
                Intent::Api => {
                    if features.is_server {
                        3.0
                    } else {
                        0.0
                    }
                }
                Intent::Auth => {
                    if features.words.iter().any(|w| w.starts_with("auth"))
                        || features.functions.iter().any(|f| f.starts_with("auth"))
                    {
                        3.0
                    } else {
                        0.0
                    }
                }
                Intent::Implementation => {
                    if features.language.is_some() && category == "code" {
                        2.0
                    } else {
                        0.0
                    }
                }
                Intent::Ui => {
                    if matches!(extension, "css" | "html") {
                        3.0
                    } else {
                        0.0
                    }
                }
            };
        }
        score.min(15.0)
    }

    // Function/class name contains a mentioned identifier. Cap 18.
    fn structure_match(&self, analysis: &QueryAnalysis, features: &ItemFeatures) -> f32 {
        let mut score: f32 = 0.0;
        for wanted in &analysis.functions {
            let wanted = wanted.to_lowercase();
            if features
                .functions
                .iter()
                .any(|f| f.to_lowercase().contains(&wanted))
            {
                score += 6.0;
            }
        }
        for wanted in &analysis.classes {
            let wanted = wanted.to_lowercase();
            if features
                .classes
                .iter()
                .any(|c| c.to_lowercase().contains(&wanted))
            {
                score += 6.0;
            }
        }
        score.min(18.0)
    }

    fn recency_bonus(modified: Option<DateTime<Utc>>, tiers: &[(i64, f32)]) -> f32 {
        let Some(modified) = modified else {
            return 0.0;
        };
        let age_days = (Utc::now() - modified).num_days();
        for (days, bonus) in tiers {
            if age_days < *days {
                return *bonus;
            }
        }
        0.0
    }

    fn user_preference(&self, features: &ItemFeatures) -> f32 {
        let mut score: f32 = 0.0;
        if let Some(ext) = features.extension.as_deref() {
            if self.config.preferred_extensions.iter().any(|p| p == ext) {
                score += 2.0;
            }
        }
        if features.importance >= 7 {
            score += 1.0;
        }
        score
    }

    // Recently mentioned files, topics, code elements, error context. Cap 20.
    fn conversation_relevance(&self, analysis: &QueryAnalysis, features: &ItemFeatures) -> f32 {
        let mut score: f32 = 0.0;

        if let Some(file_name) = features.file_name.as_deref() {
            if let Some(mention) = analysis
                .recently_mentioned_files
                .iter()
                .find(|m| file_name.contains(m.filename.as_str()) || m.filename.contains(file_name))
            {
                score += 8.0 + 2.0 * (mention.mentions.saturating_sub(1)) as f32;
            }
        }

        for topic in &analysis.conversation_context.topics {
            if features.words.iter().any(|w| w == topic)
                || features
                    .file_name
                    .as_deref()
                    .map(|f| f.contains(topic.as_str()))
                    .unwrap_or(false)
            {
                score += 1.0;
            }
        }

        for element in &analysis.conversation_context.code_elements {
            let element = element.to_lowercase();
            if features
                .functions
                .iter()
                .chain(features.classes.iter())
                .any(|name| name.to_lowercase() == element)
            {
                score += 4.0;
            }
        }

        if analysis.conversation_context.has_errors && features.category.as_deref() == Some("code")
        {
            score += 3.0;
        }

        score.min(20.0)
    }

    // Category-specific bonus per query type.
    fn query_type_match(&self, analysis: &QueryAnalysis, features: &ItemFeatures) -> f32 {
        let category = features.category.as_deref().unwrap_or("");
        let extension = features.extension.as_deref().unwrap_or("");
        match analysis.query_type {
            QueryType::Testing => {
                if features.is_test_file {
                    6.0
                } else {
                    0.0
                }
            }
            QueryType::Configuration => {
                if category == "config" || matches!(extension, "env" | "yml" | "yaml" | "json") {
                    6.0
                } else {
                    0.0
                }
            }
            QueryType::Documentation => {
                if category == "docs" || extension == "md" {
                    6.0
                } else {
                    0.0
                }
            }
            QueryType::Debugging => {
                if features.has_debug_output {
                    5.0
                } else {
                    0.0
                }
            }
            QueryType::Development => {
                if category == "code" && features.importance >= 5 {
                    4.0
                } else {
                    0.0
                }
            }
            QueryType::CodeSpecific => {
                if !features.functions.is_empty() || !features.classes.is_empty() {
                    4.0
                } else {
                    0.0
                }
            }
            QueryType::FileSpecific => {
                if features.file_name.is_some() {
                    3.0
                } else {
                    0.0
                }
            }
            QueryType::General => 0.0,
        }
    }

    // Recent-mention score plus modified-time bonuses.
    fn temporal_relevance(&self, analysis: &QueryAnalysis, features: &ItemFeatures) -> f32 {
        let mut score: f32 = 0.0;
        if let Some(file_name) = features.file_name.as_deref() {
            if let Some(mention) = analysis
                .recently_mentioned_files
                .iter()
                .find(|m| file_name.contains(m.filename.as_str()) || m.filename.contains(file_name))
            {
                score += (6.0 - mention.last_mention_index as f32).max(0.0);
            }
        }
        score += Self::recency_bonus(features.modified, &[(1, 2.0), (3, 1.0)]);
        score
    }

    /// Short explanation derived from which subscores crossed thresholds
    fn reasoning(&self, breakdown: &ScoreBreakdown) -> String {
        let mut reasons = Vec::new();
        if breakdown.explicit_match > 0.0 {
            reasons.push("matches a file named in the query");
        }
        if breakdown.conversation_relevance >= 8.0 {
            reasons.push("recently discussed in conversation");
        } else if breakdown.conversation_relevance > 0.0 {
            reasons.push("related to the conversation context");
        }
        if breakdown.structure_match > 0.0 {
            reasons.push("mentions a referenced function or class");
        }
        if breakdown.content_match >= 6.0 {
            reasons.push("strong keyword overlap");
        } else if breakdown.content_match > 0.0 {
            reasons.push("partial keyword overlap");
        }
        if breakdown.intent_match > 0.0 {
            reasons.push("aligned with the query intent");
        }
        if breakdown.query_type_match > 0.0 {
            reasons.push("category fits the query type");
        }
        if breakdown.recent_activity > 0.0 {
            reasons.push("recently created");
        }
        if reasons.is_empty() {
            reasons.push("weak overall signal");
        }
        reasons.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::query::analyze;
    use crate::analysis::query::HistoryMessage;
    use crate::types::{MemoryMetadata, Role};

    fn memory(id: i64, content: &str, importance: f32) -> Memory {
        Memory {
            id,
            content: content.to_string(),
            metadata: MemoryMetadata {
                importance,
                ..Default::default()
            },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn malformed_input_scores_zero() {
        let scorer = RelevanceScorer::new();
        let analysis = analyze("", &[]);
        let breakdown = scorer.score(&analysis, &ItemFeatures::default());
        assert_eq!(scorer.total(&breakdown), 0.0);
    }

    #[test]
    fn empty_analysis_against_real_features_is_finite() {
        let scorer = RelevanceScorer::new();
        let analysis = analyze("", &[]);
        let features = ItemFeatures::from_memory(&memory(1, "some note about tokens", 0.5));
        let breakdown = scorer.score(&analysis, &features);
        let total = scorer.total(&breakdown);
        assert!(total.is_finite());
        assert_eq!(breakdown.explicit_match, 0.0);
        assert_eq!(breakdown.structure_match, 0.0);
    }

    #[test]
    fn explicit_filename_beats_pure_keyword_match() {
        let scorer = RelevanceScorer::new();
        let analysis = analyze("update user-service.js token handling", &[]);

        let by_name = ItemFeatures::from_memory(&memory(
            1,
            "notes about user-service.js internals",
            0.5,
        ));
        let by_keyword = ItemFeatures::from_memory(&memory(2, "token handling strategy", 0.5));

        let name_total = scorer.total(&scorer.score(&analysis, &by_name));
        let keyword_total = scorer.total(&scorer.score(&analysis, &by_keyword));
        assert!(name_total > keyword_total);
    }

    #[test]
    fn recent_conversation_mention_beats_stale_importance() {
        let scorer = RelevanceScorer::new();
        let history = vec![HistoryMessage {
            role: Role::User,
            content: "still fighting with payment-flow.ts".to_string(),
        }];
        let analysis = analyze("where were we", &history);

        let mentioned = ItemFeatures::from_memory(&memory(1, "payment-flow.ts refactor plan", 0.3));
        let important = ItemFeatures::from_memory(&memory(2, "style guide", 1.0));

        let mentioned_total = scorer.total(&scorer.score(&analysis, &mentioned));
        let important_total = scorer.total(&scorer.score(&analysis, &important));
        assert!(mentioned_total > important_total);
    }

    #[test]
    fn rank_filters_low_importance_and_bounds_results() {
        let scorer = RelevanceScorer::with_config(ScorerConfig {
            min_importance: 0.5,
            max_results: 2,
            ..Default::default()
        });
        let analysis = analyze("token", &[]);
        let candidates = vec![
            memory(1, "token a", 0.9),
            memory(2, "token b", 0.8),
            memory(3, "token c", 0.7),
            memory(4, "token low", 0.1),
        ];

        let ranked = scorer.rank(&analysis, candidates);
        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|s| s.memory.metadata.importance >= 0.5));
    }

    #[test]
    fn ties_break_by_created_at_desc() {
        let scorer = RelevanceScorer::new();
        let analysis = analyze("zzz-no-overlap", &[]);
        let older = Memory {
            created_at: Utc::now() - chrono::Duration::days(30),
            ..memory(1, "alpha", 0.5)
        };
        let newer = Memory {
            created_at: Utc::now() - chrono::Duration::days(29),
            ..memory(2, "beta", 0.5)
        };

        let ranked = scorer.rank(&analysis, vec![older, newer]);
        assert_eq!(ranked[0].memory.id, 2);
    }

    #[test]
    fn subscores_respect_caps() {
        let scorer = RelevanceScorer::new();
        let many_files = (0..10)
            .map(|i| format!("file{i}.js"))
            .collect::<Vec<_>>()
            .join(" ");
        let analysis = analyze(&format!("look at {many_files}"), &[]);
        let features = ItemFeatures {
            file_name: Some("file0.js file1.js file2.js".to_string()),
            ..Default::default()
        };
        let breakdown = scorer.score(&analysis, &features);
        assert!(breakdown.explicit_match <= 15.0);
    }

    #[test]
    fn reasoning_mentions_dominant_signals() {
        let scorer = RelevanceScorer::new();
        let analysis = analyze("fix auth in user-service.js", &[]);
        let ranked = scorer.rank(
            &analysis,
            vec![memory(1, "user-service.js auth notes", 0.9)],
        );
        assert!(ranked[0].reasoning.contains("file named in the query"));
    }
}
