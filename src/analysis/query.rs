//! Query analyzer
//!
//! Turns a free-text query plus recent conversation history into a
//! structured `QueryAnalysis`: explicit file references, code identifiers,
//! intents, keywords, conversation context, and an eight-way query type.
//! Pure function of its inputs: no clock, no I/O, no randomness.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::types::Role;

/// Messages in the analysis window are oldest-first; the last element is
/// the most recent.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

impl From<&crate::types::Message> for HistoryMessage {
    fn from(msg: &crate::types::Message) -> Self {
        Self {
            role: msg.role,
            content: msg.content.clone(),
        }
    }
}

/// Coarse intent labels inferred from query wording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Config,
    Documentation,
    Test,
    Error,
    Implementation,
    Database,
    Api,
    Ui,
    Auth,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Config => "config",
            Intent::Documentation => "documentation",
            Intent::Test => "test",
            Intent::Error => "error",
            Intent::Implementation => "implementation",
            Intent::Database => "database",
            Intent::Api => "api",
            Intent::Ui => "ui",
            Intent::Auth => "auth",
        }
    }
}

/// Query type steering category-level scoring bonuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    #[default]
    General,
    Debugging,
    Testing,
    Configuration,
    Documentation,
    Development,
    CodeSpecific,
    FileSpecific,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::General => "general",
            QueryType::Debugging => "debugging",
            QueryType::Testing => "testing",
            QueryType::Configuration => "configuration",
            QueryType::Documentation => "documentation",
            QueryType::Development => "development",
            QueryType::CodeSpecific => "code_specific",
            QueryType::FileSpecific => "file_specific",
        }
    }
}

/// Context distilled from up to the last 5 messages
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConversationContext {
    pub topics: Vec<String>,
    pub mentioned_files: Vec<String>,
    pub code_elements: Vec<String>,
    pub errors: Vec<String>,
    pub tasks: Vec<String>,
    pub has_errors: bool,
    pub has_tasks: bool,
}

/// A file mentioned in recent conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMention {
    pub filename: String,
    pub mentions: usize,
    /// Messages back from the most recent (0 = most recent message)
    pub last_mention_index: usize,
}

/// Structured output of the analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub explicit_files: Vec<String>,
    pub functions: Vec<String>,
    pub classes: Vec<String>,
    pub intents: Vec<Intent>,
    pub keywords: Vec<String>,
    pub conversation_context: ConversationContext,
    pub recently_mentioned_files: Vec<FileMention>,
    pub query_type: QueryType,
    pub confidence: f32,
}

const MAX_CONTEXT_MESSAGES: usize = 5;
const MAX_FILE_MENTION_MESSAGES: usize = 10;
const MAX_TOPICS: usize = 20;
const MAX_CODE_ELEMENTS: usize = 15;
const MAX_RECENT_FILES: usize = 5;

/// Well-known dotfiles recognized without an extension
const DOTFILES: &[&str] = &[
    ".env",
    ".gitignore",
    ".dockerignore",
    ".npmrc",
    ".babelrc",
    ".eslintrc",
];

static FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[\w-]+(?:[./][\w-]+)*\.(?:js|ts|py|json|md|txt|html|css|yml|yaml|sql|sh|bat|env)\b")
        .unwrap()
});

static FUNCTION_DECL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bfunction\s+([A-Za-z_]\w*)").unwrap());

static CALL_SITE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Za-z_]\w*)\s*\(").unwrap());

static METHOD_CALL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.([A-Za-z_]\w*)\s*\(").unwrap());

static CLASS_DECL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bclass\s+([A-Z]\w*)").unwrap());

static NEW_INSTANCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bnew\s+([A-Z]\w*)").unwrap());

static PROTOTYPE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Z]\w*)\.prototype").unwrap());

static PASCAL_CASE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z][a-z0-9]+(?:[A-Z][a-z0-9]*)+)\b").unwrap());

/// Language keywords that look like call sites but are not functions
const CALL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "function", "return", "new", "class", "do", "else",
    "try", "await",
];

/// Nouns mapped to the function name they usually refer to
const NOUN_TO_VERB: &[(&str, &str)] = &[
    ("authentication", "authenticate"),
    ("validation", "validate"),
    ("connection", "connect"),
    ("registration", "register"),
    ("authorization", "authorize"),
    ("initialization", "initialize"),
];

/// Fixed closed stopword list applied to keywords and topics
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "could", "did", "do", "does",
    "for", "from", "had", "has", "have", "how", "i", "in", "is", "it", "its", "me", "my", "not",
    "of", "on", "or", "our", "should", "that", "the", "their", "them", "then", "there", "these",
    "they", "this", "to", "up", "was", "we", "were", "what", "when", "where", "which", "who",
    "will", "with", "would", "you", "your",
];

const AMBIGUOUS_OPENERS: &[&str] = &[
    "show me",
    "tell me about",
    "what is",
    "how is",
    "where is",
    "help me with",
];

const ACTION_VERBS: &[&str] = &[
    "create", "add", "implement", "build", "update", "fix", "debug", "test",
];

const ERROR_WORDS: &[&str] = &[
    "error", "errors", "bug", "bugs", "fix", "broken", "crash", "crashes", "exception", "fail",
    "failing", "failed", "failure", "issue", "debug", "debugging",
];

const TEST_WORDS: &[&str] = &["test", "tests", "testing", "spec", "specs", "coverage"];

const DEBUG_WORDS: &[&str] = &["debug", "debugging", "troubleshoot", "diagnose"];

const BUILD_WORDS: &[&str] = &[
    "build", "building", "implement", "implementation", "develop", "feature",
];

const CONFIG_WORDS: &[&str] = &[
    "config", "configuration", "configure", "settings", "setup", "environment",
];

const UPDATE_WORDS: &[&str] = &["update", "change", "modify", "edit", "set"];

const TASK_VERBS: &[&str] = &[
    "implement", "fix", "add", "create", "update", "build", "write", "refactor", "test", "working",
];

fn intent_words(intent: Intent) -> &'static [&'static str] {
    match intent {
        Intent::Config => &["config", "configuration", "settings", "setup", "env", "environment"],
        Intent::Documentation => &["docs", "documentation", "readme", "guide", "comment"],
        Intent::Test => &["test", "tests", "testing", "spec", "coverage"],
        Intent::Error => ERROR_WORDS,
        Intent::Implementation => &[
            "implement",
            "implementation",
            "build",
            "create",
            "add",
            "develop",
            "feature",
        ],
        Intent::Database => &["database", "db", "sql", "query", "schema", "migration", "table"],
        Intent::Api => &["api", "endpoint", "route", "rest", "request", "response"],
        Intent::Ui => &["ui", "frontend", "interface", "component", "layout", "css"],
        Intent::Auth => &["auth", "authentication", "login", "authorization", "token", "jwt", "password"],
    }
}

const ALL_INTENTS: &[Intent] = &[
    Intent::Config,
    Intent::Documentation,
    Intent::Test,
    Intent::Error,
    Intent::Implementation,
    Intent::Database,
    Intent::Api,
    Intent::Ui,
    Intent::Auth,
];

/// Analyze a query against its recent conversation history
pub fn analyze(query: &str, history: &[HistoryMessage]) -> QueryAnalysis {
    let query_lower = query.to_lowercase();
    let words = tokenize(&query_lower);

    let explicit_files = extract_files(query);
    let functions = extract_functions(query);
    let classes = extract_classes(query);
    let intents = detect_intents(&words);
    let keywords = keywords_of(&words);

    let conversation_context = build_context(history);
    let recently_mentioned_files = recent_file_mentions(history);

    let query_type = classify(
        &query_lower,
        &words,
        &intents,
        &explicit_files,
        &functions,
        &classes,
    );

    let confidence = confidence_of(
        &explicit_files,
        &functions,
        &classes,
        &intents,
        &keywords,
        &recently_mentioned_files,
        &conversation_context,
    );

    QueryAnalysis {
        explicit_files,
        functions,
        classes,
        intents,
        keywords,
        conversation_context,
        recently_mentioned_files,
        query_type,
        confidence,
    }
}

/// Lowercase words with punctuation stripped
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Extract lowercase filenames with recognized extensions plus dotfiles
pub fn extract_files(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for cap in FILE_RE.find_iter(text) {
        let file = cap.as_str().to_lowercase();
        if seen.insert(file.clone()) {
            files.push(file);
        }
    }

    let lower = text.to_lowercase();
    for dotfile in DOTFILES {
        if lower.contains(dotfile) && seen.insert((*dotfile).to_string()) {
            files.push((*dotfile).to_string());
        }
    }

    files
}

/// Identifiers that suggest a function reference
pub fn extract_functions(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut functions = Vec::new();
    let mut push = |name: &str| {
        let name = name.to_string();
        if !CALL_KEYWORDS.contains(&name.as_str()) && seen.insert(name.clone()) {
            functions.push(name);
        }
    };

    for cap in FUNCTION_DECL_RE.captures_iter(text) {
        push(&cap[1]);
    }
    for cap in METHOD_CALL_RE.captures_iter(text) {
        push(&cap[1]);
    }
    for cap in CALL_SITE_RE.captures_iter(text) {
        push(&cap[1]);
    }
    for word in tokenize(&text.to_lowercase()) {
        if let Some((_, verb)) = NOUN_TO_VERB.iter().find(|(noun, _)| *noun == word) {
            push(verb);
        }
    }

    functions
}

/// Identifiers that suggest a class reference
pub fn extract_classes(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut classes = Vec::new();
    let mut push = |name: &str| {
        let name = name.to_string();
        if seen.insert(name.clone()) {
            classes.push(name);
        }
    };

    for cap in CLASS_DECL_RE.captures_iter(text) {
        push(&cap[1]);
    }
    for cap in NEW_INSTANCE_RE.captures_iter(text) {
        push(&cap[1]);
    }
    for cap in PROTOTYPE_RE.captures_iter(text) {
        push(&cap[1]);
    }
    for cap in PASCAL_CASE_RE.captures_iter(text) {
        push(&cap[1]);
    }

    classes
}

fn detect_intents(words: &[String]) -> Vec<Intent> {
    let set: HashSet<&str> = words.iter().map(|w| w.as_str()).collect();
    ALL_INTENTS
        .iter()
        .copied()
        .filter(|intent| intent_words(*intent).iter().any(|w| set.contains(w)))
        .collect()
}

/// Content words after stopword removal, order-preserving and deduplicated
fn keywords_of(words: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    words
        .iter()
        .filter(|w| w.len() > 1 && !STOPWORDS.contains(&w.as_str()))
        .filter(|w| seen.insert((*w).clone()))
        .cloned()
        .collect()
}

/// Short excerpt around the first occurrence of any listed word
fn excerpt_containing(content: &str, needles: &[&str]) -> Option<String> {
    let lower = content.to_lowercase();
    for needle in needles {
        if let Some(pos) = lower.find(needle) {
            // Byte offsets in the lowered text can drift from the original
            // on non-ASCII input; clamp to the nearest char boundary.
            let mut start = pos.saturating_sub(40).min(content.len());
            while start > 0 && !content.is_char_boundary(start) {
                start -= 1;
            }
            let excerpt: String = content[start..].chars().take(100).collect();
            return Some(excerpt.trim().to_string());
        }
    }
    None
}

fn build_context(history: &[HistoryMessage]) -> ConversationContext {
    let window_start = history.len().saturating_sub(MAX_CONTEXT_MESSAGES);
    let window = &history[window_start..];

    let mut topic_counts: HashMap<String, usize> = HashMap::new();
    let mut topic_order: Vec<String> = Vec::new();
    let mut mentioned_files = Vec::new();
    let mut mentioned_seen = HashSet::new();
    let mut code_elements = Vec::new();
    let mut code_seen = HashSet::new();
    let mut errors = Vec::new();
    let mut tasks = Vec::new();

    for msg in window {
        for word in tokenize(&msg.content.to_lowercase()) {
            if word.len() <= 3 || STOPWORDS.contains(&word.as_str()) {
                continue;
            }
            if !topic_counts.contains_key(&word) {
                topic_order.push(word.clone());
            }
            *topic_counts.entry(word).or_insert(0) += 1;
        }

        for file in extract_files(&msg.content) {
            if mentioned_seen.insert(file.clone()) {
                mentioned_files.push(file);
            }
        }

        for element in extract_functions(&msg.content)
            .into_iter()
            .chain(extract_classes(&msg.content))
        {
            if code_seen.insert(element.clone()) && code_elements.len() < MAX_CODE_ELEMENTS {
                code_elements.push(element);
            }
        }

        if let Some(excerpt) = excerpt_containing(&msg.content, ERROR_WORDS) {
            errors.push(excerpt);
        }
        if let Some(excerpt) = excerpt_containing(&msg.content, TASK_VERBS) {
            tasks.push(excerpt);
        }
    }

    // Rank topics by count, then by first appearance for determinism
    let mut topics: Vec<(String, usize, usize)> = topic_order
        .into_iter()
        .enumerate()
        .map(|(order, word)| {
            let count = topic_counts[&word];
            (word, count, order)
        })
        .collect();
    topics.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    let topics: Vec<String> = topics.into_iter().take(MAX_TOPICS).map(|t| t.0).collect();

    let has_errors = !errors.is_empty();
    let has_tasks = !tasks.is_empty();

    ConversationContext {
        topics,
        mentioned_files,
        code_elements,
        errors,
        tasks,
        has_errors,
        has_tasks,
    }
}

fn recent_file_mentions(history: &[HistoryMessage]) -> Vec<FileMention> {
    let window_start = history.len().saturating_sub(MAX_FILE_MENTION_MESSAGES);
    let window = &history[window_start..];

    let mut mentions: HashMap<String, FileMention> = HashMap::new();
    // Walk newest-first so last_mention_index counts back from the end
    for (back_index, msg) in window.iter().rev().enumerate() {
        for file in extract_files(&msg.content) {
            mentions
                .entry(file.clone())
                .and_modify(|m| m.mentions += 1)
                .or_insert(FileMention {
                    filename: file,
                    mentions: 1,
                    last_mention_index: back_index,
                });
        }
    }

    let mut ordered: Vec<FileMention> = mentions.into_values().collect();
    ordered.sort_by(|a, b| {
        a.last_mention_index
            .cmp(&b.last_mention_index)
            .then(b.mentions.cmp(&a.mentions))
            .then(a.filename.cmp(&b.filename))
    });
    ordered.truncate(MAX_RECENT_FILES);
    ordered
}

/// A file reference that suggests configuration
fn is_config_file(file: &str) -> bool {
    file == ".env"
        || file == ".npmrc"
        || file == ".babelrc"
        || file == ".eslintrc"
        || file.contains("config")
        || file.ends_with(".yml")
        || file.ends_with(".yaml")
        || file.ends_with(".env")
}

/// Classification order is part of the contract; first match wins.
fn classify(
    query_lower: &str,
    words: &[String],
    intents: &[Intent],
    explicit_files: &[String],
    functions: &[String],
    classes: &[String],
) -> QueryType {
    let has_word = |list: &[&str]| words.iter().any(|w| list.contains(&w.as_str()));

    // 1. Ambiguous opener with no action verb stays general even when an
    //    intent word matches ("Show me the database setup").
    let opens_ambiguous = AMBIGUOUS_OPENERS
        .iter()
        .any(|opener| query_lower.trim_start().starts_with(opener));
    if opens_ambiguous && !has_word(ACTION_VERBS) {
        return QueryType::General;
    }

    // 2. Strong intents, error before test so debugging wins.
    if intents.contains(&Intent::Error) {
        return QueryType::Debugging;
    }
    if intents.contains(&Intent::Test) {
        return QueryType::Testing;
    }
    if intents.contains(&Intent::Config) {
        return QueryType::Configuration;
    }
    if intents.contains(&Intent::Documentation) {
        return QueryType::Documentation;
    }

    // 3. Implementation intent splits on co-occurring test words.
    if intents.contains(&Intent::Implementation) {
        if has_word(TEST_WORDS) {
            return QueryType::Testing;
        }
        return QueryType::Development;
    }

    // 4. Keyword overrides.
    if has_word(DEBUG_WORDS) {
        return QueryType::Debugging;
    }
    if has_word(TEST_WORDS) {
        return QueryType::Testing;
    }
    if has_word(BUILD_WORDS) && !has_word(TEST_WORDS) {
        return QueryType::Development;
    }
    if has_word(CONFIG_WORDS) {
        return QueryType::Configuration;
    }
    if has_word(UPDATE_WORDS) && explicit_files.iter().any(|f| is_config_file(f)) {
        return QueryType::Configuration;
    }

    // 5. Explicit config-file reference.
    if explicit_files.iter().any(|f| is_config_file(f)) {
        return QueryType::Configuration;
    }

    // 6. Code identifiers.
    if !functions.is_empty() || !classes.is_empty() {
        return QueryType::CodeSpecific;
    }

    // 7. Explicit files.
    if !explicit_files.is_empty() {
        return QueryType::FileSpecific;
    }

    QueryType::General
}

fn confidence_of(
    explicit_files: &[String],
    functions: &[String],
    classes: &[String],
    intents: &[Intent],
    keywords: &[String],
    recent_files: &[FileMention],
    context: &ConversationContext,
) -> f32 {
    let mut confidence = 0.0f32;
    if !explicit_files.is_empty() {
        confidence += 0.25;
    }
    if !functions.is_empty() {
        confidence += 0.15;
    }
    if !classes.is_empty() {
        confidence += 0.15;
    }
    if !recent_files.is_empty() {
        confidence += 0.15;
    }
    confidence += 0.05 * intents.len().min(3) as f32;
    if keywords.len() >= 3 {
        confidence += 0.1;
    }
    if context.has_errors {
        confidence += 0.05;
    }
    if context.has_tasks {
        confidence += 0.05;
    }
    confidence.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(content: &str) -> HistoryMessage {
        HistoryMessage {
            role: Role::User,
            content: content.to_string(),
        }
    }

    fn assistant(content: &str) -> HistoryMessage {
        HistoryMessage {
            role: Role::Assistant,
            content: content.to_string(),
        }
    }

    #[test]
    fn extracts_files_and_dotfiles() {
        let files = extract_files("Check src/App.TSX no, app.ts and the .env plus notes.md");
        assert!(files.contains(&"app.ts".to_string()));
        assert!(files.contains(&"notes.md".to_string()));
        assert!(files.contains(&".env".to_string()));
    }

    #[test]
    fn noun_to_verb_mapping() {
        let functions = extract_functions("the authentication flow has a validation problem");
        assert!(functions.contains(&"authenticate".to_string()));
        assert!(functions.contains(&"validate".to_string()));
    }

    #[test]
    fn call_sites_skip_keywords() {
        let functions = extract_functions("if (ready) { fetchUser() }");
        assert!(functions.contains(&"fetchUser".to_string()));
        assert!(!functions.contains(&"if".to_string()));
    }

    #[test]
    fn pascal_case_counts_as_class() {
        let classes = extract_classes("look at UserService and new TokenStore()");
        assert!(classes.contains(&"UserService".to_string()));
        assert!(classes.contains(&"TokenStore".to_string()));
    }

    #[test]
    fn ambiguous_opener_stays_general() {
        // "database" intent matches but the ambiguous opener wins
        let analysis = analyze("Show me the database setup", &[]);
        assert_eq!(analysis.query_type, QueryType::General);
    }

    #[test]
    fn ambiguous_opener_with_action_verb_is_not_general() {
        let analysis = analyze("show me how to fix the database error", &[]);
        assert_eq!(analysis.query_type, QueryType::Debugging);
    }

    #[test]
    fn debugging_beats_testing() {
        let analysis = analyze(
            "Debug the UserService authenticate method and write tests for it",
            &[],
        );
        assert_eq!(analysis.query_type, QueryType::Debugging);
    }

    #[test]
    fn implementation_with_tests_is_testing() {
        let analysis = analyze("implement coverage for the parser tests", &[]);
        assert_eq!(analysis.query_type, QueryType::Testing);
    }

    #[test]
    fn config_file_reference_classifies_configuration() {
        let analysis = analyze("what goes in config.yml", &[]);
        assert_eq!(analysis.query_type, QueryType::Configuration);
    }

    #[test]
    fn code_identifiers_classify_code_specific() {
        let analysis = analyze("refactor parseHeaders() please", &[]);
        assert_eq!(analysis.query_type, QueryType::CodeSpecific);
    }

    #[test]
    fn plain_file_reference_classifies_file_specific() {
        let analysis = analyze("open notes.md", &[]);
        assert_eq!(analysis.query_type, QueryType::FileSpecific);
    }

    #[test]
    fn conversation_recency_tracks_files() {
        let history = vec![
            user("Working on user-service.js authentication bug"),
            assistant("The authenticate method has issues"),
        ];
        let analysis = analyze("Fix the authentication bug in UserService", &history);

        assert_eq!(analysis.query_type, QueryType::Debugging);
        assert!(analysis.functions.contains(&"authenticate".to_string()));
        assert!(analysis.classes.contains(&"UserService".to_string()));
        assert_eq!(
            analysis.recently_mentioned_files[0].filename,
            "user-service.js"
        );
        assert!(analysis.conversation_context.has_errors);
    }

    #[test]
    fn recent_mentions_count_and_order() {
        let history = vec![
            user("look at alpha.js"),
            user("alpha.js again, and beta.ts"),
            user("now beta.ts only"),
        ];
        let mentions = recent_file_mentions(&history);
        assert_eq!(mentions[0].filename, "beta.ts");
        assert_eq!(mentions[0].last_mention_index, 0);
        assert_eq!(mentions[0].mentions, 2);
        let alpha = mentions.iter().find(|m| m.filename == "alpha.js").unwrap();
        assert_eq!(alpha.mentions, 2);
        assert_eq!(alpha.last_mention_index, 1);
    }

    #[test]
    fn keywords_drop_stopwords() {
        let analysis = analyze("what is the best way to cache tokens", &[]);
        assert!(!analysis.keywords.contains(&"the".to_string()));
        assert!(analysis.keywords.contains(&"cache".to_string()));
        assert!(analysis.keywords.contains(&"tokens".to_string()));
    }

    #[test]
    fn analyzer_is_deterministic() {
        let history = vec![
            user("Working on user-service.js and api.ts with errors everywhere"),
            assistant("The authenticate method fails in UserService"),
            user("also update config.yml and run the tests"),
        ];
        let query = "fix authentication in UserService and user-service.js";
        let a = analyze(query, &history);
        let b = analyze(query, &history);
        assert_eq!(a, b);
    }

    #[test]
    fn confidence_bounded() {
        let history = vec![
            user("error in user-service.js, fix authenticate() in UserService"),
            user("implement the fix and test it"),
        ];
        let analysis = analyze(
            "fix authenticate() in UserService from user-service.js tests errors config",
            &history,
        );
        assert!(analysis.confidence > 0.5);
        assert!(analysis.confidence <= 1.0);

        let empty = analyze("", &[]);
        assert_eq!(empty.confidence, 0.0);
    }
}
