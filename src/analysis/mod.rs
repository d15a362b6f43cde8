//! Query analysis and relevance scoring

pub mod query;
pub mod relevance;

pub use query::{
    analyze, ConversationContext, FileMention, HistoryMessage, Intent, QueryAnalysis, QueryType,
};
pub use relevance::{ItemFeatures, RelevanceScorer, ScoreBreakdown, ScoredMemory, ScorerConfig};
