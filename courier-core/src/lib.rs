//! # Courier Core
//!
//! Core library for the Courier chat-command router.
//! Provides the natural-language-to-command router (cache, guards, pattern
//! rules, auto-context, pre-pass transformers, generative fallback), the
//! priority-ordered skill dispatcher, configuration, and fundamental types.

pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod providers;
pub mod router;
pub mod sanitize;
pub mod skills;
pub mod types;

// Re-export commonly used types at the crate root.
pub use config::{CourierConfig, FallbackConfig, LlmConfig, RouteCacheConfig, RouterConfig};
pub use error::{CourierError, Result};
pub use metrics::{MetricsSnapshot, RouteMetrics};
pub use providers::{CompletionProvider, MockCompletionProvider, OpenAiCompatibleProvider};
pub use router::{HandleOutcome, Router, RouterBuilder};
pub use skills::{
    DeclarativeSkill, DeclarativeSkillConfig, DispatchOutcome, Skill, SkillConflict, SkillOutput,
    SkillRegistry,
};
pub use types::{
    IntentContinuation, PassthroughReason, RouteContext, RouteDecision, RouteOutcome, RouteSource,
    RoutedCommand, TargetKind,
};
