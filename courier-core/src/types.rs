//! Core types shared across the router and the skill dispatcher.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of default target a conversation can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// The active repository / project (e.g. `judo`).
    Repository,
    /// The active company or organization.
    Organization,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Repository => write!(f, "repository"),
            TargetKind::Organization => write!(f, "organization"),
        }
    }
}

/// Caller-supplied hints for a single routing call.
///
/// Built by the transport layer from its platform envelope. The router never
/// mutates it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteContext {
    /// Default targets keyed by kind. A `BTreeMap` keeps cache keys stable.
    #[serde(default)]
    pub targets: BTreeMap<TargetKind, String>,
    /// Conversation identifier scoping pronoun and multi-intent state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl RouteContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the active repository hint.
    pub fn with_repository(self, repo: impl Into<String>) -> Self {
        self.with_target(TargetKind::Repository, repo)
    }

    /// Set the active organization hint.
    pub fn with_organization(self, org: impl Into<String>) -> Self {
        self.with_target(TargetKind::Organization, org)
    }

    pub fn with_target(mut self, kind: TargetKind, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.targets.insert(kind, value.trim().to_string());
        }
        self
    }

    pub fn with_conversation(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn target(&self, kind: TargetKind) -> Option<&str> {
        self.targets.get(&kind).map(String::as_str)
    }

    /// Whether any default-target hint is present.
    pub fn has_targets(&self) -> bool {
        !self.targets.is_empty()
    }
}

/// Which stage produced a routed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    Cache,
    Pattern,
    Structured,
    Generative,
}

impl fmt::Display for RouteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteSource::Cache => write!(f, "cache"),
            RouteSource::Pattern => write!(f, "pattern"),
            RouteSource::Structured => write!(f, "structured"),
            RouteSource::Generative => write!(f, "generative"),
        }
    }
}

/// A resolved command carried through the router.
///
/// Serialized to its plain `text` form at the dispatch boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedCommand {
    /// Full command string, verb first.
    pub text: String,
    /// First word of the command.
    pub verb: String,
    /// Remaining whitespace-separated words.
    pub args: Vec<String>,
    pub source: RouteSource,
    /// 0.0 - 1.0. Patterns are certain, the generative router is not.
    pub confidence: f32,
}

impl RoutedCommand {
    pub fn new(text: impl Into<String>, source: RouteSource, confidence: f32) -> Self {
        let text = text.into();
        let mut words = text.split_whitespace().map(str::to_string);
        let verb = words.next().unwrap_or_default();
        let args = words.collect();
        Self {
            text,
            verb,
            args,
            source,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Re-tag a cached command with its new source.
    pub fn with_source(mut self, source: RouteSource) -> Self {
        self.source = source;
        self
    }
}

impl fmt::Display for RoutedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Why a message was handed back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassthroughReason {
    Empty,
    Question,
    Conversational,
    BuildRequest,
    CodingInstruction,
    FallbackSkipped,
    FallbackDeclined,
    FallbackTimeout,
    FallbackMalformed,
    FallbackError,
    /// The router was stopped and no longer routes.
    Stopped,
}

impl fmt::Display for PassthroughReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PassthroughReason::Empty => "empty",
            PassthroughReason::Question => "question",
            PassthroughReason::Conversational => "conversational",
            PassthroughReason::BuildRequest => "build request",
            PassthroughReason::CodingInstruction => "coding instruction",
            PassthroughReason::FallbackSkipped => "fallback skipped",
            PassthroughReason::FallbackDeclined => "fallback declined",
            PassthroughReason::FallbackTimeout => "fallback timeout",
            PassthroughReason::FallbackMalformed => "fallback malformed",
            PassthroughReason::FallbackError => "fallback error",
            PassthroughReason::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Terminal decision of one routing call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteDecision {
    Command(RoutedCommand),
    Passthrough { reason: PassthroughReason },
}

/// Remaining intents of a compound message, queued for later turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentContinuation {
    /// Intents not routed this call, in original order.
    pub remaining: Vec<String>,
    /// Total number of intents found, including the one routed now.
    pub total: usize,
    /// `true` when the message used sequencing words ("then", "after that").
    pub sequential: bool,
    /// The full compound message as received.
    pub original: String,
}

/// Result of `Router::route`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteOutcome {
    /// Message text that went through the pipeline (first intent if split).
    pub message: String,
    pub decision: RouteDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation: Option<IntentContinuation>,
}

impl RouteOutcome {
    pub fn command(message: impl Into<String>, command: RoutedCommand) -> Self {
        Self {
            message: message.into(),
            decision: RouteDecision::Command(command),
            continuation: None,
        }
    }

    pub fn passthrough(message: impl Into<String>, reason: PassthroughReason) -> Self {
        Self {
            message: message.into(),
            decision: RouteDecision::Passthrough { reason },
            continuation: None,
        }
    }

    /// The plain-string result: the command, or the message unchanged.
    pub fn text(&self) -> &str {
        match &self.decision {
            RouteDecision::Command(cmd) => &cmd.text,
            RouteDecision::Passthrough { .. } => &self.message,
        }
    }

    pub fn as_command(&self) -> Option<&RoutedCommand> {
        match &self.decision {
            RouteDecision::Command(cmd) => Some(cmd),
            RouteDecision::Passthrough { .. } => None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self.decision, RouteDecision::Passthrough { .. })
    }
}
