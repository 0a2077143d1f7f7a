//! Generative fallback router: last-resort classification by a model.
//!
//! One completion call per message, raced against a deadline. The returned
//! text is treated as untrusted: it must be a single short line, is sanitized,
//! and is completed by the auto-context injector like any other command.

use super::context::AutoContextInjector;
use crate::config::FallbackConfig;
use crate::providers::CompletionProvider;
use crate::sanitize::{escape_for_llm_prompt, sanitize};
use crate::types::{PassthroughReason, RouteContext, RouteSource, RoutedCommand};
use std::sync::Arc;
use tracing::{debug, warn};

/// Confidence attached to generatively routed commands.
pub const GENERATIVE_CONFIDENCE: f32 = 0.7;

/// Upper bound on message characters embedded in the prompt.
const MAX_PROMPT_MESSAGE_CHARS: usize = 2000;

/// Result of one fallback attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackOutcome {
    Routed(RoutedCommand),
    /// The model echoed the message or returned nothing.
    Declined,
    /// Multi-line, over-long, or empty after sanitization.
    Malformed,
    TimedOut,
    Failed,
}

impl FallbackOutcome {
    /// The passthrough reason for every non-routed outcome.
    pub fn passthrough_reason(&self) -> Option<PassthroughReason> {
        match self {
            FallbackOutcome::Routed(_) => None,
            FallbackOutcome::Declined => Some(PassthroughReason::FallbackDeclined),
            FallbackOutcome::Malformed => Some(PassthroughReason::FallbackMalformed),
            FallbackOutcome::TimedOut => Some(PassthroughReason::FallbackTimeout),
            FallbackOutcome::Failed => Some(PassthroughReason::FallbackError),
        }
    }
}

/// Timeout-bounded router over a [`CompletionProvider`].
#[derive(Clone)]
pub struct GenerativeRouter {
    provider: Arc<dyn CompletionProvider>,
    config: FallbackConfig,
}

impl GenerativeRouter {
    pub fn new(provider: Arc<dyn CompletionProvider>, config: FallbackConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &FallbackConfig {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Build the routing prompt.
    ///
    /// `usages` is assembled per call by the caller so newly registered skills
    /// are reachable immediately.
    pub fn build_prompt(&self, message: &str, ctx: &RouteContext, usages: &[String]) -> String {
        let mut prompt = String::from(
            "You route chat messages to bot commands.\n\
             Reply with exactly one command on a single line, and nothing else.\n\
             If the message is conversation, a question, or does not clearly map to \
             one of the commands below, reply with the message unchanged.\n",
        );

        if ctx.has_targets() {
            prompt.push_str("\nActive defaults:\n");
            for (kind, value) in &ctx.targets {
                prompt.push_str(&format!("- {kind}: {}\n", sanitize(value)));
            }
        }

        prompt.push_str("\nKnown commands:\n");
        let mut seen: Vec<&str> = Vec::new();
        for usage in usages {
            let usage = usage.trim();
            if !usage.is_empty() && !seen.contains(&usage) {
                seen.push(usage);
                prompt.push_str(&format!("- {usage}\n"));
            }
        }

        prompt.push_str(&format!(
            "\n<message>{}</message>\n",
            escape_for_llm_prompt(message, MAX_PROMPT_MESSAGE_CHARS)
        ));
        prompt
    }

    /// Ask the model for a command, bounded by the configured timeout.
    ///
    /// On timeout the in-flight request is dropped, not retried.
    pub async fn route(
        &self,
        message: &str,
        ctx: &RouteContext,
        usages: &[String],
        injector: &AutoContextInjector,
    ) -> FallbackOutcome {
        let prompt = self.build_prompt(message, ctx, usages);
        let timeout = self.config.timeout();

        let response = match tokio::time::timeout(timeout, self.provider.complete(&prompt)).await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(
                    model = self.provider.model_name(),
                    error = %e,
                    "Generative routing failed"
                );
                return FallbackOutcome::Failed;
            }
            Err(_) => {
                warn!(
                    model = self.provider.model_name(),
                    timeout_ms = self.config.timeout_ms,
                    "Generative routing timed out"
                );
                return FallbackOutcome::TimedOut;
            }
        };

        self.validate(message, &response, ctx, injector)
    }

    /// Turn raw model output into a command, or reject it.
    pub fn validate(
        &self,
        message: &str,
        response: &str,
        ctx: &RouteContext,
        injector: &AutoContextInjector,
    ) -> FallbackOutcome {
        let response = response.trim();

        if response.contains('\n') || response.chars().count() > self.config.max_command_len {
            warn!(
                len = response.chars().count(),
                "Discarding malformed generative route"
            );
            return FallbackOutcome::Malformed;
        }
        if response.is_empty() || response.eq_ignore_ascii_case(message.trim()) {
            debug!("Generative router declined");
            return FallbackOutcome::Declined;
        }

        let cleaned = sanitize(response);
        if cleaned.is_empty() {
            warn!("Generative route was empty after sanitization");
            return FallbackOutcome::Malformed;
        }

        let command = injector.inject(&cleaned, ctx);
        debug!(command = %command, "Generative route accepted");
        FallbackOutcome::Routed(RoutedCommand::new(
            command,
            RouteSource::Generative,
            GENERATIVE_CONFIDENCE,
        ))
    }
}

impl std::fmt::Debug for GenerativeRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerativeRouter")
            .field("model", &self.provider.model_name())
            .field("config", &self.config)
            .finish()
    }
}
