//! The natural-language-to-command router.
//!
//! Pipeline for one message:
//!
//! 1. question check on the raw text (absolute: `?` always passes through)
//! 2. pre-pass: multi-intent decomposition, then pronoun resolution
//! 3. cache lookup
//! 4. question check on the routed intent
//! 5. pattern matcher (before the passthrough guards, so "what are the
//!    deadlines" is not swallowed as a WH-question)
//! 6. conversational and build-request guards
//! 7. structured-command recognizer
//! 8. coding-instruction guard
//! 9. fallback guards, then the generative fallback
//!
//! Every stage either produces a terminal result or defers to the next.

pub mod context;
pub mod fallback;
pub mod guards;
pub mod intents;
pub mod patterns;
pub mod pronouns;

pub use context::AutoContextInjector;
pub use fallback::{FallbackOutcome, GenerativeRouter};
pub use intents::{ConjunctionDecomposer, DecomposedIntents, IntentDecomposer};
pub use patterns::{CommandTemplate, PatternMatch, PatternMatcher, PatternRule, RuleCaptures};
pub use pronouns::{EntityTracker, PronounResolver};

use crate::cache::{RouteCache, cache_key};
use crate::config::RouterConfig;
use crate::error::RouterError;
use crate::metrics::{MetricsSnapshot, RouteMetrics};
use crate::providers::CompletionProvider;
use crate::sanitize::sanitize;
use crate::skills::{DispatchOutcome, SkillRegistry};
use crate::types::{
    IntentContinuation, PassthroughReason, RouteContext, RouteOutcome, RouteSource, RoutedCommand,
    TargetKind,
};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Confidence attached to commands accepted by the structured recognizer.
const STRUCTURED_CONFIDENCE: f32 = 0.9;

// Router lifecycle states.
const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

/// Builder for [`Router`].
pub struct RouterBuilder {
    config: RouterConfig,
    registry: Option<Arc<SkillRegistry>>,
    provider: Option<Arc<dyn CompletionProvider>>,
    pronouns: Option<Arc<dyn PronounResolver>>,
    intents: Option<Arc<dyn IntentDecomposer>>,
    rules: Vec<PatternRule>,
    shapes: Vec<(String, TargetKind)>,
}

impl RouterBuilder {
    /// Skills to dispatch to. Their routing rules are read from the registry
    /// on every call and tried after the built-in and extra rules, so skills
    /// registered or reloaded later take effect immediately.
    pub fn with_registry(mut self, registry: Arc<SkillRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Completion service for the generative fallback.
    pub fn with_provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_pronoun_resolver(mut self, resolver: Arc<dyn PronounResolver>) -> Self {
        self.pronouns = Some(resolver);
        self
    }

    pub fn with_intent_decomposer(mut self, decomposer: Arc<dyn IntentDecomposer>) -> Self {
        self.intents = Some(decomposer);
        self
    }

    /// Install the stock [`EntityTracker`] and [`ConjunctionDecomposer`].
    pub fn with_default_transformers(self) -> Self {
        let tracker = EntityTracker::with_capacity(self.config.max_conversations);
        self.with_pronoun_resolver(Arc::new(tracker))
            .with_intent_decomposer(Arc::new(ConjunctionDecomposer::new()))
    }

    /// Extra rules, placed after the built-ins and before skill rules.
    pub fn with_rules(mut self, rules: impl IntoIterator<Item = PatternRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Treat `shape` as a bare command that takes the context's default
    /// target of `kind`, like the built-in "deploy".
    pub fn with_context_shape(mut self, shape: &str, kind: TargetKind) -> Self {
        self.shapes.push((shape.to_string(), kind));
        self
    }

    pub fn build(self) -> Result<Router, RouterError> {
        let registry = self.registry.unwrap_or_default();
        let mut matcher = PatternMatcher::builtin()?;
        matcher.extend(self.rules);
        for (shape, kind) in &self.shapes {
            matcher.injector_mut().add_shape(shape, *kind);
        }

        let fallback = self
            .provider
            .map(|provider| GenerativeRouter::new(provider, self.config.fallback.clone()));

        Ok(Router {
            cache: Mutex::new(RouteCache::from_config(&self.config.cache)),
            config: self.config,
            matcher,
            metrics: RouteMetrics::new(),
            fallback,
            pronouns: self.pronouns,
            intents: self.intents,
            registry_generation: AtomicU64::new(registry.generation()),
            registry,
            state: AtomicU8::new(IDLE),
        })
    }
}

/// Routes chat messages to commands. Owns its cache and metrics.
///
/// `route` may be called from several tasks. Messages of one conversation
/// must still be routed in arrival order, because pronoun state is updated
/// per call.
///
/// A router that was never started routes normally; `start` only validates
/// the rule table. After `stop`, every message passes through with
/// [`PassthroughReason::Stopped`] until `start` is called again.
pub struct Router {
    config: RouterConfig,
    matcher: PatternMatcher,
    cache: Mutex<RouteCache>,
    metrics: RouteMetrics,
    registry: Arc<SkillRegistry>,
    fallback: Option<GenerativeRouter>,
    pronouns: Option<Arc<dyn PronounResolver>>,
    intents: Option<Arc<dyn IntentDecomposer>>,
    /// Registry generation the cache contents were computed against.
    registry_generation: AtomicU64,
    state: AtomicU8,
}

/// Result of [`Router::handle`].
#[derive(Debug, Clone, PartialEq)]
pub struct HandleOutcome {
    pub route: RouteOutcome,
    /// Present when the message routed to a command.
    pub dispatch: Option<DispatchOutcome>,
}

impl HandleOutcome {
    /// Whether the caller should treat the message as conversation: it was a
    /// passthrough, or no skill handled the command.
    pub fn needs_conversation(&self) -> bool {
        match &self.dispatch {
            None => true,
            Some(outcome) => outcome.is_unhandled(),
        }
    }

    /// Skill reply text, when a skill ran successfully.
    pub fn reply(&self) -> Option<&str> {
        match &self.dispatch {
            Some(DispatchOutcome::Handled { output, .. }) => Some(&output.text),
            _ => None,
        }
    }
}

impl Router {
    pub fn builder(config: RouterConfig) -> RouterBuilder {
        RouterBuilder {
            config,
            registry: None,
            provider: None,
            pronouns: None,
            intents: None,
            rules: Vec::new(),
            shapes: Vec::new(),
        }
    }

    /// Validate the rule table and mark the router running.
    ///
    /// Rule-order problems are logged; with `strict_rule_order` the first one
    /// is returned as an error instead.
    pub fn start(&self) -> Result<(), RouterError> {
        let problems = self.validate_rules();
        for problem in &problems {
            warn!(problem = %problem, "Pattern rule order problem");
        }
        if self.config.strict_rule_order
            && let Some(first) = problems.into_iter().next()
        {
            return Err(first);
        }

        self.state.store(RUNNING, Ordering::SeqCst);
        info!(
            rules = self.rule_count(),
            skills = self.registry.len(),
            fallback = self.fallback.as_ref().map(|f| f.model_name()).unwrap_or("none"),
            "Router started"
        );
        Ok(())
    }

    /// Stop routing and drop cached routes and pronoun state.
    pub fn stop(&self) {
        self.state.store(STOPPED, Ordering::SeqCst);
        self.lock_cache().clear();
        if let Some(pronouns) = &self.pronouns {
            pronouns.clear();
        }
        info!("Router stopped");
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::SeqCst) == RUNNING
    }

    fn is_stopped(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STOPPED
    }

    /// Rule-order problems across built-in, extra and current skill rules.
    pub fn validate_rules(&self) -> Vec<RouterError> {
        self.matcher.validate_with(&self.registry.routing_rules())
    }

    /// Built-in and extra rules plus the registry's current skill rules.
    pub fn rule_count(&self) -> usize {
        self.matcher.rules().len() + self.registry.routing_rules().len()
    }

    pub fn registry(&self) -> &Arc<SkillRegistry> {
        &self.registry
    }

    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    pub fn clear_cache(&self) {
        self.lock_cache().clear();
    }

    pub fn cache_len(&self) -> usize {
        self.lock_cache().len()
    }

    /// Drop pronoun state for one conversation.
    pub fn forget_conversation(&self, conversation_id: &str) {
        if let Some(pronouns) = &self.pronouns {
            pronouns.forget(conversation_id);
        }
    }

    /// Usage lines for the generative prompt: built-in and skill rules first,
    /// then live registry usages.
    pub fn command_usages(&self) -> Vec<String> {
        let mut usages = self.matcher.usages_with(&self.registry.routing_rules());
        for usage in self.registry.command_usages() {
            if !usages.contains(&usage) {
                usages.push(usage);
            }
        }
        usages
    }

    /// Route a message to a command or pass it through.
    pub async fn route(&self, message: &str, ctx: &RouteContext) -> RouteOutcome {
        let raw = message.trim();
        if self.is_stopped() {
            return self.passthrough(raw, PassthroughReason::Stopped);
        }
        if raw.is_empty() {
            return self.passthrough(raw, PassthroughReason::Empty);
        }
        if raw.ends_with('?') {
            return self.passthrough(raw, PassthroughReason::Question);
        }

        let (first, continuation) = self.decompose(raw);
        let working = working_text(&self.resolve_pronouns(&first, ctx));

        let mut outcome = self.route_single(&first, &working, ctx).await;
        outcome.continuation = continuation;
        outcome
    }

    /// [`route`](Self::route) reduced to its plain-string result.
    pub async fn route_text(&self, message: &str, ctx: &RouteContext) -> String {
        self.route(message, ctx).await.text().to_string()
    }

    /// Route, then dispatch a routed command to the skill registry.
    pub async fn handle(&self, message: &str, ctx: &RouteContext) -> HandleOutcome {
        let route = self.route(message, ctx).await;
        let dispatch = match route.as_command() {
            Some(command) => Some(self.registry.dispatch(&command.text, ctx).await),
            None => None,
        };
        HandleOutcome { route, dispatch }
    }

    async fn route_single(&self, original: &str, working: &str, ctx: &RouteContext) -> RouteOutcome {
        self.sync_registry();
        let key = cache_key(working, ctx);
        let cached = self.lock_cache().get(&key);
        if let Some(cached) = cached {
            self.metrics.record_cache_hit();
            debug!(command = %cached, "Route cache hit");
            return RouteOutcome::command(original, cached.with_source(RouteSource::Cache));
        }

        if working.ends_with('?') {
            return self.passthrough(original, PassthroughReason::Question);
        }
        if working.is_empty() {
            return self.passthrough(original, PassthroughReason::Empty);
        }

        let skill_rules = self.registry.routing_rules();
        if let Some(found) = self.matcher.match_with(working, ctx, &skill_rules) {
            self.metrics.record_pattern_hit();
            debug!(rule = %found.rule, command = %found.command, "Pattern matched");
            self.lock_cache().set(key, found.command.clone());
            return RouteOutcome::command(original, found.command);
        }

        if guards::is_conversational(working) {
            return self.passthrough(original, PassthroughReason::Conversational);
        }
        if guards::is_build_request(working) {
            return self.passthrough(original, PassthroughReason::BuildRequest);
        }

        if let Some(command) = self.recognize_structured(working, ctx) {
            self.metrics.record_pattern_hit();
            debug!(command = %command, "Structured command recognized");
            self.lock_cache().set(key, command.clone());
            return RouteOutcome::command(original, command);
        }

        if guards::is_coding_instruction(working) {
            return self.passthrough(original, PassthroughReason::CodingInstruction);
        }

        let Some(fallback) = &self.fallback else {
            return self.passthrough(original, PassthroughReason::FallbackSkipped);
        };
        if !self.config.fallback.enabled
            || !guards::within_fallback_bounds(working, self.config.fallback.max_message_words)
        {
            return self.passthrough(original, PassthroughReason::FallbackSkipped);
        }

        let usages = self.command_usages();
        let outcome = fallback
            .route(working, ctx, &usages, self.matcher.injector())
            .await;
        match outcome {
            FallbackOutcome::Routed(command) => {
                self.metrics.record_ai_hit();
                self.lock_cache().set(key, command.clone());
                RouteOutcome::command(original, command)
            }
            other => {
                let reason = other
                    .passthrough_reason()
                    .unwrap_or(PassthroughReason::FallbackError);
                self.passthrough(original, reason)
            }
        }
    }

    /// Drop cached routes computed against an older skill catalog.
    fn sync_registry(&self) {
        let current = self.registry.generation();
        let seen = self.registry_generation.swap(current, Ordering::SeqCst);
        if seen != current {
            self.lock_cache().clear();
            debug!(generation = current, "Skill registry changed, route cache cleared");
        }
    }

    /// Accept text already in command form: an optional leading `/`, then
    /// something a registered skill handles.
    fn recognize_structured(&self, working: &str, ctx: &RouteContext) -> Option<RoutedCommand> {
        let candidate = working.strip_prefix('/').unwrap_or(working).trim();
        if candidate.is_empty() || !self.registry.can_handle(candidate) {
            return None;
        }
        let cleaned = sanitize(candidate);
        if cleaned.is_empty() {
            return None;
        }
        let command = self.matcher.injector().inject(&cleaned, ctx);
        Some(RoutedCommand::new(
            command,
            RouteSource::Structured,
            STRUCTURED_CONFIDENCE,
        ))
    }

    /// Split a compound message. Failures degrade to a single intent.
    fn decompose(&self, raw: &str) -> (String, Option<IntentContinuation>) {
        let Some(decomposer) = &self.intents else {
            return (raw.to_string(), None);
        };
        match decomposer.decompose(raw) {
            Ok(Some(split)) if split.intents.len() > 1 => {
                let total = split.intents.len();
                let mut intents = split.intents.into_iter();
                let first = intents.next().unwrap_or_else(|| raw.to_string());
                debug!(total, sequential = split.sequential, "Message split into intents");
                (
                    first,
                    Some(IntentContinuation {
                        remaining: intents.collect(),
                        total,
                        sequential: split.sequential,
                        original: raw.to_string(),
                    }),
                )
            }
            Ok(_) => (raw.to_string(), None),
            Err(e) => {
                warn!(error = %e, "Intent decomposition failed, routing message whole");
                (raw.to_string(), None)
            }
        }
    }

    /// Resolve pronouns for the context's conversation. Failures degrade to
    /// the untransformed text.
    fn resolve_pronouns(&self, text: &str, ctx: &RouteContext) -> String {
        let (Some(resolver), Some(conversation)) = (&self.pronouns, &ctx.conversation_id) else {
            return text.to_string();
        };
        match resolver.resolve(conversation, text) {
            Ok(resolved) => {
                if resolved != text {
                    debug!(from = text, to = %resolved, "Pronouns resolved");
                }
                resolved
            }
            Err(e) => {
                warn!(error = %e, "Pronoun resolution failed, using message as-is");
                text.to_string()
            }
        }
    }

    fn passthrough(&self, message: &str, reason: PassthroughReason) -> RouteOutcome {
        self.metrics.record_passthrough();
        debug!(reason = %reason, "Passing message through");
        RouteOutcome::passthrough(message, reason)
    }

    fn lock_cache(&self) -> MutexGuard<'_, RouteCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("rules", &self.rule_count())
            .field("registry", &self.registry)
            .field("fallback", &self.fallback)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Collapse whitespace and drop trailing `.`/`!` so "Deploy judo!" matches
/// like "deploy judo".
fn working_text(message: &str) -> String {
    let collapsed = message.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches(['.', '!']).trim_end().to_string()
}
