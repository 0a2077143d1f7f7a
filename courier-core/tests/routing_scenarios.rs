//! End-to-end routing tests.
//!
//! These drive `Router::route` and `Router::handle` through the whole
//! pipeline with a mock completion provider, checking decisions through
//! both the returned outcome and the metrics counters.

use courier_core::config::RouterConfig;
use courier_core::providers::MockCompletionProvider;
use courier_core::skills::declarative::DeclarativeRoute;
use courier_core::{
    DeclarativeSkill, DeclarativeSkillConfig, DispatchOutcome, PassthroughReason, RouteContext,
    RouteDecision, RouteSource, Router, Skill, SkillRegistry,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn skill(name: &str, priority: i32, patterns: &[&str], usage: &[&str]) -> Arc<dyn Skill> {
    Arc::new(
        DeclarativeSkill::from_config(DeclarativeSkillConfig {
            name: name.into(),
            priority,
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            usage: usage.iter().map(|u| u.to_string()).collect(),
            reply: "{verb} handled by ".to_string() + name,
            routes: vec![],
        })
        .unwrap(),
    )
}

fn plain_router() -> Router {
    Router::builder(RouterConfig::default()).build().unwrap()
}

fn router_with(provider: Arc<MockCompletionProvider>, registry: Arc<SkillRegistry>) -> Router {
    Router::builder(RouterConfig::default())
        .with_provider(provider)
        .with_registry(registry)
        .build()
        .unwrap()
}

fn passthrough_reason(decision: &RouteDecision) -> Option<PassthroughReason> {
    match decision {
        RouteDecision::Passthrough { reason } => Some(*reason),
        RouteDecision::Command(_) => None,
    }
}

// ── Example scenarios ───────────────────────────────────────────────

#[tokio::test]
async fn test_platform_deploy_beats_generic_deploy() {
    let router = plain_router();
    let out = router
        .route("deploy judo to vercel", &RouteContext::new())
        .await;
    assert_eq!(out.text(), "vercel deploy judo");
    assert_eq!(out.as_command().unwrap().source, RouteSource::Pattern);
}

#[tokio::test]
async fn test_bare_deploy_gets_active_repository() {
    let router = plain_router();
    let ctx = RouteContext::new().with_repository("judo");
    assert_eq!(router.route_text("deploy", &ctx).await, "deploy judo");
}

#[tokio::test]
async fn test_question_is_never_routed() {
    let mock = Arc::new(MockCompletionProvider::with_response("vercel deploy"));
    let router = router_with(mock.clone(), Arc::new(SkillRegistry::new()));

    let out = router
        .route("how do I deploy to vercel?", &RouteContext::new())
        .await;
    assert_eq!(out.text(), "how do I deploy to vercel?");
    assert_eq!(passthrough_reason(&out.decision), Some(PassthroughReason::Question));

    let out = router.route("deploy judo?", &RouteContext::new()).await;
    assert_eq!(out.text(), "deploy judo?");

    let metrics = router.get_metrics();
    assert_eq!(metrics.pattern_hits, 0);
    assert_eq!(metrics.passthroughs, 2);
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_sanitizer_keeps_paths() {
    let router = plain_router();
    assert_eq!(
        router
            .route_text("restart the server; rm -rf /", &RouteContext::new())
            .await,
        "restart the server rm -rf /"
    );
}

#[tokio::test]
async fn test_higher_priority_skill_wins_with_conflict() {
    let registry = Arc::new(SkillRegistry::new());
    registry
        .register(skill("generic", 10, &["^deploy", "^restart"], &[]))
        .unwrap();
    registry
        .register(skill("deployer", 30, &[r"^deploy\b"], &[]))
        .unwrap();
    let mut conflicts = registry.subscribe_conflicts();

    let router = Router::builder(RouterConfig::default())
        .with_registry(registry.clone())
        .build()
        .unwrap();
    let out = router.handle("deploy judo", &RouteContext::new()).await;

    assert_eq!(out.reply(), Some("deploy handled by deployer"));
    let conflict = out.dispatch.as_ref().and_then(|d| d.conflict()).unwrap();
    assert_eq!(conflict.skills, vec!["deployer", "generic"]);

    let event = conflicts.recv().await.unwrap();
    assert_eq!(event.command, "deploy judo");
    assert_eq!(event.selected, "deployer");
}

#[tokio::test(start_paused = true)]
async fn test_fallback_timeout_passes_through() {
    let mock = Arc::new(
        MockCompletionProvider::with_response("deploy judo").with_delay(Duration::from_secs(30)),
    );
    let router = router_with(mock.clone(), Arc::new(SkillRegistry::new()));

    let out = router
        .route("  push the latest build live  ", &RouteContext::new())
        .await;
    assert_eq!(out.text(), "push the latest build live");
    assert_eq!(
        passthrough_reason(&out.decision),
        Some(PassthroughReason::FallbackTimeout)
    );

    let metrics = router.get_metrics();
    assert_eq!(metrics.ai_hits, 0);
    assert_eq!(metrics.passthroughs, 1);
    assert_eq!(mock.call_count(), 1);
}

// ── Cache ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cache_hit_skips_matcher() {
    let router = plain_router();
    let ctx = RouteContext::new().with_repository("judo");

    let first = router.route("Deploy", &ctx).await;
    let second = router.route("  deploy ", &ctx).await;
    assert_eq!(first.text(), "deploy judo");
    assert_eq!(second.text(), "deploy judo");
    assert_eq!(second.as_command().unwrap().source, RouteSource::Cache);

    let metrics = router.get_metrics();
    assert_eq!(metrics.pattern_hits, 1);
    assert_eq!(metrics.cache_hits, 1);
}

#[tokio::test]
async fn test_cache_is_context_sensitive() {
    let router = plain_router();
    let judo = RouteContext::new().with_repository("judo");
    let karate = RouteContext::new().with_repository("karate");
    assert_eq!(router.route_text("deploy", &judo).await, "deploy judo");
    assert_eq!(router.route_text("deploy", &karate).await, "deploy karate");
    assert_eq!(router.get_metrics().cache_hits, 0);
}

#[tokio::test]
async fn test_generative_route_is_cached() {
    let mock = Arc::new(MockCompletionProvider::with_response("deploy judo"));
    let router = router_with(mock.clone(), Arc::new(SkillRegistry::new()));

    let ctx = RouteContext::new();
    assert_eq!(router.route_text("push it out the door", &ctx).await, "deploy judo");
    assert_eq!(router.route_text("push it out the door", &ctx).await, "deploy judo");

    assert_eq!(mock.call_count(), 1);
    let metrics = router.get_metrics();
    assert_eq!(metrics.ai_hits, 1);
    assert_eq!(metrics.cache_hits, 1);
}

#[tokio::test]
async fn test_expired_entry_is_re_resolved() {
    let mut config = RouterConfig::default();
    config.cache.ttl_secs = 0;
    let router = Router::builder(config).build().unwrap();
    let ctx = RouteContext::new();

    router.route("deploy judo", &ctx).await;
    std::thread::sleep(Duration::from_millis(10));
    router.route("deploy judo", &ctx).await;

    let metrics = router.get_metrics();
    assert_eq!(metrics.cache_hits, 0);
    assert_eq!(metrics.pattern_hits, 2);
}

#[tokio::test]
async fn test_reset_metrics() {
    let router = plain_router();
    router.route("deploy judo", &RouteContext::new()).await;
    router.reset_metrics();
    assert_eq!(router.get_metrics().total(), 0);
}

// ── Guard / pattern ordering ────────────────────────────────────────

#[tokio::test]
async fn test_wh_command_beats_wh_passthrough() {
    let mock = Arc::new(MockCompletionProvider::with_response("status"));
    let router = router_with(mock.clone(), Arc::new(SkillRegistry::new()));
    let ctx = RouteContext::new();

    assert_eq!(router.route_text("what are the deadlines", &ctx).await, "deadlines");

    let out = router.route("what is happening with prod", &ctx).await;
    assert_eq!(
        passthrough_reason(&out.decision),
        Some(PassthroughReason::Conversational)
    );
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_greeting_never_reaches_fallback() {
    let mock = Arc::new(MockCompletionProvider::with_response("deploy judo"));
    let router = router_with(mock.clone(), Arc::new(SkillRegistry::new()));
    for msg in ["hello there", "thanks", "yes", "and then what"] {
        assert_eq!(router.route_text(msg, &RouteContext::new()).await, msg);
    }
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_build_request_goes_to_conversation() {
    let mock = Arc::new(MockCompletionProvider::with_response("build landing"));
    let router = router_with(mock.clone(), Arc::new(SkillRegistry::new()));
    let out = router
        .route("I want to build a landing page", &RouteContext::new())
        .await;
    assert_eq!(
        passthrough_reason(&out.decision),
        Some(PassthroughReason::BuildRequest)
    );
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_coding_instruction_goes_to_conversation() {
    let mock = Arc::new(MockCompletionProvider::with_response("deploy"));
    let router = router_with(mock.clone(), Arc::new(SkillRegistry::new()));
    let out = router
        .route("add a dark mode toggle to the navbar", &RouteContext::new())
        .await;
    assert_eq!(
        passthrough_reason(&out.decision),
        Some(PassthroughReason::CodingInstruction)
    );
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_structured_command_beats_coding_guard() {
    let registry = Arc::new(SkillRegistry::new());
    registry
        .register(skill("scaffolder", 0, &[r"^add component\b"], &[]))
        .unwrap();
    let router = Router::builder(RouterConfig::default())
        .with_registry(registry)
        .build()
        .unwrap();

    let out = router
        .route("/add component navbar", &RouteContext::new())
        .await;
    let cmd = out.as_command().unwrap();
    assert_eq!(cmd.text, "add component navbar");
    assert_eq!(cmd.source, RouteSource::Structured);
}

#[tokio::test]
async fn test_structured_command_gets_context() {
    let registry = Arc::new(SkillRegistry::new());
    registry
        .register(skill("status", 0, &[r"^status\b"], &[]))
        .unwrap();
    let router = Router::builder(RouterConfig::default())
        .with_registry(registry)
        .build()
        .unwrap();
    let ctx = RouteContext::new().with_repository("judo");
    assert_eq!(router.route_text("/status", &ctx).await, "status judo");
}

// ── Generative fallback ─────────────────────────────────────────────

#[tokio::test]
async fn test_fallback_prompt_lists_live_skill_usages() {
    let mock = Arc::new(MockCompletionProvider::with_response("invoice acme"));
    let registry = Arc::new(SkillRegistry::new());
    let router = router_with(mock.clone(), registry.clone());

    // Registered after the router was built.
    registry
        .register(skill("billing", 0, &[r"^invoice\b"], &["invoice <organization>"]))
        .unwrap();

    let ctx = RouteContext::new().with_organization("acme");
    let out = router.handle("bill them for march", &ctx).await;
    assert_eq!(out.route.text(), "invoice acme");
    assert_eq!(out.reply(), Some("invoice handled by billing"));

    let prompt = &mock.prompts()[0];
    assert!(prompt.contains("- invoice <organization>"));
    assert!(prompt.contains("- deploy <repo>"));
    assert!(prompt.contains("organization: acme"));
}

#[tokio::test]
async fn test_fallback_echo_is_passthrough() {
    let mock = Arc::new(MockCompletionProvider::with_response("nice weather today"));
    let router = router_with(mock, Arc::new(SkillRegistry::new()));
    let out = router
        .route("nice weather today", &RouteContext::new())
        .await;
    assert_eq!(
        passthrough_reason(&out.decision),
        Some(PassthroughReason::FallbackDeclined)
    );
    assert_eq!(router.get_metrics().ai_hits, 0);
}

#[tokio::test]
async fn test_fallback_explanation_is_discarded() {
    let mock = Arc::new(MockCompletionProvider::with_response(
        "deploy judo\n\nThis will deploy the judo repository to production.",
    ));
    let router = router_with(mock, Arc::new(SkillRegistry::new()));
    let out = router.route("push judo out", &RouteContext::new()).await;
    assert_eq!(out.text(), "push judo out");
    assert_eq!(
        passthrough_reason(&out.decision),
        Some(PassthroughReason::FallbackMalformed)
    );
}

// ── Skill-declared rules ────────────────────────────────────────────

#[tokio::test]
async fn test_skill_routes_are_appended() {
    let registry = Arc::new(SkillRegistry::new());
    let config = DeclarativeSkillConfig {
        name: "deployer".into(),
        priority: 0,
        patterns: vec![r"^deploy\b".into()],
        usage: vec![],
        reply: "ok".into(),
        routes: vec![DeclarativeRoute {
            pattern: r"^push (\S+) live$".into(),
            command: "deploy {1}".into(),
            usage: Some("push <repo> live".into()),
            examples: vec!["push judo live".into()],
        }],
    };
    registry
        .register(Arc::new(DeclarativeSkill::from_config(config).unwrap()))
        .unwrap();

    let router = Router::builder(RouterConfig {
        strict_rule_order: true,
        ..RouterConfig::default()
    })
    .with_registry(registry)
    .build()
    .unwrap();
    router.start().unwrap();

    let out = router.handle("push judo live", &RouteContext::new()).await;
    assert_eq!(out.route.text(), "deploy judo");
    assert!(matches!(out.dispatch, Some(DispatchOutcome::Handled { .. })));
    assert!(router.command_usages().contains(&"push <repo> live".to_string()));
}

fn launcher() -> Arc<dyn Skill> {
    Arc::new(
        DeclarativeSkill::from_config(DeclarativeSkillConfig {
            name: "launcher".into(),
            priority: 0,
            patterns: vec![r"^launch\b".into()],
            usage: vec![],
            reply: "launched".into(),
            routes: vec![DeclarativeRoute {
                pattern: r"^blast off (\S+)$".into(),
                command: "launch {1}".into(),
                usage: Some("blast off <repo>".into()),
                examples: vec!["blast off judo".into()],
            }],
        })
        .unwrap(),
    )
}

#[tokio::test]
async fn test_reload_retires_skill_routes() {
    let registry = Arc::new(SkillRegistry::new());
    registry.register(launcher()).unwrap();
    let router = Router::builder(RouterConfig::default())
        .with_registry(registry.clone())
        .build()
        .unwrap();
    let ctx = RouteContext::new();

    let out = router.handle("blast off judo", &ctx).await;
    assert_eq!(out.route.text(), "launch judo");
    assert!(matches!(out.dispatch, Some(DispatchOutcome::Handled { .. })));
    assert_eq!(router.cache_len(), 1);

    registry.reload(vec![]).unwrap();
    let out = router.handle("blast off judo", &ctx).await;
    assert_eq!(
        passthrough_reason(&out.route.decision),
        Some(PassthroughReason::FallbackSkipped)
    );
    assert!(out.dispatch.is_none());
    assert_eq!(router.cache_len(), 0);
    assert!(!router.command_usages().contains(&"blast off <repo>".to_string()));
}

#[tokio::test]
async fn test_skill_registered_after_build_routes() {
    let registry = Arc::new(SkillRegistry::new());
    let router = Router::builder(RouterConfig::default())
        .with_registry(registry.clone())
        .build()
        .unwrap();
    let ctx = RouteContext::new();
    assert!(router.route("blast off judo", &ctx).await.is_passthrough());

    registry.register(launcher()).unwrap();
    let out = router.handle("blast off judo", &ctx).await;
    assert_eq!(out.route.text(), "launch judo");
    assert_eq!(out.reply(), Some("launched"));
    assert!(router.command_usages().contains(&"blast off <repo>".to_string()));
    assert!(router.validate_rules().is_empty());
}

// ── Handle ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unhandled_command_needs_conversation() {
    let router = plain_router();
    let out = router.handle("deploy judo", &RouteContext::new()).await;
    assert_eq!(out.route.text(), "deploy judo");
    assert!(matches!(out.dispatch, Some(DispatchOutcome::Unhandled { .. })));
    assert!(out.needs_conversation());
}

#[tokio::test]
async fn test_passthrough_needs_conversation() {
    let router = plain_router();
    let out = router.handle("hello", &RouteContext::new()).await;
    assert!(out.dispatch.is_none());
    assert!(out.needs_conversation());
}

// ── Pre-pass transformers ───────────────────────────────────────────

fn conversational_router() -> Router {
    Router::builder(RouterConfig::default())
        .with_default_transformers()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_multi_intent_round_trip() {
    let router = conversational_router();
    let ctx = RouteContext::new().with_conversation("chat-1");
    let message = "deploy judo, then restart the api and then run tests";

    let out = router.route(message, &ctx).await;
    assert_eq!(out.text(), "deploy judo");

    let continuation = out.continuation.unwrap();
    assert_eq!(continuation.remaining, vec!["restart the api", "run tests"]);
    assert_eq!(continuation.total, 3);
    assert!(continuation.sequential);
    assert_eq!(continuation.original, message);

    // Replaying the queue routes each intent in order.
    let mut routed = Vec::new();
    for intent in &continuation.remaining {
        let next = router.route(intent, &ctx).await;
        assert!(next.continuation.is_none());
        routed.push(next.text().to_string());
    }
    assert_eq!(routed, vec!["restart the api", "run tests"]);
}

#[tokio::test]
async fn test_replayed_intent_resolves_pronoun() {
    let router = conversational_router();
    let ctx = RouteContext::new().with_conversation("chat-1");

    let out = router.route("build karate and then deploy it", &ctx).await;
    assert_eq!(out.text(), "build karate");
    let remaining = out.continuation.unwrap().remaining;
    assert_eq!(remaining, vec!["deploy it"]);

    let next = router.route(&remaining[0], &ctx).await;
    assert_eq!(next.text(), "deploy karate");
}

#[tokio::test]
async fn test_compound_question_is_not_split() {
    let router = conversational_router();
    let out = router
        .route("deploy judo and then restart it?", &RouteContext::new())
        .await;
    assert!(out.is_passthrough());
    assert!(out.continuation.is_none());
    assert_eq!(out.text(), "deploy judo and then restart it?");
}

#[tokio::test]
async fn test_again_repeats_last_target() {
    let router = conversational_router();
    let ctx = RouteContext::new().with_conversation("chat-9");
    assert_eq!(router.route_text("restart judo", &ctx).await, "restart judo");
    assert_eq!(router.route_text("restart again", &ctx).await, "restart judo");
}
