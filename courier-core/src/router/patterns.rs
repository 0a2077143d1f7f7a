//! Pattern matcher: ordered `(regex, template)` rules, first match wins.
//!
//! Rule order is the precedence system. A rule whose match set is narrower
//! must come before a broader one (e.g. "deploy X to vercel" before "deploy
//! X"). Each rule carries example phrases so [`PatternMatcher::validate`] can
//! detect a later rule that an earlier one shadows.
//!
//! Captured groups are sanitized before a template sees them, and every
//! produced command goes through the [`AutoContextInjector`].

use super::context::AutoContextInjector;
use crate::error::RouterError;
use crate::sanitize::sanitize;
use crate::types::{RouteContext, RouteSource, RoutedCommand};
use regex::{Captures, Regex, RegexBuilder};
use std::fmt;
use std::sync::Arc;

/// Sanitized capture groups handed to computed templates.
#[derive(Debug, Clone, Default)]
pub struct RuleCaptures {
    groups: Vec<Option<String>>,
}

impl RuleCaptures {
    fn from_captures(caps: &Captures<'_>) -> Self {
        let groups = caps
            .iter()
            .map(|m| {
                m.map(|m| sanitize(m.as_str()))
                    .filter(|s| !s.is_empty())
            })
            .collect();
        Self { groups }
    }

    /// Group `i` (1-based, like regex groups). `None` if absent or empty after
    /// sanitization.
    pub fn get(&self, i: usize) -> Option<&str> {
        self.groups.get(i).and_then(|g| g.as_deref())
    }
}

type TemplateFn = dyn Fn(&RuleCaptures) -> Option<String> + Send + Sync;

/// How a rule turns a match into a command.
#[derive(Clone)]
pub enum CommandTemplate {
    /// A fixed command string.
    Static(String),
    /// Built from capture groups. Returning `None` declines the match and the
    /// matcher moves on to the next rule.
    Computed(Arc<TemplateFn>),
}

impl CommandTemplate {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&RuleCaptures) -> Option<String> + Send + Sync + 'static,
    {
        CommandTemplate::Computed(Arc::new(f))
    }

    /// `verb` followed by group 1 when present.
    pub fn verb_with_optional_target(verb: &'static str) -> Self {
        Self::computed(move |caps| Some(join_target(verb, caps.get(1))))
    }

    fn render(&self, caps: &RuleCaptures) -> Option<String> {
        match self {
            CommandTemplate::Static(s) => Some(s.clone()),
            CommandTemplate::Computed(f) => f(caps),
        }
    }
}

impl fmt::Debug for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandTemplate::Static(s) => f.debug_tuple("Static").field(s).finish(),
            CommandTemplate::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

fn join_target(verb: &str, target: Option<&str>) -> String {
    match target {
        Some(t) => format!("{verb} {t}"),
        None => verb.to_string(),
    }
}

/// One routing rule.
#[derive(Debug, Clone)]
pub struct PatternRule {
    name: String,
    matcher: Regex,
    template: CommandTemplate,
    usage: String,
    examples: Vec<String>,
}

impl PatternRule {
    /// Compile a rule. Patterns are matched case-insensitively.
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        template: CommandTemplate,
    ) -> Result<Self, RouterError> {
        let name = name.into();
        let matcher = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| RouterError::InvalidRule {
                rule: name.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            name,
            matcher,
            template,
            usage: String::new(),
            examples: Vec::new(),
        })
    }

    /// Command usage shown to the generative router, e.g. `deploy <repo>`.
    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    /// Phrases this rule must match; used for order validation.
    pub fn with_examples(mut self, examples: &[&str]) -> Self {
        self.examples = examples.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn usage(&self) -> &str {
        &self.usage
    }

    pub fn examples(&self) -> &[String] {
        &self.examples
    }

    pub fn is_match(&self, message: &str) -> bool {
        self.matcher.is_match(message)
    }

    /// Render this rule's command for `message`, before auto-context.
    pub fn apply(&self, message: &str) -> Option<String> {
        let caps = self.matcher.captures(message)?;
        let command = self.template.render(&RuleCaptures::from_captures(&caps))?;
        let command = command.split_whitespace().collect::<Vec<_>>().join(" ");
        if command.is_empty() {
            None
        } else {
            Some(command)
        }
    }
}

/// A successful match.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    pub rule: String,
    pub command: RoutedCommand,
}

/// Ordered rule list plus the injector applied to every result.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    rules: Vec<PatternRule>,
    injector: AutoContextInjector,
}

impl PatternMatcher {
    pub fn new(rules: Vec<PatternRule>, injector: AutoContextInjector) -> Self {
        Self { rules, injector }
    }

    /// The built-in rule table.
    pub fn builtin() -> Result<Self, RouterError> {
        Ok(Self::new(builtin_rules()?, AutoContextInjector::new()))
    }

    /// Append rules after the existing ones (lowest precedence).
    pub fn extend(&mut self, rules: impl IntoIterator<Item = PatternRule>) {
        self.rules.extend(rules);
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    pub fn injector(&self) -> &AutoContextInjector {
        &self.injector
    }

    pub fn injector_mut(&mut self) -> &mut AutoContextInjector {
        &mut self.injector
    }

    /// First matching rule's command, completed from context.
    ///
    /// Pure function of `(message, ctx)` and the rule list.
    pub fn match_message(&self, message: &str, ctx: &RouteContext) -> Option<PatternMatch> {
        self.match_with(message, ctx, &[])
    }

    /// [`match_message`](Self::match_message) with `extra` rules tried after
    /// this matcher's own.
    pub fn match_with(
        &self,
        message: &str,
        ctx: &RouteContext,
        extra: &[PatternRule],
    ) -> Option<PatternMatch> {
        let message = message.trim();
        self.rules.iter().chain(extra).find_map(|rule| {
            let command = rule.apply(message)?;
            let command = self.injector.inject(&command, ctx);
            Some(PatternMatch {
                rule: rule.name.clone(),
                command: RoutedCommand::new(command, RouteSource::Pattern, 1.0),
            })
        })
    }

    /// Deduplicated usage strings, in rule order.
    pub fn usages(&self) -> Vec<String> {
        self.usages_with(&[])
    }

    pub fn usages_with(&self, extra: &[PatternRule]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for rule in self.rules.iter().chain(extra) {
            if !rule.usage.is_empty() && !out.contains(&rule.usage) {
                out.push(rule.usage.clone());
            }
        }
        out
    }

    /// Check the narrower-before-broader contract against rule examples.
    ///
    /// Reports every example an earlier rule already matches, and every
    /// example its own rule fails to match.
    pub fn validate(&self) -> Vec<RouterError> {
        self.validate_with(&[])
    }

    pub fn validate_with(&self, extra: &[PatternRule]) -> Vec<RouterError> {
        let rules: Vec<&PatternRule> = self.rules.iter().chain(extra).collect();
        let mut problems = Vec::new();
        for (i, rule) in rules.iter().enumerate() {
            for example in &rule.examples {
                if !rule.is_match(example) {
                    problems.push(RouterError::InvalidRule {
                        rule: rule.name.clone(),
                        reason: format!("example \"{example}\" does not match its own pattern"),
                    });
                    continue;
                }
                if let Some(earlier) = rules[..i]
                    .iter()
                    .find(|earlier| earlier.apply(example).is_some())
                {
                    problems.push(RouterError::ShadowedRule {
                        earlier: earlier.name.clone(),
                        later: rule.name.clone(),
                        example: example.clone(),
                    });
                }
            }
        }
        problems
    }
}

const PLATFORMS: &str = "vercel|netlify|fly|railway|render|heroku";
const ENVIRONMENTS: &str = "production|prod|staging|preview|dev";

fn builtin_rules() -> Result<Vec<PatternRule>, RouterError> {
    Ok(vec![
        // ── Status queries ──────────────────────────────────────────
        PatternRule::new(
            "deadlines",
            r"^(?:what are |show (?:me )?|list )?(?:the |my )?(?:upcoming )?deadlines$",
            CommandTemplate::Static("deadlines".into()),
        )?
        .with_usage("deadlines")
        .with_examples(&["what are the deadlines", "deadlines", "show me my deadlines"]),
        PatternRule::new(
            "status",
            r"^(?:what(?:'s| is) the |show (?:me )?the |check )?status(?: (?:of|for|on) (\S+))?$",
            CommandTemplate::verb_with_optional_target("status"),
        )?
        .with_usage("status <repo>")
        .with_examples(&["status", "status of judo", "what's the status of judo"]),
        PatternRule::new(
            "health",
            r"^(?:run (?:a )?|check )?health ?check(?: (?:on|for|of) (\S+))?$",
            CommandTemplate::verb_with_optional_target("health"),
        )?
        .with_usage("health <repo>")
        .with_examples(&["healthcheck", "run a health check on judo"]),
        // ── Structured entity lookups ───────────────────────────────
        PatternRule::new(
            "pr_list",
            r"^(?:show|list|get)(?: me)?(?: the| my| all)?(?: open)? (?:prs|pull requests)(?: (?:in|for|on) (\S+))?$",
            CommandTemplate::verb_with_optional_target("prs"),
        )?
        .with_usage("prs <repo>")
        .with_examples(&["show open prs", "list pull requests in judo"]),
        // Narrower than issue_list: must precede it.
        PatternRule::new(
            "issue_create",
            r"^(?:create|open|file) (?:an? )?(?:new )?issue (?:in|on|for) (\S+?)[:\s]+(.+)$",
            CommandTemplate::computed(|caps| {
                Some(format!("issue create {} {}", caps.get(1)?, caps.get(2)?))
            }),
        )?
        .with_usage("issue create <repo> <title>")
        .with_examples(&["create an issue in judo: login page is broken"]),
        PatternRule::new(
            "issue_list",
            r"^(?:show|list|get)(?: me)?(?: the| my| all)?(?: open)? issues(?: (?:in|for|on) (\S+))?$",
            CommandTemplate::verb_with_optional_target("issues"),
        )?
        .with_usage("issues <repo>")
        .with_examples(&["show open issues", "list issues in judo"]),
        PatternRule::new(
            "company_lookup",
            r"^(?:look ?up|find|search(?: for)?) (?:the )?company (.+)$",
            CommandTemplate::computed(|caps| Some(format!("company {}", caps.get(1)?))),
        )?
        .with_usage("company <name>")
        .with_examples(&["look up company acme corp", "find company globex"]),
        PatternRule::new(
            "expenses",
            r"^(?:show|list|get)(?: me)?(?: the| my)? (?:expenses|receipts)(?: (?:for|from) (.+))?$",
            CommandTemplate::verb_with_optional_target("expenses"),
        )?
        .with_usage("expenses <organization>")
        .with_examples(&["show my expenses", "list receipts for acme"]),
        // ── Remote build / deploy ───────────────────────────────────
        // Platform and environment rules are narrower than bare deploy.
        PatternRule::new(
            "deploy_platform",
            &format!(r"^(?:deploy|ship) (\S+) (?:to|on) ({PLATFORMS})$"),
            CommandTemplate::computed(|caps| {
                Some(format!(
                    "{} deploy {}",
                    caps.get(2)?.to_lowercase(),
                    caps.get(1)?
                ))
            }),
        )?
        .with_usage("<platform> deploy <repo>")
        .with_examples(&["deploy judo to vercel", "ship judo on netlify"]),
        PatternRule::new(
            "deploy_environment",
            &format!(r"^(?:deploy|ship) (\S+) to ({ENVIRONMENTS})$"),
            CommandTemplate::computed(|caps| {
                let env = match caps.get(2)?.to_lowercase().as_str() {
                    "prod" => "production".to_string(),
                    other => other.to_string(),
                };
                Some(format!("deploy {} {env}", caps.get(1)?))
            }),
        )?
        .with_usage("deploy <repo> <environment>")
        .with_examples(&["deploy judo to staging", "deploy judo to prod"]),
        PatternRule::new(
            "deploy",
            r"^(?:deploy|ship)(?: (\S+))?$",
            CommandTemplate::verb_with_optional_target("deploy"),
        )?
        .with_usage("deploy <repo>")
        .with_examples(&["deploy", "deploy judo"]),
        PatternRule::new(
            "restart",
            r"^(?:restart|reboot|bounce)(?: (.+))?$",
            CommandTemplate::verb_with_optional_target("restart"),
        )?
        .with_usage("restart <repo>")
        .with_examples(&["restart", "restart judo", "reboot the api server"]),
        PatternRule::new(
            "logs",
            r"^(?:show |get |tail |fetch )?(?:me )?(?:the )?logs(?: (?:for|of|from) (\S+))?$",
            CommandTemplate::verb_with_optional_target("logs"),
        )?
        .with_usage("logs <repo>")
        .with_examples(&["logs", "show me the logs for judo", "tail logs"]),
        PatternRule::new(
            "run_tests",
            r"^(?:run|execute) (?:the )?(?:unit )?tests?(?: (?:for|on|in) (\S+))?$",
            CommandTemplate::verb_with_optional_target("run tests"),
        )?
        .with_usage("run tests <repo>")
        .with_examples(&["run tests", "run the tests for judo"]),
        PatternRule::new(
            "rollback",
            r"^roll ?back(?: (\S+))?$",
            CommandTemplate::verb_with_optional_target("rollback"),
        )?
        .with_usage("rollback <repo>")
        .with_examples(&["rollback", "roll back judo"]),
        PatternRule::new(
            "build",
            r"^(?:build|compile) (\S+)$",
            CommandTemplate::computed(|caps| Some(format!("build {}", caps.get(1)?))),
        )?
        .with_usage("build <repo>")
        .with_examples(&["build judo"]),
        // ── Reminders ───────────────────────────────────────────────
        PatternRule::new(
            "remind",
            r"^remind me (?:to )?(.+)$",
            CommandTemplate::computed(|caps| Some(format!("remind {}", caps.get(1)?))),
        )?
        .with_usage("remind <what>")
        .with_examples(&["remind me to renew the domain"]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn matcher() -> PatternMatcher {
        PatternMatcher::builtin().unwrap()
    }

    fn route(msg: &str) -> Option<String> {
        matcher()
            .match_message(msg, &RouteContext::new())
            .map(|m| m.command.text)
    }

    #[test]
    fn test_builtin_rules_are_ordered() {
        let problems = matcher().validate();
        assert!(problems.is_empty(), "rule order problems: {problems:?}");
    }

    #[test]
    fn test_platform_deploy_precedes_generic_deploy() {
        assert_eq!(route("deploy judo to vercel").as_deref(), Some("vercel deploy judo"));
        assert_eq!(route("Deploy judo to Vercel").as_deref(), Some("vercel deploy judo"));
        assert_eq!(route("deploy judo").as_deref(), Some("deploy judo"));
    }

    #[test]
    fn test_environment_deploy() {
        assert_eq!(route("deploy judo to prod").as_deref(), Some("deploy judo production"));
        assert_eq!(route("deploy judo to staging").as_deref(), Some("deploy judo staging"));
    }

    #[test]
    fn test_bare_deploy_with_context() {
        let ctx = RouteContext::new().with_repository("judo");
        let m = matcher().match_message("deploy", &ctx).unwrap();
        assert_eq!(m.rule, "deploy");
        assert_eq!(m.command.text, "deploy judo");
        assert_eq!(m.command.source, RouteSource::Pattern);
    }

    #[test]
    fn test_restart_capture_is_sanitized() {
        assert_eq!(
            route("restart the server; rm -rf /").as_deref(),
            Some("restart the server rm -rf /")
        );
    }

    #[test]
    fn test_wh_command_matches() {
        assert_eq!(route("what are the deadlines").as_deref(), Some("deadlines"));
        assert_eq!(route("what's the status of judo").as_deref(), Some("status judo"));
    }

    #[test]
    fn test_issue_create_before_issue_list() {
        assert_eq!(
            route("create an issue in judo: login page is broken").as_deref(),
            Some("issue create judo login page is broken")
        );
        assert_eq!(route("list issues in judo").as_deref(), Some("issues judo"));
    }

    #[test]
    fn test_computed_template_declines_on_empty_capture() {
        // The capture sanitizes to nothing, so the rule declines.
        assert_eq!(route("remind me to ;;;"), None);
    }

    #[test]
    fn test_no_match() {
        assert_eq!(route("tell me a joke"), None);
        assert_eq!(route("deploy judo and karate now"), None);
    }

    #[test]
    fn test_deterministic() {
        let m = matcher();
        let ctx = RouteContext::new().with_repository("judo");
        for msg in ["deploy", "run tests", "show open prs", "nothing here"] {
            assert_eq!(m.match_message(msg, &ctx), m.match_message(msg, &ctx));
        }
    }

    #[test]
    fn test_validate_detects_shadowing() {
        let broad = PatternRule::new(
            "deploy_any",
            r"^deploy (.+)$",
            CommandTemplate::verb_with_optional_target("deploy"),
        )
        .unwrap()
        .with_examples(&["deploy judo"]);
        let narrow = PatternRule::new(
            "deploy_vercel",
            r"^deploy (\S+) to vercel$",
            CommandTemplate::computed(|c| Some(format!("vercel deploy {}", c.get(1)?))),
        )
        .unwrap()
        .with_examples(&["deploy judo to vercel"]);
        let m = PatternMatcher::new(vec![broad, narrow], AutoContextInjector::new());
        let problems = m.validate();
        assert_eq!(
            problems,
            vec![RouterError::ShadowedRule {
                earlier: "deploy_any".into(),
                later: "deploy_vercel".into(),
                example: "deploy judo to vercel".into(),
            }]
        );
    }

    #[test]
    fn test_validate_detects_bad_example() {
        let rule = PatternRule::new("x", r"^x$", CommandTemplate::Static("x".into()))
            .unwrap()
            .with_examples(&["y"]);
        let m = PatternMatcher::new(vec![rule], AutoContextInjector::new());
        assert!(matches!(m.validate()[0], RouterError::InvalidRule { .. }));
    }

    #[test]
    fn test_invalid_regex() {
        let err = PatternRule::new("bad", r"^(unclosed", CommandTemplate::Static("x".into()))
            .unwrap_err();
        assert!(matches!(err, RouterError::InvalidRule { .. }));
    }

    #[test]
    fn test_usages_deduplicated_in_order() {
        let usages = matcher().usages();
        assert_eq!(usages[0], "deadlines");
        let deploys = usages.iter().filter(|u| *u == "deploy <repo>").count();
        assert_eq!(deploys, 1);
    }

    #[test]
    fn test_extend_appends_with_lowest_precedence() {
        let mut m = matcher();
        let rule = PatternRule::new(
            "deploy_everything",
            r"^deploy everything$",
            CommandTemplate::Static("deploy --all".into()),
        )
        .unwrap()
        .with_examples(&["deploy everything"]);
        m.extend([rule]);
        // Shadowed by the built-in bare deploy rule.
        assert_eq!(
            m.match_message("deploy everything", &RouteContext::new())
                .unwrap()
                .rule,
            "deploy"
        );
        assert_eq!(m.validate().len(), 1);
    }

    #[test]
    fn test_extra_rules_are_tried_after_own() {
        let m = matcher();
        let extra = vec![
            PatternRule::new(
                "blast",
                r"^blast off (\S+)$",
                CommandTemplate::computed(|caps| caps.get(1).map(|repo| format!("launch {repo}"))),
            )
            .unwrap()
            .with_usage("blast off <repo>"),
        ];
        let ctx = RouteContext::new();
        assert!(m.match_message("blast off judo", &ctx).is_none());
        let found = m.match_with("blast off judo", &ctx, &extra).unwrap();
        assert_eq!(found.rule, "blast");
        assert_eq!(found.command.text, "launch judo");
        // Own rules still win.
        assert_eq!(m.match_with("deploy judo", &ctx, &extra).unwrap().rule, "deploy");
        assert!(m.usages_with(&extra).contains(&"blast off <repo>".to_string()));
    }
}
