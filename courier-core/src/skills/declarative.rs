//! Skills declared in configuration.
//!
//! A declarative skill matches commands with configured regexes and answers
//! with a reply template, so a deployment can wire up commands without
//! compiling a skill body. It can also contribute natural-language routes.
//!
//! ```toml
//! [[skills]]
//! name = "deployer"
//! priority = 30
//! patterns = ['^deploy\b']
//! usage = ["deploy <repo>"]
//! reply = "Deploying {target}"
//!
//! [[skills.routes]]
//! pattern = '^push (\S+) live$'
//! command = "deploy {1}"
//! usage = "push <repo> live"
//! ```

use super::{Skill, SkillOutput};
use crate::error::SkillError;
use crate::router::patterns::{CommandTemplate, PatternRule, RuleCaptures};
use crate::types::{RouteContext, RoutedCommand, RouteSource, TargetKind};
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Configuration of one declarative skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclarativeSkillConfig {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    /// Command regexes, matched case-insensitively.
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub usage: Vec<String>,
    /// Reply template. Placeholders: `{command}`, `{verb}`, `{args}`,
    /// `{target}`, `{repository}`, `{organization}`.
    #[serde(default = "default_reply")]
    pub reply: String,
    #[serde(default)]
    pub routes: Vec<DeclarativeRoute>,
}

fn default_reply() -> String {
    "ok: {command}".to_string()
}

/// A natural-language route contributed to the pattern matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclarativeRoute {
    pub pattern: String,
    /// Command template; `{1}`, `{2}`... are capture groups.
    pub command: String,
    /// Usage line for the generative router prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

/// A skill built from [`DeclarativeSkillConfig`].
#[derive(Debug, Clone)]
pub struct DeclarativeSkill {
    config: DeclarativeSkillConfig,
    patterns: Vec<Regex>,
}

impl DeclarativeSkill {
    pub fn from_config(config: DeclarativeSkillConfig) -> Result<Self, SkillError> {
        if config.patterns.is_empty() {
            return Err(SkillError::InvalidPattern {
                name: config.name.clone(),
                reason: "at least one command pattern is required".into(),
            });
        }
        let patterns = config
            .patterns
            .iter()
            .map(|p| compile(&config.name, p))
            .collect::<Result<Vec<_>, _>>()?;
        // Surface bad route regexes at load time rather than at router build.
        for route in &config.routes {
            compile(&config.name, &route.pattern)?;
        }
        Ok(Self { config, patterns })
    }

    pub fn config(&self) -> &DeclarativeSkillConfig {
        &self.config
    }

    fn render(&self, command: &str, ctx: &RouteContext) -> String {
        let parsed = RoutedCommand::new(command, RouteSource::Pattern, 1.0);
        let target = parsed
            .args
            .last()
            .map(String::as_str)
            .or_else(|| ctx.target(TargetKind::Repository))
            .or_else(|| ctx.target(TargetKind::Organization))
            .unwrap_or_default();
        self.config
            .reply
            .replace("{command}", command)
            .replace("{verb}", &parsed.verb)
            .replace("{args}", &parsed.args.join(" "))
            .replace("{target}", target)
            .replace(
                "{repository}",
                ctx.target(TargetKind::Repository).unwrap_or_default(),
            )
            .replace(
                "{organization}",
                ctx.target(TargetKind::Organization).unwrap_or_default(),
            )
    }
}

fn compile(skill: &str, pattern: &str) -> Result<Regex, SkillError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| SkillError::InvalidPattern {
            name: skill.to_string(),
            reason: e.to_string(),
        })
}

fn fill_groups(template: &str, caps: &RuleCaptures) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if after[..close].chars().all(|c| c.is_ascii_digit()) && close > 0 => {
                let index: usize = after[..close].parse().ok()?;
                out.push_str(caps.get(index)?);
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Some(out)
}

#[async_trait]
impl Skill for DeclarativeSkill {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn priority(&self) -> i32 {
        self.config.priority
    }

    fn command_patterns(&self) -> &[Regex] {
        &self.patterns
    }

    fn usage(&self) -> Vec<String> {
        self.config.usage.clone()
    }

    fn routing_rules(&self) -> Vec<PatternRule> {
        self.config
            .routes
            .iter()
            .enumerate()
            .filter_map(|(i, route)| {
                let template = route.command.clone();
                let examples: Vec<&str> = route.examples.iter().map(String::as_str).collect();
                PatternRule::new(
                    format!("{}#{}", self.config.name, i + 1),
                    &route.pattern,
                    CommandTemplate::computed(move |caps| fill_groups(&template, caps)),
                )
                .ok()
                .map(|rule| {
                    rule.with_usage(route.usage.clone().unwrap_or_default())
                        .with_examples(&examples)
                })
            })
            .collect()
    }

    async fn execute(&self, command: &str, ctx: &RouteContext) -> Result<SkillOutput, SkillError> {
        let reply = self.render(command, ctx);
        Ok(SkillOutput::text(reply).with_data(serde_json::json!({
            "skill": self.config.name,
            "command": command,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::context::AutoContextInjector;
    use crate::router::patterns::PatternMatcher;

    fn config(name: &str, patterns: &[&str], reply: &str) -> DeclarativeSkillConfig {
        DeclarativeSkillConfig {
            name: name.into(),
            priority: 0,
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            usage: vec![],
            reply: reply.into(),
            routes: vec![],
        }
    }

    #[test]
    fn test_invalid_pattern() {
        let err = DeclarativeSkill::from_config(config("bad", &["^(deploy"], "x")).unwrap_err();
        assert_eq!(err.kind(), "invalid_pattern");
        let err = DeclarativeSkill::from_config(config("empty", &[], "x")).unwrap_err();
        assert_eq!(err.kind(), "invalid_pattern");
    }

    #[test]
    fn test_can_handle_case_insensitive() {
        let skill = DeclarativeSkill::from_config(config("d", &[r"^deploy\b"], "x")).unwrap();
        assert!(skill.can_handle("Deploy judo"));
        assert!(!skill.can_handle("redeploy judo"));
    }

    #[tokio::test]
    async fn test_reply_placeholders() {
        let skill = DeclarativeSkill::from_config(config(
            "d",
            &["^deploy"],
            "{verb}: {args} -> {target} ({organization})",
        ))
        .unwrap();
        let ctx = RouteContext::new().with_organization("acme");
        let out = skill.execute("deploy judo production", &ctx).await.unwrap();
        assert_eq!(out.text, "deploy: judo production -> production (acme)");
        assert_eq!(out.data.unwrap()["skill"], "d");
    }

    #[tokio::test]
    async fn test_target_falls_back_to_context() {
        let skill = DeclarativeSkill::from_config(config("d", &["^status"], "status of {target}"))
            .unwrap();
        let ctx = RouteContext::new().with_repository("judo");
        assert_eq!(skill.execute("status", &ctx).await.unwrap().text, "status of judo");
    }

    #[test]
    fn test_routes_become_rules() {
        let mut cfg = config("d", &["^deploy"], "x");
        cfg.routes.push(DeclarativeRoute {
            pattern: r"^push (\S+) live$".into(),
            command: "deploy {1}".into(),
            usage: Some("push <repo> live".into()),
            examples: vec!["push judo live".into()],
        });
        let skill = DeclarativeSkill::from_config(cfg).unwrap();
        let rules = skill.routing_rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name(), "d#1");
        assert_eq!(rules[0].usage(), "push <repo> live");

        let matcher = PatternMatcher::new(rules, AutoContextInjector::new());
        let m = matcher
            .match_message("push judo live", &RouteContext::new())
            .unwrap();
        assert_eq!(m.command.text, "deploy judo");
        assert!(matcher.validate().is_empty());
    }

    #[test]
    fn test_bad_route_pattern_rejected() {
        let mut cfg = config("d", &["^deploy"], "x");
        cfg.routes.push(DeclarativeRoute {
            pattern: "(".into(),
            command: "deploy".into(),
            usage: None,
            examples: vec![],
        });
        assert!(DeclarativeSkill::from_config(cfg).is_err());
    }

    #[test]
    fn test_fill_groups_keeps_literal_braces() {
        let rule = PatternRule::new(
            "r",
            r"^x (\S+)$",
            CommandTemplate::computed(|caps| fill_groups("a {1} {name} {}", caps)),
        )
        .unwrap();
        assert_eq!(rule.apply("x y").as_deref(), Some("a y {name} {}"));
    }
}
