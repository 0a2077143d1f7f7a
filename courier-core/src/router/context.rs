//! Auto-context injection: fills in a missing target from the conversation.
//!
//! Only exact bare-verb shapes are completed, so injecting into a command that
//! already carries an argument is a no-op and the operation is idempotent.

use crate::sanitize::sanitize;
use crate::types::{RouteContext, TargetKind};

/// Bare command shapes that need a target, and which target completes them.
const DEFAULT_SHAPES: &[(&str, TargetKind)] = &[
    ("deploy", TargetKind::Repository),
    ("restart", TargetKind::Repository),
    ("logs", TargetKind::Repository),
    ("run tests", TargetKind::Repository),
    ("status", TargetKind::Repository),
    ("rollback", TargetKind::Repository),
    ("health", TargetKind::Repository),
    ("issues", TargetKind::Repository),
    ("prs", TargetKind::Repository),
    ("expenses", TargetKind::Organization),
    ("company", TargetKind::Organization),
];

/// Appends a default target to argument-less commands.
#[derive(Debug, Clone)]
pub struct AutoContextInjector {
    shapes: Vec<(String, TargetKind)>,
}

impl AutoContextInjector {
    pub fn new() -> Self {
        Self {
            shapes: DEFAULT_SHAPES
                .iter()
                .map(|(shape, kind)| (shape.to_string(), *kind))
                .collect(),
        }
    }

    /// Register an extra bare shape. Reached through
    /// `RouterBuilder::with_context_shape`.
    pub fn add_shape(&mut self, shape: &str, kind: TargetKind) {
        let shape = normalize(shape);
        if !shape.is_empty() && !self.shapes.iter().any(|(s, _)| *s == shape) {
            self.shapes.push((shape, kind));
        }
    }

    /// The target kind a bare command needs, if it is one of the known shapes.
    pub fn required_target(&self, command: &str) -> Option<TargetKind> {
        let normalized = normalize(command);
        self.shapes
            .iter()
            .find(|(shape, _)| *shape == normalized)
            .map(|(_, kind)| *kind)
    }

    /// Complete `command` with the context's default target when it is a bare
    /// shape and the context has one; otherwise return it unchanged.
    pub fn inject(&self, command: &str, ctx: &RouteContext) -> String {
        let Some(kind) = self.required_target(command) else {
            return command.to_string();
        };
        let target = match ctx.target(kind).map(sanitize) {
            Some(t) if !t.is_empty() => t,
            _ => return command.to_string(),
        };
        format!("{} {}", command.trim(), target)
    }
}

impl Default for AutoContextInjector {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(command: &str) -> String {
    command
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo_ctx() -> RouteContext {
        RouteContext::new().with_repository("judo")
    }

    #[test]
    fn test_bare_deploy_gets_repository() {
        let injector = AutoContextInjector::new();
        assert_eq!(injector.inject("deploy", &repo_ctx()), "deploy judo");
        assert_eq!(injector.inject("Run  Tests", &repo_ctx()), "Run  Tests judo");
    }

    #[test]
    fn test_complete_command_is_untouched() {
        let injector = AutoContextInjector::new();
        assert_eq!(injector.inject("deploy karate", &repo_ctx()), "deploy karate");
        assert_eq!(injector.inject("vercel deploy judo", &repo_ctx()), "vercel deploy judo");
    }

    #[test]
    fn test_no_context_is_untouched() {
        let injector = AutoContextInjector::new();
        assert_eq!(injector.inject("deploy", &RouteContext::new()), "deploy");
    }

    #[test]
    fn test_wrong_target_kind_is_untouched() {
        let injector = AutoContextInjector::new();
        let ctx = RouteContext::new().with_organization("acme");
        assert_eq!(injector.inject("deploy", &ctx), "deploy");
        assert_eq!(injector.inject("expenses", &ctx), "expenses acme");
    }

    #[test]
    fn test_idempotent() {
        let injector = AutoContextInjector::new();
        let ctx = repo_ctx();
        let once = injector.inject("logs", &ctx);
        assert_eq!(injector.inject(&once, &ctx), once);
    }

    #[test]
    fn test_target_is_sanitized() {
        let injector = AutoContextInjector::new();
        let ctx = RouteContext::new().with_repository("judo;reboot");
        assert_eq!(injector.inject("deploy", &ctx), "deploy judoreboot");

        let ctx = RouteContext::new().with_repository("$&|");
        assert_eq!(injector.inject("deploy", &ctx), "deploy");
    }

    #[test]
    fn test_add_shape() {
        let mut injector = AutoContextInjector::new();
        assert!(injector.required_target("invoices").is_none());
        injector.add_shape("Invoices", TargetKind::Organization);
        let ctx = RouteContext::new().with_organization("acme");
        assert_eq!(injector.inject("invoices", &ctx), "invoices acme");
    }
}
