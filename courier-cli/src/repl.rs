//! Interactive routing session.

use courier_core::{
    DispatchOutcome, HandleOutcome, RouteContext, RouteDecision, RouteOutcome, Router, Skill,
    TargetKind,
};
use std::io::{self, BufRead, Write};
use std::path::Path;

const CONVERSATION_ID: &str = "repl";

/// Session commands recognized before a line reaches the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Quit,
    Help,
    Metrics,
    ResetMetrics,
    ClearCache,
    Forget,
    Skills,
    Usages,
    Conflicts,
    SetTarget(TargetKind, Option<String>),
}

impl ReplCommand {
    /// Parse a `/command`. Unknown commands return `None` so that slash
    /// commands meant for skills still reach the router.
    pub fn parse(input: &str) -> Option<Self> {
        let rest = input.strip_prefix('/')?;
        let mut parts = rest.split_whitespace();
        let cmd = parts.next()?;
        let arg = parts.next().map(str::to_string);
        let command = match cmd {
            "quit" | "exit" | "q" => Self::Quit,
            "help" | "?" => Self::Help,
            "metrics" => Self::Metrics,
            "reset" => Self::ResetMetrics,
            "clear" => Self::ClearCache,
            "forget" => Self::Forget,
            "skills" => Self::Skills,
            "usages" => Self::Usages,
            "conflicts" => Self::Conflicts,
            "repo" => Self::SetTarget(TargetKind::Repository, arg),
            "org" => Self::SetTarget(TargetKind::Organization, arg),
            _ => return None,
        };
        Some(command)
    }
}

const HELP: &str = "\
Session commands:
  /repo [name]   set or clear the default repository
  /org [name]    set or clear the default organization
  /skills        list registered skills by priority
  /usages        list known command usages
  /metrics       show routing counters
  /reset         reset routing counters
  /clear         clear the route cache
  /forget        forget pronoun state for this session
  /conflicts     show recent skill conflicts
  /quit          exit";

pub async fn run_interactive(
    router: &Router,
    ctx: RouteContext,
    workspace: &Path,
) -> anyhow::Result<()> {
    let mut ctx = ctx.with_conversation(CONVERSATION_ID);
    println!(
        "  Courier | Skills: {} | Workspace: {}",
        router.registry().len(),
        workspace.display()
    );
    println!("  Type /help for commands, /quit to exit\n");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(command) = ReplCommand::parse(input) {
            if command == ReplCommand::Quit {
                break;
            }
            run_command(router, &mut ctx, command);
            continue;
        }

        let handled = router.handle(input, &ctx).await;
        print_handled(&handled);

        // Remaining intents of a compound message run as follow-up turns.
        if let Some(continuation) = handled.route.continuation.clone() {
            for intent in &continuation.remaining {
                println!("  ... {intent}");
                let next = router.handle(intent, &ctx).await;
                print_handled(&next);
            }
        }
    }

    router.stop();
    Ok(())
}

fn run_command(router: &Router, ctx: &mut RouteContext, command: ReplCommand) {
    match command {
        ReplCommand::Quit => {}
        ReplCommand::Help => println!("{HELP}"),
        ReplCommand::Metrics => {
            let m = router.get_metrics();
            println!(
                "cache: {} | pattern: {} | ai: {} | passthrough: {} | uptime: {}s",
                m.cache_hits, m.pattern_hits, m.ai_hits, m.passthroughs, m.uptime_secs
            );
        }
        ReplCommand::ResetMetrics => {
            router.reset_metrics();
            println!("Metrics reset.");
        }
        ReplCommand::ClearCache => {
            let cleared = router.cache_len();
            router.clear_cache();
            println!("Cleared {cleared} cached route(s).");
        }
        ReplCommand::Forget => {
            router.forget_conversation(CONVERSATION_ID);
            println!("Conversation state cleared.");
        }
        ReplCommand::Skills => {
            let skills = router.registry().list_skills();
            println!("Registered skills ({}):", skills.len());
            for skill in skills.iter() {
                println!("  - {} (priority {})", skill.name(), skill.priority());
            }
        }
        ReplCommand::Usages => {
            for usage in router.command_usages() {
                println!("  {usage}");
            }
        }
        ReplCommand::Conflicts => {
            let conflicts = router.registry().recent_conflicts();
            if conflicts.is_empty() {
                println!("No skill conflicts.");
            }
            for conflict in conflicts {
                println!(
                    "  {} '{}': {} -> {}",
                    conflict.at.format("%H:%M:%S"),
                    conflict.command,
                    conflict.skills.join(", "),
                    conflict.selected
                );
            }
        }
        ReplCommand::SetTarget(kind, value) => {
            ctx.targets.remove(&kind);
            match value {
                Some(value) => {
                    println!("Default {kind}: {value}");
                    ctx.targets.insert(kind, value);
                }
                None => println!("Default {kind} cleared."),
            }
        }
    }
}

fn print_handled(handled: &HandleOutcome) {
    println!("{}", describe_outcome(&handled.route));
    if let Some(dispatch) = &handled.dispatch {
        println!("{}", describe_dispatch(dispatch));
    }
}

/// One-line human summary of a routing decision.
pub fn describe_outcome(outcome: &RouteOutcome) -> String {
    match &outcome.decision {
        RouteDecision::Command(command) => format!(
            "-> {} [{}, {:.2}]",
            command.text, command.source, command.confidence
        ),
        RouteDecision::Passthrough { reason } => {
            format!("-- passthrough ({reason}): {}", outcome.message)
        }
    }
}

pub fn describe_dispatch(outcome: &DispatchOutcome) -> String {
    let mut line = match outcome {
        DispatchOutcome::Handled { skill, output, .. } => format!("[{skill}] {}", output.text),
        DispatchOutcome::Unhandled { command } => format!("no skill handles '{command}'"),
        DispatchOutcome::Failed { skill, error, .. } => format!("[{skill}] failed: {error}"),
    };
    if let Some(conflict) = outcome.conflict() {
        line.push_str(&format!(" (also matched: {})", conflict.skills.join(", ")));
    }
    line
}

pub fn dispatch_json(outcome: &DispatchOutcome) -> serde_json::Value {
    match outcome {
        DispatchOutcome::Handled {
            skill,
            output,
            conflict,
        } => serde_json::json!({
            "status": "handled",
            "skill": skill,
            "output": output,
            "conflict": conflict,
        }),
        DispatchOutcome::Unhandled { command } => serde_json::json!({
            "status": "unhandled",
            "command": command,
        }),
        DispatchOutcome::Failed {
            skill,
            error,
            conflict,
        } => serde_json::json!({
            "status": "failed",
            "skill": skill,
            "error": error.to_string(),
            "kind": error.kind(),
            "conflict": conflict,
        }),
    }
}
