//! Skill registry and priority dispatcher.
//!
//! Skills are kept in a copy-on-write snapshot ordered by descending priority
//! (ties keep registration order). Dispatch reads one snapshot for its whole
//! run, so a concurrent `register` or `reload` never exposes a half-updated
//! list.
//!
//! When several skills accept the same command the first one runs and the
//! overlap is reported as a [`SkillConflict`]: logged, counted, kept in a
//! bounded ring, and broadcast to subscribers.

pub mod declarative;
pub mod types;

pub use declarative::{DeclarativeSkill, DeclarativeSkillConfig};
pub use types::{DispatchOutcome, SkillConflict, SkillOutput};

use crate::error::SkillError;
use crate::router::patterns::PatternRule;
use crate::types::RouteContext;
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Conflicts retained for inspection.
const RECENT_CONFLICT_LIMIT: usize = 100;

/// Buffered conflict events per subscriber.
const CONFLICT_CHANNEL_CAPACITY: usize = 64;

/// A registered command handler.
#[async_trait]
pub trait Skill: Send + Sync {
    /// Unique name.
    fn name(&self) -> &str;

    /// Higher runs first when several skills match.
    fn priority(&self) -> i32 {
        0
    }

    /// Command shapes this skill accepts, tried in order.
    fn command_patterns(&self) -> &[Regex];

    /// Usage lines offered to the generative router, e.g. `deploy <repo>`.
    fn usage(&self) -> Vec<String> {
        Vec::new()
    }

    /// Natural-language rules this skill contributes to the pattern matcher.
    fn routing_rules(&self) -> Vec<PatternRule> {
        Vec::new()
    }

    fn can_handle(&self, command: &str) -> bool {
        self.command_patterns().iter().any(|p| p.is_match(command))
    }

    /// Run the command.
    async fn execute(&self, command: &str, ctx: &RouteContext) -> Result<SkillOutput, SkillError>;

    /// Maximum execution time before the dispatcher gives up.
    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
}

type Snapshot = Arc<Vec<Arc<dyn Skill>>>;

/// Skills in dispatch order, with the routing rules they contribute.
/// Replaced wholesale on every change.
struct Catalog {
    skills: Snapshot,
    rules: Arc<Vec<PatternRule>>,
}

impl Catalog {
    fn new(mut skills: Vec<Arc<dyn Skill>>) -> Self {
        sort_by_priority(&mut skills);
        let rules = skills.iter().flat_map(|s| s.routing_rules()).collect();
        Self {
            skills: Arc::new(skills),
            rules: Arc::new(rules),
        }
    }
}

/// Holds skills and dispatches commands to them.
pub struct SkillRegistry {
    catalog: RwLock<Catalog>,
    generation: AtomicU64,
    conflict_tx: broadcast::Sender<SkillConflict>,
    conflict_count: AtomicU64,
    recent_conflicts: Mutex<VecDeque<SkillConflict>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        let (conflict_tx, _) = broadcast::channel(CONFLICT_CHANNEL_CAPACITY);
        Self {
            catalog: RwLock::new(Catalog::new(Vec::new())),
            generation: AtomicU64::new(0),
            conflict_tx,
            conflict_count: AtomicU64::new(0),
            recent_conflicts: Mutex::new(VecDeque::new()),
        }
    }

    /// Register a skill. Returns error if a skill with the same name exists.
    pub fn register(&self, skill: Arc<dyn Skill>) -> Result<(), SkillError> {
        let mut catalog = self.write_catalog();
        let name = skill.name().to_string();
        if catalog.skills.iter().any(|s| s.name() == name) {
            return Err(SkillError::AlreadyRegistered { name });
        }
        let mut next: Vec<Arc<dyn Skill>> = catalog.skills.as_ref().clone();
        next.push(skill);
        *catalog = Catalog::new(next);
        self.generation.fetch_add(1, Ordering::SeqCst);
        debug!(skill = %name, "Registered skill");
        Ok(())
    }

    /// Remove a skill by name.
    pub fn unregister(&self, name: &str) -> Result<(), SkillError> {
        let mut catalog = self.write_catalog();
        if !catalog.skills.iter().any(|s| s.name() == name) {
            return Err(SkillError::NotFound {
                name: name.to_string(),
            });
        }
        let next: Vec<Arc<dyn Skill>> = catalog
            .skills
            .iter()
            .filter(|s| s.name() != name)
            .cloned()
            .collect();
        *catalog = Catalog::new(next);
        self.generation.fetch_add(1, Ordering::SeqCst);
        debug!(skill = %name, "Unregistered skill");
        Ok(())
    }

    /// Replace every skill at once. Dispatches already running keep the old
    /// list. On a duplicate name nothing changes.
    pub fn reload(&self, skills: Vec<Arc<dyn Skill>>) -> Result<(), SkillError> {
        for (i, skill) in skills.iter().enumerate() {
            if skills[..i].iter().any(|s| s.name() == skill.name()) {
                return Err(SkillError::AlreadyRegistered {
                    name: skill.name().to_string(),
                });
            }
        }
        let count = skills.len();
        let next = Catalog::new(skills);
        *self.write_catalog() = next;
        self.generation.fetch_add(1, Ordering::SeqCst);
        info!(skills = count, "Reloaded skill registry");
        Ok(())
    }

    /// Read-only snapshot, in dispatch order.
    pub fn list_skills(&self) -> Snapshot {
        self.read_catalog().skills.clone()
    }

    /// Routing rules contributed by the current skills, in dispatch order.
    pub fn routing_rules(&self) -> Arc<Vec<PatternRule>> {
        self.read_catalog().rules.clone()
    }

    /// Bumped on every register, unregister and reload.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn skill_names(&self) -> Vec<String> {
        self.list_skills()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Skill>> {
        self.list_skills().iter().find(|s| s.name() == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.list_skills().len()
    }

    pub fn is_empty(&self) -> bool {
        self.list_skills().is_empty()
    }

    /// Whether any skill accepts `command`.
    pub fn can_handle(&self, command: &str) -> bool {
        let command = command.trim();
        self.list_skills().iter().any(|s| s.can_handle(command))
    }

    /// Names of every skill that accepts `command`, in dispatch order.
    pub fn matching_skills(&self, command: &str) -> Vec<String> {
        let command = command.trim();
        self.list_skills()
            .iter()
            .filter(|s| s.can_handle(command))
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Deduplicated usage lines across all skills, in dispatch order.
    pub fn command_usages(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for skill in self.list_skills().iter() {
            for usage in skill.usage() {
                if !usage.trim().is_empty() && !out.contains(&usage) {
                    out.push(usage);
                }
            }
        }
        out
    }

    /// Run `command` on the highest-priority skill that accepts it.
    pub async fn dispatch(&self, command: &str, ctx: &RouteContext) -> DispatchOutcome {
        let command = command.trim();
        let snapshot = self.list_skills();
        let matches: Vec<&Arc<dyn Skill>> =
            snapshot.iter().filter(|s| s.can_handle(command)).collect();

        let Some(selected) = matches.first().copied() else {
            debug!(command, "No skill handles command");
            return DispatchOutcome::Unhandled {
                command: command.to_string(),
            };
        };
        let name = selected.name().to_string();

        let conflict = if matches.len() > 1 {
            let skills: Vec<String> = matches.iter().map(|s| s.name().to_string()).collect();
            Some(self.report_conflict(command, skills, &name))
        } else {
            None
        };

        let timeout = selected.timeout();
        info!(skill = %name, command, timeout_secs = timeout.as_secs(), "Dispatching command");

        let result = match tokio::time::timeout(timeout, selected.execute(command, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(SkillError::Timeout {
                name: name.clone(),
                timeout_secs: timeout.as_secs(),
            }),
        };

        match result {
            Ok(output) => DispatchOutcome::Handled {
                skill: name,
                output,
                conflict,
            },
            Err(error) => {
                warn!(skill = %name, kind = error.kind(), error = %error, "Skill execution failed");
                DispatchOutcome::Failed {
                    skill: name,
                    error,
                    conflict,
                }
            }
        }
    }

    /// Subscribe to conflict events. Events sent before subscribing are not
    /// replayed; see [`recent_conflicts`](Self::recent_conflicts).
    pub fn subscribe_conflicts(&self) -> broadcast::Receiver<SkillConflict> {
        self.conflict_tx.subscribe()
    }

    /// Total conflicts seen since construction.
    pub fn conflict_count(&self) -> u64 {
        self.conflict_count.load(Ordering::Relaxed)
    }

    /// The most recent conflicts, oldest first.
    pub fn recent_conflicts(&self) -> Vec<SkillConflict> {
        self.recent_conflicts
            .lock()
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn report_conflict(&self, command: &str, skills: Vec<String>, selected: &str) -> SkillConflict {
        warn!(command, skills = ?skills, selected, "Multiple skills match command");
        let conflict = SkillConflict {
            command: command.to_string(),
            skills,
            selected: selected.to_string(),
            at: Utc::now(),
        };
        self.conflict_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut ring) = self.recent_conflicts.lock() {
            if ring.len() >= RECENT_CONFLICT_LIMIT {
                ring.pop_front();
            }
            ring.push_back(conflict.clone());
        }
        // No subscribers is fine.
        let _ = self.conflict_tx.send(conflict.clone());
        conflict
    }

    fn read_catalog(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_catalog(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.catalog.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SkillRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkillRegistry")
            .field("skills", &self.skill_names())
            .field("conflicts", &self.conflict_count())
            .finish()
    }
}

fn sort_by_priority(skills: &mut [Arc<dyn Skill>]) {
    // Stable: equal priorities keep registration order.
    skills.sort_by_key(|s| std::cmp::Reverse(s.priority()));
}
