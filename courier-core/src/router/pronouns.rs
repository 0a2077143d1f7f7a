//! Pronoun resolution: rewrites "it", "that", "again" to the last entity
//! mentioned in the same conversation.
//!
//! State is partitioned by conversation id and updated in call order, so a
//! conversation's messages must be routed sequentially.

use crate::error::TransformError;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Rewrites referring expressions using per-conversation state.
pub trait PronounResolver: Send + Sync {
    /// Resolve references in `message` and record its mentions.
    fn resolve(&self, conversation_id: &str, message: &str) -> Result<String, TransformError>;

    /// Drop the state of one conversation.
    fn forget(&self, conversation_id: &str);

    /// Drop all state.
    fn clear(&self);
}

const PRONOUNS: &[&str] = &["it", "that", "this", "them"];

const ARTICLES: &[&str] = &["the", "a", "an", "my", "our"];

/// Words after which the next noun is an object worth tracking.
const ACTION_VERBS: &[&str] = &[
    "deploy", "ship", "restart", "reboot", "bounce", "build", "compile", "rollback", "check",
    "test", "show", "open", "close", "merge", "review", "stop", "start", "scale", "monitor",
    "watch", "inspect", "tail", "redeploy", "release", "revert", "archive", "delete", "clone",
];

const PREPOSITIONS: &[&str] = &["to", "for", "on", "of", "in", "from", "with", "about", "into"];

/// Words that end an object phrase without naming anything.
const SEPARATORS: &[&str] = &["and", "then", "also", "too", "again", "now", "please"];

/// Conversations tracked before the least recently used one is dropped.
pub const DEFAULT_MAX_CONVERSATIONS: usize = 1024;

/// Object-position words that never name an entity.
const NON_ENTITIES: &[&str] = &[
    "it", "that", "this", "them", "again", "all", "everything", "now", "please", "tests", "test",
    "logs", "status", "health", "issues", "issue", "prs", "me", "us", "up", "back", "production",
    "prod", "staging", "preview", "dev", "vercel", "netlify", "fly", "railway", "render",
    "heroku", "too", "also", "then", "and",
];

/// Tracks the most recently mentioned entity per conversation.
///
/// Bounded: once full, the conversation resolved
/// least recently is forgotten.
#[derive(Debug)]
pub struct EntityTracker {
    last_entity: Mutex<LruCache<String, String>>,
}

impl Default for EntityTracker {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_CONVERSATIONS)
    }
}

impl EntityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_conversations: usize) -> Self {
        let cap = NonZeroUsize::new(max_conversations).unwrap_or(NonZeroUsize::MIN);
        Self {
            last_entity: Mutex::new(LruCache::new(cap)),
        }
    }

    /// The entity currently tracked for a conversation.
    pub fn last_entity(&self, conversation_id: &str) -> Option<String> {
        self.last_entity
            .lock()
            .ok()
            .and_then(|map| map.peek(conversation_id).cloned())
    }

    /// Number of conversations with tracked state.
    pub fn tracked(&self) -> usize {
        self.last_entity.lock().map(|map| map.len()).unwrap_or(0)
    }

    fn record(&self, conversation_id: &str, entity: String) -> Result<(), TransformError> {
        let mut map = self.last_entity.lock().map_err(|e| TransformError::StateUnavailable {
            message: e.to_string(),
        })?;
        map.push(conversation_id.to_string(), entity);
        Ok(())
    }
}

impl PronounResolver for EntityTracker {
    fn resolve(&self, conversation_id: &str, message: &str) -> Result<String, TransformError> {
        let stored = {
            let mut map = self
                .last_entity
                .lock()
                .map_err(|e| TransformError::StateUnavailable {
                    message: e.to_string(),
                })?;
            map.get(conversation_id).cloned()
        };

        let (resolved, mention) = resolve_with(message, stored.as_deref());
        if let Some(entity) = mention {
            self.record(conversation_id, entity)?;
        }
        Ok(resolved)
    }

    fn forget(&self, conversation_id: &str) {
        if let Ok(mut map) = self.last_entity.lock() {
            map.pop(conversation_id);
        }
    }

    fn clear(&self) {
        if let Ok(mut map) = self.last_entity.lock() {
            map.clear();
        }
    }
}

fn split_trailing_punct(word: &str) -> (&str, &str) {
    let core = word.trim_end_matches([',', '.', '!', '?', ';', ':']);
    (core, &word[core.len()..])
}

fn is_in(list: &[&str], word: &str) -> bool {
    list.contains(&word)
}

/// Resolve `message` against `stored`; also return the last mention, if any.
fn resolve_with(message: &str, stored: Option<&str>) -> (String, Option<String>) {
    let words: Vec<&str> = message.split_whitespace().collect();

    // "<verb> again" repeats the verb on the tracked entity.
    if let [verb, again] = words.as_slice()
        && split_trailing_punct(again).0.eq_ignore_ascii_case("again")
        && is_in(ACTION_VERBS, &verb.to_lowercase())
    {
        return match stored {
            Some(entity) => (format!("{verb} {entity}"), Some(entity.to_string())),
            None => (message.to_string(), None),
        };
    }

    let mut out: Vec<String> = Vec::with_capacity(words.len());
    let mut current: Option<String> = stored.map(str::to_string);
    let mut mention: Option<String> = None;
    let mut expecting_object = false;
    let mut article: Option<&str> = None;

    for (i, word) in words.iter().enumerate() {
        let (core, punct) = split_trailing_punct(word);
        let lower = core.to_lowercase();

        if expecting_object
            && (is_in(ARTICLES, &lower) || is_determiner(&lower, punct, words.get(i + 1).copied()))
        {
            article = Some(core);
            out.push(word.to_string());
            continue;
        }

        if expecting_object {
            if is_in(PRONOUNS, &lower) && article.is_none() {
                if let Some(entity) = &current {
                    out.push(format!("{entity}{punct}"));
                    mention = Some(entity.clone());
                    expecting_object = false;
                    continue;
                }
            } else if is_entity_word(core, &lower) {
                let entity = match article {
                    Some(a) => format!("{a} {core}"),
                    None => core.to_string(),
                };
                current = Some(entity.clone());
                mention = Some(entity);
            }
        }

        expecting_object = punct.is_empty()
            && (is_in(ACTION_VERBS, &lower) || is_in(PREPOSITIONS, &lower));
        article = None;
        out.push(word.to_string());
    }

    (out.join(" "), mention)
}

/// "that"/"this" followed by a noun qualifies the noun rather than
/// referring back: "restart that server".
fn is_determiner(lower: &str, punct: &str, next: Option<&str>) -> bool {
    if !matches!(lower, "that" | "this") || !punct.is_empty() {
        return false;
    }
    match next {
        Some(next) => {
            let next = split_trailing_punct(next).0.to_lowercase();
            !next.is_empty() && !is_in(PREPOSITIONS, &next) && !is_in(SEPARATORS, &next)
        }
        None => false,
    }
}

fn is_entity_word(core: &str, lower: &str) -> bool {
    !core.is_empty()
        && !is_in(NON_ENTITIES, lower)
        && !is_in(ACTION_VERBS, lower)
        && !is_in(PREPOSITIONS, lower)
        && !is_in(ARTICLES, lower)
        && core
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
}
