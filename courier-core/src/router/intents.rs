//! Multi-intent decomposition: splits "deploy judo and then restart the api"
//! into independently routable intents.

use crate::error::TransformError;
use regex::Regex;
use std::sync::LazyLock;

/// Intents found in one compound message, in original order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecomposedIntents {
    pub intents: Vec<String>,
    /// Whether sequencing words ("then", "after that") joined the intents.
    pub sequential: bool,
}

/// Splits compound messages into separate intents.
pub trait IntentDecomposer: Send + Sync {
    /// `Ok(None)` when the message carries a single intent.
    fn decompose(&self, message: &str) -> Result<Option<DecomposedIntents>, TransformError>;
}

static SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\s*,)?\s+(and then|and also|after that|afterwards|then|also|and)[\s,]+")
        .expect("valid regex")
});

static ACTION_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:please )?(?:deploy|ship|restart|reboot|bounce|build|compile|rollback|roll back|run|execute|check|test|show|list|get|open|close|create|file|merge|review|stop|start|scale|tail|remind|look ?up|find|search|fetch|release|revert|notify|send|archive)\b",
    )
    .expect("valid regex")
});

const SEQUENTIAL_SEPARATORS: &[&str] = &["and then", "then", "after that", "afterwards"];

/// Conjunction and sequencing-word splitter.
///
/// A split happens only where both sides start with an action verb, so
/// "deploy judo and karate" stays one intent.
#[derive(Debug, Clone, Default)]
pub struct ConjunctionDecomposer;

impl ConjunctionDecomposer {
    pub fn new() -> Self {
        Self
    }
}

impl IntentDecomposer for ConjunctionDecomposer {
    fn decompose(&self, message: &str) -> Result<Option<DecomposedIntents>, TransformError> {
        let message = message.trim();
        if !ACTION_START.is_match(message) {
            return Ok(None);
        }

        let mut intents = Vec::new();
        let mut sequential = false;
        let mut start = 0;

        for caps in SEPARATOR.captures_iter(message) {
            let (Some(whole), Some(word)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() < start || !ACTION_START.is_match(&message[whole.end()..]) {
                continue;
            }
            push_intent(&mut intents, &message[start..whole.start()]);
            if SEQUENTIAL_SEPARATORS.contains(&word.as_str().to_lowercase().as_str()) {
                sequential = true;
            }
            start = whole.end();
        }
        push_intent(&mut intents, &message[start..]);

        if intents.len() < 2 {
            return Ok(None);
        }
        Ok(Some(DecomposedIntents {
            intents,
            sequential,
        }))
    }
}

fn push_intent(intents: &mut Vec<String>, segment: &str) {
    let segment = segment.trim().trim_end_matches([',', ';', '.']).trim();
    if !segment.is_empty() {
        intents.push(segment.to_string());
    }
}
