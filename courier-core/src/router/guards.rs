//! Text classifiers that keep messages away from the generative router.
//!
//! All guards are pure functions over a normalized message (trimmed, single
//! spaces). They only ever turn a would-be fallback call into a passthrough;
//! none of them can produce a command.

use regex::Regex;
use std::sync::LazyLock;

static GREETING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:hi|hello|hey|yo|hiya|howdy|sup|good (?:morning|afternoon|evening|night)|thanks|thank you|thx|ty|cheers|ok|okay|k|cool|nice|great|awesome|perfect|got it|sounds good|lol|haha|bye|goodbye|see you|later|np|no problem|nevermind|never mind)(?: (?:there|all|everyone|man|mate|so much|a lot))?$",
    )
    .expect("valid regex")
});

static YES_NO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:yes|yeah|yep|yup|sure|no|nope|nah|maybe|please|please do|do it|go ahead|not now|not yet)$")
        .expect("valid regex")
});

static WH_OPENER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:what|why|how|when|where|who|whom|whose|which)\b").expect("valid regex"));

static REQUEST_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:can|could|would|will|do|did|does|is|are|should) (?:you|u)\b").expect("valid regex")
});

static CONNECTIVE_OPENER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:and|but|so|then|also|or|because)\b").expect("valid regex"));

static FIRST_PERSON_STATEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:i think|i feel|i guess|i was|i am|i'm|im|my|it's|its|that's|thats|this is|that is)\b")
        .expect("valid regex")
});

static BUILD_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:i want(?: to| you to)?|i'd like(?: to| you to)?|i would like(?: to| you to)?|let's|lets|let us|we should|we need to|we could|can we|could we|i need(?: to| you to)?|help me)\b",
    )
    .expect("valid regex")
});

static BUILD_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:build|create|make|implement|design|plan|develop|prototype|scaffold|set up|start)\b")
        .expect("valid regex")
});

static CODING_VERB_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:please )?(?:add|fix|refactor|remove|delete|implement|style|restyle|optimize|optimise|write|update|change|rename|move|replace|convert|extract|clean up|tweak|adjust|center|align|make)\b",
    )
    .expect("valid regex")
});

static CODING_NOUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:navbar|nav bar|sidebar|header|footer|component|feature|button|page|css|html|modal|form|layout|function|method|class|endpoint|route|schema|migration|unit test|typo|bug|styling|padding|margin|font|color|colour)s?\b",
    )
    .expect("valid regex")
});

/// Greeting, acknowledgement, small talk, or a sentence that is clearly
/// narrative rather than an instruction.
pub fn is_conversational(message: &str) -> bool {
    let m = message.trim();
    GREETING.is_match(m)
        || YES_NO.is_match(m)
        || WH_OPENER.is_match(m)
        || REQUEST_OPENER.is_match(m)
        || CONNECTIVE_OPENER.is_match(m)
        || FIRST_PERSON_STATEMENT.is_match(m)
}

/// A request to build or plan something, addressed to the assistant rather
/// than to an infrastructure skill ("I want to build a landing page").
pub fn is_build_request(message: &str) -> bool {
    let m = message.trim();
    BUILD_OPENER.is_match(m) && BUILD_VERB.is_match(m)
}

/// An instruction to change code ("add a dark mode toggle to the navbar").
///
/// Verb-led messages always count. Otherwise a code noun in a message of at
/// least four words is enough.
pub fn is_coding_instruction(message: &str) -> bool {
    let m = message.trim();
    if CODING_VERB_OPENER.is_match(m) {
        return true;
    }
    m.split_whitespace().count() >= 4 && CODING_NOUN.is_match(m)
}

/// Whether a message qualifies for a generative routing attempt at all.
pub fn within_fallback_bounds(message: &str, max_words: usize) -> bool {
    let words = message.split_whitespace().count();
    words >= 1 && words <= max_words
}
