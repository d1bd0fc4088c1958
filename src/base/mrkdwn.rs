//! Conversion of generic Markdown into Slack's `mrkdwn` dialect.
//!
//! This is a one-shot transform applied to model output on its way to Slack.
//! It is deliberately not a normalizer: reapplying it to already-converted
//! text may change it again.

use std::sync::LazyLock;

use regex::Regex;

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}[ \t]+(.*)$").expect("heading pattern is valid"));

static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("link pattern is valid"));

/// Rewrite Markdown punctuation into Slack `mrkdwn`.
///
/// Rules, applied in order, each on the output of the previous:
/// 1. `**bold**` becomes `*bold*`.
/// 2. `__emphasis__` becomes `_emphasis_`.
/// 3. Heading lines (`# …` through `###### …`) collapse to one
///    `*emphasis*`-wrapped line; heading levels are not preserved.
/// 4. `~~strike~~` becomes `~strike~`.
/// 5. `[label](url)` becomes `<url|label>`.
pub fn to_mrkdwn(text: &str) -> String {
    let text = text.replace("**", "*");
    let text = text.replace("__", "_");
    let text = HEADING.replace_all(&text, "*$1*");
    let text = text.replace("~~", "~");
    LINK.replace_all(&text, "<$2|$1>").into_owned()
}
