//! Free-text sanitization.
//!
//! Every free-text field (titles, descriptions, names, comment content)
//! passes through [`clean_text`] before it enters the mutation path. The
//! rules are deliberately blunt: the store and its consumers treat all
//! text as plain text, so rather than attempting an HTML allow-list we
//! strip the vectors entirely.
//!
//! Order matters: `javascript:` schemes are removed before the bare
//! `script` token so the scheme does not survive as `java:`.

use std::sync::LazyLock;

use regex::Regex;

/// Inline event-handler attributes, e.g. `onclick=` / `onerror =`.
static EVENT_HANDLER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bon\w+\s*=").expect("static regex"));

/// `javascript:` URL scheme, with optional interior whitespace.
static JS_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)j\s*a\s*v\s*a\s*s\s*c\s*r\s*i\s*p\s*t\s*:").expect("static regex"));

/// The bare `script` token, case-insensitive.
static SCRIPT_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)script").expect("static regex"));

/// Strip dangerous markup/script vectors from a free-text field.
///
/// Removes `javascript:` schemes, inline event-handler attributes, and
/// the `script` token, then strips the `<` and `>` tag markers. The
/// result is trimmed. Idempotent: sanitizing twice yields the same text.
pub fn clean_text(input: &str) -> String {
    let text = JS_SCHEME.replace_all(input, "");
    let text = EVENT_HANDLER.replace_all(&text, "");
    let text = SCRIPT_TOKEN.replace_all(&text, "");
    text.replace(['<', '>'], "").trim().to_string()
}

/// True when a sanitized string carries no content beyond the residual
/// `/` markers that stripped closing tags leave behind. Markup-only
/// input like `<script></script>` sanitizes to `"/"`, which is blank;
/// the `/` inside real text (`alert(1)/ please fix`) is kept.
pub fn is_blank(cleaned: &str) -> bool {
    cleaned.chars().all(|c| c == '/' || c.is_whitespace())
}

/// Sanitize an optional field, mapping blank results to `None`.
pub fn clean_optional(input: Option<&str>) -> Option<String> {
    input
        .map(clean_text)
        .filter(|cleaned| !is_blank(cleaned))
}
