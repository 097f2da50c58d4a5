//! Pulling a SQL statement out of a free-form model reply.

use std::sync::OnceLock;

use regex::Regex;

fn fenced_sql() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```sql\n(.*?)(?:;|\[|```)").ok())
        .as_ref()
}

fn bare_sql() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)((?:select|with.*?as \()(?:.*?))(?:;|\[|```)").ok())
        .as_ref()
}

/// Extract the SQL statement from a model reply.
///
/// Markdown escapes (`\_`) and stray backslashes are removed first. Then, in
/// order of preference:
///
/// 1. the body of the first ```` ```sql ```` fence, up to the first `;`, `[`
///    or closing fence;
/// 2. the first `SELECT ...` or `WITH ... AS (...` run, case-insensitive, up to
///    the same terminators;
/// 3. the cleaned reply unchanged.
///
/// The terminating `;` is not part of the result.
pub fn extract_sql(response: &str) -> String {
    let cleaned = response.replace("\\_", "_").replace('\\', "");

    if let Some(caps) = fenced_sql().and_then(|re| re.captures(&cleaned)) {
        return caps[1].replace("```", "");
    }

    if let Some(caps) = bare_sql().and_then(|re| re.captures(&cleaned)) {
        return caps[1].to_string();
    }

    cleaned
}

/// Whether `sql` starts with a read-only query keyword (`SELECT` or `WITH`).
pub fn is_sql_valid(sql: &str) -> bool {
    let first = sql
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("");
    first.eq_ignore_ascii_case("select") || first.eq_ignore_ascii_case("with")
}
