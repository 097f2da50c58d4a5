//! Extraction of `CREATE TABLE` blocks from a SQL script.
//!
//! Detection is purely textual: a block opens on a line whose trimmed,
//! uppercased form starts with `CREATE TABLE` and closes on the first later
//! line whose trimmed form ends with `);`. Comments and string literals are
//! not recognised, and a block still open at end of input is dropped.

const BLOCK_START: &str = "CREATE TABLE";
const BLOCK_END: &str = ");";

/// Return only the `CREATE TABLE` blocks of `script`, verbatim, separated by
/// one blank line. Returns an empty string when there are none.
pub fn extract_ddl_only(script: &str) -> String {
    let mut blocks: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut capturing = false;

    for raw in split_lines(script) {
        let line = raw.trim();

        if !capturing && line.to_uppercase().starts_with(BLOCK_START) {
            capturing = true;
            current = vec![raw];
            // The opening line is never checked for the terminator.
            continue;
        }

        if capturing {
            current.push(raw);
            if line.ends_with(BLOCK_END) {
                blocks.push(current.join("\n"));
                current.clear();
                capturing = false;
            }
        }
    }

    blocks.join("\n\n")
}

/// Characters that end a line, besides `\r\n` which counts as one break.
fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\x0b' | '\x0c' | '\x1c' | '\x1d' | '\x1e' | '\u{85}' | '\u{2028}' | '\u{2029}'
    )
}

/// Split on any line break. A trailing terminator does not produce an empty
/// final line.
fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        match rest.find(is_line_break) {
            Some(pos) => {
                let line = &rest[..pos];
                let skip = if rest[pos..].starts_with("\r\n") { 2 } else { 1 };
                rest = &rest[pos + skip..];
                Some(line)
            }
            None => {
                let line = rest;
                rest = "";
                Some(line)
            }
        }
    })
}
