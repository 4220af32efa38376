//! Leading-keyword statement classification.

use crate::types::StatementKind;

/// Classifies a SQL statement by its first keyword (case-insensitive).
///
/// Leading whitespace, `--` line comments, `/* */` block comments and
/// opening parentheses are skipped before the keyword is read. A `WITH`
/// clause is classified by the statement that follows its CTE list.
#[must_use]
pub fn classify(sql: &str) -> StatementKind {
    let rest = skip_trivia(sql);
    let keyword = leading_keyword(rest);
    if keyword.eq_ignore_ascii_case("WITH") {
        return statement_after_ctes(&rest[keyword.len()..])
            .map_or(StatementKind::Unrecognized, keyword_kind);
    }
    keyword_kind(keyword)
}

fn keyword_kind(keyword: &str) -> StatementKind {
    match keyword.to_ascii_uppercase().as_str() {
        "CREATE" | "DROP" | "ALTER" | "RENAME" => StatementKind::Ddl,
        "INSERT" => StatementKind::Insert,
        "UPDATE" | "DELETE" | "REPLACE" | "UPSERT" | "MERGE" | "TRUNCATE" => {
            StatementKind::UpdateDelete
        }
        "SELECT" | "VALUES" | "EXPLAIN" | "SHOW" | "DESCRIBE" | "PRAGMA" => StatementKind::Select,
        "BEGIN" | "START" | "COMMIT" | "END" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" => {
            StatementKind::TransactionControl
        }
        _ => StatementKind::Unrecognized,
    }
}

/// Keywords that can start the statement a `WITH` clause prefixes.
const CTE_TARGETS: [&str; 6] = ["SELECT", "VALUES", "INSERT", "REPLACE", "UPDATE", "DELETE"];

fn leading_keyword(rest: &str) -> &str {
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    &rest[..end]
}

/// Finds the first statement keyword outside parentheses, quotes and
/// comments, i.e. the keyword after the CTE definitions.
fn statement_after_ctes(sql: &str) -> Option<&str> {
    let bytes = sql.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            q @ (b'\'' | b'"' | b'`') => i = skip_past(bytes, i + 1, &[q]),
            b'[' => i = skip_past(bytes, i + 1, b"]"),
            b'-' if bytes.get(i + 1) == Some(&b'-') => i = skip_past(bytes, i + 2, b"\n"),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_past(bytes, i + 2, b"*/"),
            b'(' => {
                depth += 1;
                i += 1;
            }
            b')' => {
                depth = depth.saturating_sub(1);
                i += 1;
            }
            b if depth == 0 && (b.is_ascii_alphabetic() || b == b'_') => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                let word = &sql[start..i];
                if CTE_TARGETS.iter().any(|k| word.eq_ignore_ascii_case(k)) {
                    return Some(word);
                }
            }
            _ => i += 1,
        }
    }
    None
}

/// Returns the index just past the next occurrence of `end` at or after
/// `from`, or the input length if there is none.
fn skip_past(bytes: &[u8], from: usize, end: &[u8]) -> usize {
    bytes
        .get(from..)
        .and_then(|tail| tail.windows(end.len()).position(|w| w == end))
        .map_or(bytes.len(), |pos| from + pos + end.len())
}

fn skip_trivia(mut s: &str) -> &str {
    loop {
        let trimmed = s.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
        if let Some(comment) = trimmed.strip_prefix("--") {
            s = comment.find('\n').map_or("", |i| &comment[i + 1..]);
        } else if let Some(comment) = trimmed.strip_prefix("/*") {
            s = comment.find("*/").map_or("", |i| &comment[i + 2..]);
        } else {
            return trimmed;
        }
    }
}
