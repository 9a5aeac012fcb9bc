// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The SQL gatekeeper: a conservative lexical firewall for inline SQL.
//!
//! Not a SQL parser. The checks are lexical and err on the side of
//! rejection, which is sufficient to prevent multi-statement injection
//! and catalog mutation from a spec. String literals are blanked before
//! any check so a literal cannot smuggle or fake a keyword.
//!
//! `validate` is pure: identical input always yields the identical
//! decision and hash.

use apiary_core::ApiaryError;

/// What the action is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlMode {
    /// `INSERT`, `UPDATE`, `DELETE`.
    Exec,
    /// `SELECT`, `WITH`. A missing top-level `LIMIT` gets `LIMIT 100`.
    Query,
}

/// A validated statement in driver form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSql {
    /// Statement with `:name` placeholders rewritten to `?N`.
    pub sql: String,
    /// Bind names in placeholder order: position `i` binds `?{i+1}`.
    pub binds: Vec<String>,
    /// Stable FNV-1a hash of the whitespace-collapsed source; recorded
    /// in events in place of the SQL itself.
    pub hash: u64,
}

const FORBIDDEN: &[&str] = &[
    "DROP", "CREATE", "ALTER", "TRUNCATE", "GRANT", "REVOKE", "COPY", "VACUUM",
];

/// Validate `sql` for `mode` and rewrite its placeholders.
///
/// `var_names` lists the wizard/scope variables available as binds;
/// `bot_id` and `user_id` are always permitted.
pub fn validate(sql: &str, mode: SqlMode, var_names: &[String]) -> Result<PreparedSql, ApiaryError> {
    let normalized = collapse_whitespace(sql);
    if normalized.is_empty() {
        return Err(ApiaryError::SqlRejected("empty statement".into()));
    }
    let hash = fnv1a64(&normalized);

    let blanked = blank_literals(&normalized);
    let upper = blanked.to_ascii_uppercase();

    check_first_verb(&upper, mode)?;
    check_single_statement(&blanked)?;
    check_forbidden_words(&upper)?;

    // Trailing terminator is harmless but gets in the way of the LIMIT
    // suffix, so it goes before the rewrite.
    let trimmed = normalized.trim_end_matches(';').trim_end();
    let blanked_trimmed = blank_literals(trimmed);
    let (mut rewritten, binds) = rewrite_placeholders(trimmed, &blanked_trimmed, var_names)?;

    if mode == SqlMode::Query && !has_top_level_limit(&blanked_trimmed) {
        rewritten.push_str(" LIMIT 100");
    }

    Ok(PreparedSql {
        sql: rewritten,
        binds,
        hash,
    })
}

fn collapse_whitespace(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace the contents of single-quoted literals with spaces,
/// preserving length. Doubled quotes (`''`) inside a literal are
/// handled.
fn blank_literals(sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            out.push(b'\'');
            i += 1;
            while i < bytes.len() {
                if bytes[i] == b'\'' {
                    if i + 1 < bytes.len() && bytes[i + 1] == b'\'' {
                        out.extend_from_slice(b"  ");
                        i += 2;
                        continue;
                    }
                    out.push(b'\'');
                    i += 1;
                    break;
                }
                out.push(b' ');
                i += 1;
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    // Blanking only writes single-byte replacements for non-ASCII
    // bytes inside literals, so the result stays valid as a byte scan
    // target; reconstruct lossily for safety.
    String::from_utf8_lossy(&out).into_owned()
}

fn check_first_verb(upper: &str, mode: SqlMode) -> Result<(), ApiaryError> {
    let first = upper.split_whitespace().next().unwrap_or("");
    let ok = match mode {
        SqlMode::Exec => matches!(first, "INSERT" | "UPDATE" | "DELETE"),
        SqlMode::Query => matches!(first, "SELECT" | "WITH"),
    };
    if ok {
        Ok(())
    } else {
        Err(ApiaryError::SqlRejected(format!(
            "verb {first} not permitted in {mode:?} mode"
        )))
    }
}

fn check_single_statement(blanked: &str) -> Result<(), ApiaryError> {
    if let Some(pos) = blanked.find(';') {
        let tail = &blanked[pos + 1..];
        if tail.chars().any(|c| !c.is_whitespace() && c != ';') {
            return Err(ApiaryError::SqlRejected(
                "statement terminator separates two statements".into(),
            ));
        }
    }
    Ok(())
}

fn check_forbidden_words(upper: &str) -> Result<(), ApiaryError> {
    for word in FORBIDDEN {
        let mut search = 0;
        while let Some(found) = upper[search..].find(word) {
            let start = search + found;
            let end = start + word.len();
            let before_ok = start == 0 || !is_word_byte(upper.as_bytes()[start - 1]);
            let after_ok = end >= upper.len() || !is_word_byte(upper.as_bytes()[end]);
            if before_ok && after_ok {
                return Err(ApiaryError::SqlRejected(format!(
                    "forbidden keyword {word}"
                )));
            }
            search = end;
        }
    }
    Ok(())
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Rewrite `:name` placeholders to `?N`, reusing the same index for a
/// repeated name. `blanked` mirrors `sql` with literals blanked so
/// placeholders inside strings are left alone.
fn rewrite_placeholders(
    sql: &str,
    blanked: &str,
    var_names: &[String],
) -> Result<(String, Vec<String>), ApiaryError> {
    let bytes = blanked.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut binds: Vec<String> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        // A `::` cast is not a placeholder, hence the look-behind.
        let is_placeholder = bytes[i] == b':'
            && (i == 0 || bytes[i - 1] != b':')
            && i + 1 < bytes.len()
            && (bytes[i + 1].is_ascii_alphabetic() || bytes[i + 1] == b'_');
        if is_placeholder {
            let mut end = i + 1;
            while end < bytes.len() && is_word_byte(bytes[end]) {
                end += 1;
            }
            let name = &sql[i + 1..end];
            if name != "bot_id" && name != "user_id" && !var_names.iter().any(|v| v == name) {
                return Err(ApiaryError::SqlBindMissing(name.to_string()));
            }
            let index = match binds.iter().position(|b| b == name) {
                Some(pos) => pos,
                None => {
                    binds.push(name.to_string());
                    binds.len() - 1
                }
            };
            out.push_str(&format!("?{}", index + 1));
            i = end;
        } else {
            // Copy from the original, not the blanked shadow.
            let ch_len = utf8_len(sql.as_bytes()[i]);
            out.push_str(&sql[i..i + ch_len]);
            i += ch_len;
        }
    }
    Ok((out, binds))
}

fn utf8_len(b: u8) -> usize {
    if b < 0x80 {
        1
    } else if b >= 0xF0 {
        4
    } else if b >= 0xE0 {
        3
    } else {
        2
    }
}

/// Whether a `LIMIT` keyword exists at paren depth zero.
fn has_top_level_limit(blanked: &str) -> bool {
    let upper = blanked.to_ascii_uppercase();
    let bytes = upper.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b'L' if depth == 0 => {
                let end = i + 5;
                if end <= bytes.len()
                    && &upper[i..end] == "LIMIT"
                    && (i == 0 || !is_word_byte(bytes[i - 1]))
                    && (end == bytes.len() || !is_word_byte(bytes[end]))
                {
                    return true;
                }
            }
            _ => {}
        }
        i += 1;
    }
    false
}

fn fnv1a64(s: &str) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for byte in s.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_vars() -> Vec<String> {
        Vec::new()
    }

    #[test]
    fn exec_permits_only_mutating_verbs() {
        for sql in [
            "INSERT INTO bookings (bot_id) VALUES (:bot_id)",
            "UPDATE bot_users SET is_active = 0 WHERE bot_id = :bot_id",
            "DELETE FROM bookings WHERE bot_id = :bot_id",
        ] {
            assert!(validate(sql, SqlMode::Exec, &no_vars()).is_ok(), "{sql}");
        }
        let err = validate("SELECT 1", SqlMode::Exec, &no_vars()).unwrap_err();
        assert_eq!(err.code(), "sql_error");
    }

    #[test]
    fn query_permits_select_and_with() {
        assert!(validate("SELECT 1", SqlMode::Query, &no_vars()).is_ok());
        assert!(validate(
            "WITH t AS (SELECT 1 AS n) SELECT n FROM t",
            SqlMode::Query,
            &no_vars()
        )
        .is_ok());
        let err = validate("INSERT INTO x VALUES (1)", SqlMode::Query, &no_vars()).unwrap_err();
        assert_eq!(err.code(), "sql_error");
    }

    #[test]
    fn forbidden_keywords_are_rejected_case_insensitively() {
        let err = validate("SELECT 1; drop table bots", SqlMode::Query, &no_vars()).unwrap_err();
        assert_eq!(err.code(), "sql_error");
        // `drop` as part of a longer identifier is not a whole word.
        assert!(validate(
            "SELECT dropped FROM events WHERE bot_id = :bot_id",
            SqlMode::Query,
            &no_vars()
        )
        .is_ok());
    }

    #[test]
    fn keywords_inside_string_literals_do_not_trip_the_check() {
        assert!(validate(
            "SELECT 1 FROM notes WHERE body = 'please DROP me' AND bot_id = :bot_id",
            SqlMode::Query,
            &no_vars()
        )
        .is_ok());
    }

    #[test]
    fn multi_statement_is_rejected_but_trailing_terminator_is_fine() {
        let err =
            validate("DELETE FROM a; DELETE FROM b", SqlMode::Exec, &no_vars()).unwrap_err();
        assert_eq!(err.code(), "sql_error");
        assert!(validate("DELETE FROM bookings WHERE bot_id = :bot_id;", SqlMode::Exec, &no_vars()).is_ok());
    }

    #[test]
    fn placeholders_rewrite_in_first_occurrence_order() {
        let vars = vec!["service".to_string(), "slot".to_string()];
        let prepared = validate(
            "INSERT INTO bookings (bot_id, user_id, service, slot) VALUES (:bot_id, :user_id, :service, :slot)",
            SqlMode::Exec,
            &vars,
        )
        .unwrap();
        assert_eq!(prepared.binds, vec!["bot_id", "user_id", "service", "slot"]);
        assert!(prepared.sql.contains("VALUES (?1, ?2, ?3, ?4)"));
    }

    #[test]
    fn repeated_placeholder_reuses_its_index() {
        let prepared = validate(
            "SELECT * FROM t WHERE a = :user_id OR b = :user_id AND bot_id = :bot_id",
            SqlMode::Query,
            &no_vars(),
        )
        .unwrap();
        assert_eq!(prepared.binds, vec!["user_id", "bot_id"]);
        assert!(prepared.sql.contains("a = ?1 OR b = ?1"));
    }

    #[test]
    fn unknown_placeholder_fails_with_bind_missing() {
        let err = validate(
            "SELECT * FROM t WHERE x = :mystery",
            SqlMode::Query,
            &no_vars(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "sql_bind_missing");
    }

    #[test]
    fn query_without_limit_gets_limit_100() {
        let prepared = validate(
            "SELECT service FROM bookings WHERE bot_id = :bot_id",
            SqlMode::Query,
            &no_vars(),
        )
        .unwrap();
        assert!(prepared.sql.ends_with(" LIMIT 100"), "{}", prepared.sql);
    }

    #[test]
    fn existing_top_level_limit_is_kept() {
        let prepared = validate(
            "SELECT service FROM bookings WHERE bot_id = :bot_id LIMIT 5",
            SqlMode::Query,
            &no_vars(),
        )
        .unwrap();
        assert!(prepared.sql.ends_with("LIMIT 5"), "{}", prepared.sql);
    }

    #[test]
    fn limit_inside_subquery_does_not_count() {
        let prepared = validate(
            "SELECT * FROM (SELECT 1 LIMIT 1) AS t WHERE bot_id = :bot_id",
            SqlMode::Query,
            &no_vars(),
        )
        .unwrap();
        assert!(prepared.sql.ends_with(" LIMIT 100"), "{}", prepared.sql);
    }

    #[test]
    fn exec_statements_are_not_limited() {
        let prepared = validate(
            "DELETE FROM bookings WHERE bot_id = :bot_id",
            SqlMode::Exec,
            &no_vars(),
        )
        .unwrap();
        assert!(!prepared.sql.contains("LIMIT"));
    }

    #[test]
    fn hash_is_stable_across_whitespace_and_pure() {
        let a = validate("SELECT 1\n  FROM t WHERE bot_id = :bot_id", SqlMode::Query, &no_vars()).unwrap();
        let b = validate("SELECT 1 FROM t WHERE bot_id = :bot_id", SqlMode::Query, &no_vars()).unwrap();
        let c = validate("SELECT 1 FROM t WHERE bot_id = :bot_id", SqlMode::Query, &no_vars()).unwrap();
        assert_eq!(a.hash, b.hash);
        assert_eq!(b, c);
        // Case is preserved, so a case change is a different hash.
        let d = validate("select 1 FROM t WHERE bot_id = :bot_id", SqlMode::Query, &no_vars()).unwrap();
        assert_ne!(a.hash, d.hash);
    }
}
