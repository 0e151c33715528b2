//! Macro definitions and call expansion (§4.5): the short-macro and
//! long-macro tables, and the fixpoint expansion pass over a buffer of
//! already-tokenized lines.

use crate::errors::ConfigurationError;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*$").unwrap())
}

pub(crate) fn is_valid_macro_name(name: &str) -> bool {
    name_pattern().is_match(name)
}

/// One still-to-be-emitted line: its tokens, plus the source location used
/// for error reporting if a later expansion pass fails on it.
#[derive(Debug, Clone)]
pub(crate) struct SourceLine {
    pub(crate) path: String,
    pub(crate) line_no: usize,
    pub(crate) tokens: Vec<String>,
}

#[derive(Debug, Default)]
pub(crate) struct MacroTable {
    short: HashMap<String, Vec<String>>,
    long: HashMap<String, Vec<Vec<String>>>,
}

impl MacroTable {
    pub(crate) fn define_short(&mut self, name: String, body: Vec<String>) {
        if self.short.contains_key(&name) || self.long.contains_key(&name) {
            tracing::warn!(macro_name = %name, "redefining macro");
        }
        self.short.insert(name, body);
    }

    pub(crate) fn define_long(&mut self, name: String, body: Vec<Vec<String>>) {
        if self.short.contains_key(&name) || self.long.contains_key(&name) {
            tracing::warn!(macro_name = %name, "redefining macro");
        }
        self.long.insert(name, body);
    }
}

fn call_name(token: &str) -> Option<&str> {
    let name = token.strip_suffix("()")?;
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn first_call_index(tokens: &[String]) -> Option<usize> {
    tokens.iter().position(|t| call_name(t).is_some())
}

fn line_has_call(line: &SourceLine) -> bool {
    first_call_index(&line.tokens).is_some()
}

/// Expand the leftmost macro call on `line`. A short-macro call splices its
/// token list in place, yielding the same line with more/fewer tokens. A
/// long-macro call splices each body entry into the same surrounding
/// tokens, one emitted line per body entry, each still subject to further
/// expansion.
fn expand_one_line(line: SourceLine, macros: &MacroTable) -> Result<Vec<SourceLine>, ConfigurationError> {
    let Some(idx) = first_call_index(&line.tokens) else {
        return Ok(vec![line]);
    };
    let name = call_name(&line.tokens[idx]).unwrap().to_string();

    if let Some(body) = macros.short.get(&name) {
        let mut tokens = line.tokens;
        tokens.splice(idx..idx + 1, body.iter().cloned());
        return Ok(vec![SourceLine {
            path: line.path,
            line_no: line.line_no,
            tokens,
        }]);
    }

    if let Some(bodies) = macros.long.get(&name) {
        let pre = &line.tokens[..idx];
        let post = &line.tokens[idx + 1..];
        return Ok(bodies
            .iter()
            .map(|body| {
                let mut tokens = Vec::with_capacity(pre.len() + body.len() + post.len());
                tokens.extend_from_slice(pre);
                tokens.extend(body.iter().cloned());
                tokens.extend_from_slice(post);
                SourceLine {
                    path: line.path.clone(),
                    line_no: line.line_no,
                    tokens,
                }
            })
            .collect());
    }

    Err(ConfigurationError::UnknownMacro {
        path: line.path,
        line: line.line_no,
        name,
    })
}

/// Expand every macro call in `lines` to a fixpoint.
///
/// A presence flag per line tracks whether it still has an unresolved call;
/// the loop condition is derived directly from that flag vector on every
/// iteration rather than from a separately maintained counter, so the two
/// can never drift apart.
pub(crate) fn expand_macros(mut lines: Vec<SourceLine>, macros: &MacroTable) -> Result<Vec<SourceLine>, ConfigurationError> {
    let mut pending: Vec<bool> = lines.iter().map(line_has_call).collect();

    while pending.iter().any(|&p| p) {
        let mut next_lines = Vec::with_capacity(lines.len());
        let mut next_pending = Vec::with_capacity(lines.len());

        for (line, has_call) in lines.into_iter().zip(pending.into_iter()) {
            if !has_call {
                next_pending.push(false);
                next_lines.push(line);
                continue;
            }
            for expanded in expand_one_line(line, macros)? {
                next_pending.push(line_has_call(&expanded));
                next_lines.push(expanded);
            }
        }

        lines = next_lines;
        pending = next_pending;
    }

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(tokens: &[&str]) -> SourceLine {
        SourceLine {
            path: "cmds.txt".to_string(),
            line_no: 1,
            tokens: tokens.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn short_macro_splices_tokens_in_place() {
        let mut macros = MacroTable::default();
        macros.define_short("FLAGS".to_string(), vec!["--a".to_string(), "--b".to_string()]);
        let out = expand_macros(vec![line(&["run", "FLAGS()", "--c"])], &macros).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tokens, vec!["run", "--a", "--b", "--c"]);
    }

    #[test]
    fn long_macro_expands_into_multiple_lines() {
        let mut macros = MacroTable::default();
        macros.define_long(
            "SUITE".to_string(),
            vec![vec!["run".to_string(), "one".to_string()], vec!["run".to_string(), "two".to_string()]],
        );
        let out = expand_macros(vec![line(&["SUITE()"])], &macros).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].tokens, vec!["run", "one"]);
        assert_eq!(out[1].tokens, vec!["run", "two"]);
    }

    #[test]
    fn long_macro_call_preserves_surrounding_tokens() {
        // Scenario 5: `hbar` is a short macro expanding to `quux`; `bar` is
        // a long macro whose sole body line is `hbar() z`. `bar()` called
        // as `one bar() x` must keep `one` and `x` around the expanded
        // body, not discard them.
        let mut macros = MacroTable::default();
        macros.define_short("hbar".to_string(), vec!["quux".to_string()]);
        macros.define_long(
            "bar".to_string(),
            vec![vec!["hbar()".to_string(), "z".to_string()]],
        );
        let out = expand_macros(vec![line(&["one", "bar()", "x"])], &macros).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tokens, vec!["one", "quux", "z", "x"]);
    }

    #[test]
    fn unknown_macro_call_is_an_error() {
        let macros = MacroTable::default();
        let err = expand_macros(vec![line(&["MISSING()"])], &macros).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownMacro { .. }));
    }

    #[test]
    fn validates_macro_name_syntax() {
        assert!(is_valid_macro_name("FLAGS"));
        assert!(is_valid_macro_name("_private-name"));
        assert!(!is_valid_macro_name("1bad"));
        assert!(!is_valid_macro_name("has space"));
    }
}
