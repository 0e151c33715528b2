//! Line tokenisation: whitespace splitting, `"`-quoting, `\`-escaping, and
//! `#`-comments.

/// Why a line failed to tokenize. Carries no location; the caller attaches
/// `path`/`line` when turning this into a [`crate::errors::ConfigurationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenizeErrorKind {
    UnterminatedQuote,
    TrailingBackslash,
}

/// Split one logical line into whitespace-separated tokens.
///
/// A `"` opens a quoted run that preserves internal whitespace until the
/// matching `"`. A `\` escapes the single character that follows it
/// (including `"` and `\` itself), inside or outside a quoted run. A `#`
/// outside a quoted run starts a comment running to end-of-line. A blank or
/// comment-only line yields an empty token vector.
pub(crate) fn tokenize(line: &str) -> Result<Vec<String>, TokenizeErrorKind> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut in_quotes = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '\\' => match chars.next() {
                    Some(escaped) => current.push(escaped),
                    None => return Err(TokenizeErrorKind::TrailingBackslash),
                },
                '"' => in_quotes = false,
                _ => current.push(c),
            }
            in_token = true;
            continue;
        }

        match c {
            '#' => break,
            '"' => {
                in_quotes = true;
                in_token = true;
            }
            '\\' => match chars.next() {
                Some(escaped) => {
                    current.push(escaped);
                    in_token = true;
                }
                None => return Err(TokenizeErrorKind::TrailingBackslash),
            },
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_quotes {
        return Err(TokenizeErrorKind::UnterminatedQuote);
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
