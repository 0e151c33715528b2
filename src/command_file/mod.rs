//! The command file parser (C5): reads a command file — comments, quoting,
//! `MACRO`, `LONG MACRO`/`END MACRO`, and `INCLUDE` — and emits argument
//! vectors to a [`CommandSink`].

mod macros;
mod tokenizer;

use self::macros::{expand_macros, MacroTable, SourceLine};
use crate::errors::ConfigurationError;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashSet;

/// Where parsed argument vectors go. A scheduler (out of scope for this
/// crate) implements this to turn each `argv` into a submitted invocation.
pub trait CommandSink {
    fn add_command(&mut self, argv: Vec<String>);
}

/// Parse `path` and feed every resulting argument vector — with
/// `extra_args` appended — to `sink`, in file order after expansion.
pub fn parse_file(path: &Utf8Path, sink: &mut dyn CommandSink, extra_args: &[String]) -> Result<(), ConfigurationError> {
    let mut macro_table = MacroTable::default();
    let mut seen_includes = HashSet::new();
    seen_includes.insert(path.to_path_buf());

    let mut lines = Vec::new();
    collect_lines(path, &mut seen_includes, &mut macro_table, &mut lines)?;
    let expanded = expand_macros(lines, &macro_table)?;

    for line in expanded {
        let mut argv = line.tokens;
        argv.extend(extra_args.iter().cloned());
        sink.add_command(argv);
    }
    Ok(())
}

fn tokenize_error(kind: tokenizer::TokenizeErrorKind, path: &Utf8Path, line: usize) -> ConfigurationError {
    match kind {
        tokenizer::TokenizeErrorKind::UnterminatedQuote => {
            ConfigurationError::UnterminatedQuote { path: path.to_string(), line }
        }
        tokenizer::TokenizeErrorKind::TrailingBackslash => {
            ConfigurationError::TrailingBackslash { path: path.to_string(), line }
        }
    }
}

fn resolve_include_path(dir: Option<&Utf8Path>, raw: &str) -> Utf8PathBuf {
    let raw_path = Utf8Path::new(raw);
    if raw_path.is_absolute() {
        return raw_path.to_path_buf();
    }
    match dir {
        Some(parent) => parent.join(raw_path),
        None => raw_path.to_path_buf(),
    }
}

/// Read `path` top to bottom, consuming `MACRO`/`LONG MACRO`/`END MACRO`
/// definitions into `macro_table`, inlining `INCLUDE`d files (skipping any
/// already in `seen_includes`), and appending every remaining tokenized line
/// to `out`. Calls are *not* expanded here — that happens in one fixpoint
/// pass over the whole assembled buffer, after every file has been read.
fn collect_lines(
    path: &Utf8Path,
    seen_includes: &mut HashSet<Utf8PathBuf>,
    macro_table: &mut MacroTable,
    out: &mut Vec<SourceLine>,
) -> Result<(), ConfigurationError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
        path: path.to_string(),
        source,
    })?;
    let dir = path.parent().filter(|d| !d.as_str().is_empty());
    let raw_lines: Vec<&str> = content.lines().collect();

    let mut i = 0usize;
    while i < raw_lines.len() {
        let line_no = i + 1;
        let raw = raw_lines[i];
        i += 1;

        let tokens = tokenizer::tokenize(raw).map_err(|kind| tokenize_error(kind, path, line_no))?;
        if tokens.is_empty() {
            continue;
        }

        match tokens[0].as_str() {
            "INCLUDE" => {
                if tokens.len() != 2 {
                    return Err(ConfigurationError::MalformedInclude { path: path.to_string(), line: line_no });
                }
                let resolved = resolve_include_path(dir, &tokens[1]);
                if seen_includes.contains(&resolved) {
                    continue;
                }
                seen_includes.insert(resolved.clone());
                collect_lines(&resolved, seen_includes, macro_table, out)?;
            }

            "MACRO" => {
                let name = tokens.get(1).cloned().unwrap_or_default();
                if tokens.len() < 3 || tokens[2] != "=" || !macros::is_valid_macro_name(&name) {
                    return Err(ConfigurationError::InvalidMacroName { path: path.to_string(), line: line_no, name });
                }
                let body = tokens[3..].to_vec();
                if body.is_empty() {
                    return Err(ConfigurationError::EmptyMacroBody { path: path.to_string(), line: line_no, name });
                }
                macro_table.define_short(name, body);
            }

            "LONG" if tokens.get(1).map(String::as_str) == Some("MACRO") => {
                let name = tokens.get(2).cloned().unwrap_or_default();
                if tokens.len() != 3 || !macros::is_valid_macro_name(&name) {
                    return Err(ConfigurationError::InvalidMacroName { path: path.to_string(), line: line_no, name });
                }

                let mut body = Vec::new();
                let mut closed = false;
                while i < raw_lines.len() {
                    let body_line_no = i + 1;
                    let body_raw = raw_lines[i];
                    i += 1;
                    let body_tokens = tokenizer::tokenize(body_raw).map_err(|kind| tokenize_error(kind, path, body_line_no))?;
                    if body_tokens.first().map(String::as_str) == Some("END")
                        && body_tokens.get(1).map(String::as_str) == Some("MACRO")
                    {
                        closed = true;
                        break;
                    }
                    if !body_tokens.is_empty() {
                        body.push(body_tokens);
                    }
                }
                if !closed {
                    return Err(ConfigurationError::UnterminatedLongMacro { path: path.to_string(), line: line_no, name });
                }
                macro_table.define_long(name, body);
            }

            "END" if tokens.get(1).map(String::as_str) == Some("MACRO") => {
                return Err(ConfigurationError::UnmatchedEndMacro { path: path.to_string(), line: line_no });
            }

            _ => out.push(SourceLine {
                path: path.to_string(),
                line_no,
                tokens,
            }),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct VecSink(Vec<Vec<String>>);

    impl CommandSink for VecSink {
        fn add_command(&mut self, argv: Vec<String>) {
            self.0.push(argv);
        }
    }

    #[test]
    fn short_macro_inside_long_macro_expands_fully() {
        let dir = camino_tempfile::tempdir().unwrap();
        let path = dir.path().join("cmds.txt");
        std::fs::write(
            &path,
            "MACRO FLAGS = --retry 2\n\
             LONG MACRO SUITE\n\
             run module-a FLAGS()\n\
             run module-b FLAGS()\n\
             END MACRO\n\
             SUITE()\n",
        )
        .unwrap();

        let mut sink = VecSink::default();
        parse_file(&path, &mut sink, &[]).unwrap();
        assert_eq!(
            sink.0,
            vec![
                vec!["run", "module-a", "--retry", "2"],
                vec!["run", "module-b", "--retry", "2"],
            ]
        );
    }

    #[test]
    fn include_relative_to_parent_and_deduped() {
        let dir = camino_tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();

        let included = sub.join("shared.txt");
        std::fs::write(&included, "run shared-command\n").unwrap();

        let parent = sub.join("parent.txt");
        std::fs::write(&parent, "INCLUDE shared.txt\nrun own-command\nINCLUDE shared.txt\n").unwrap();

        let mut sink = VecSink::default();
        parse_file(&parent, &mut sink, &[]).unwrap();
        assert_eq!(
            sink.0,
            vec![vec!["run", "shared-command"], vec!["run", "own-command"]]
        );
    }

    #[test]
    fn extra_args_are_appended_to_every_command() {
        let dir = camino_tempfile::tempdir().unwrap();
        let path = dir.path().join("cmds.txt");
        std::fs::write(&path, "run module-a\nrun module-b\n").unwrap();

        let mut sink = VecSink::default();
        parse_file(&path, &mut sink, &["--dry-run".to_string()]).unwrap();
        assert_eq!(
            sink.0,
            vec![
                vec!["run", "module-a", "--dry-run"],
                vec!["run", "module-b", "--dry-run"],
            ]
        );
    }

    #[test]
    fn unknown_macro_call_surfaces_as_configuration_error() {
        let dir = camino_tempfile::tempdir().unwrap();
        let path = dir.path().join("cmds.txt");
        std::fs::write(&path, "run MISSING()\n").unwrap();

        let mut sink = VecSink::default();
        let err = parse_file(&path, &mut sink, &[]).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownMacro { .. }));
    }
}
