// src/task/macros.rs

//! Macro resolver: turns a raw task script into a [`TaskDescriptor`].
//!
//! Macros are recognised one per physical line, by their first word:
//!
//! ```text
//! DEPENDS_ON <name>
//! MAYBE_DEPENDS_ON <name>
//! CONFLICTS_WITH <name>
//! RUN_ONCE
//! PREREQ_FOR <name>
//! INCLUDE_FILE <path> [dest]
//! MAYBE_INCLUDE_FILE <path> [dest]
//! SENDFILE <path>
//! ```
//!
//! Arguments are literal tokens. Single/double quotes and backslash escapes
//! group words, but no shell expansion happens: an argument containing `$`
//! is rejected, because the value the client sees would differ from the one
//! the remote shell sees.
//!
//! Lines that stay meaningful on the remote host (`DEPENDS_ON`, `RUN_ONCE`,
//! `CONFLICTS_WITH`, `PREREQ_FOR`) are left in place and execute as calls
//! into the task library. File directives are commented out, and
//! `MAYBE_DEPENDS_ON` becomes either `DEPENDS_ON` or a comment.

use tracing::debug;

use crate::errors::{Result, TaskshipError};
use crate::fs::expand_home;
use crate::task::descriptor::{is_glob_pattern, IncludeFile, TaskDescriptor};
use crate::types::TaskName;

/// Existence check used while resolving `MAYBE_DEPENDS_ON`.
///
/// Only existence matters here: the referenced task is fully loaded (and
/// parsed) later by the graph resolver, which also reports its errors.
pub trait TaskLookup {
    fn task_exists(&self, name: &str) -> bool;
}

impl<F> TaskLookup for F
where
    F: Fn(&str) -> bool,
{
    fn task_exists(&self, name: &str) -> bool {
        self(name)
    }
}

/// A recognised macro line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Macro {
    DependsOn(TaskName),
    MaybeDependsOn(TaskName),
    ConflictsWith(TaskName),
    RunOnce,
    PrereqFor(TaskName),
    IncludeFile(IncludeFile),
    SendFile(String),
}

/// Parse `script` for task `name` and produce its descriptor.
///
/// A literal `DEPENDS_ON` on a task that does not exist is not an error
/// here; the graph resolver reports it once it knows the whole set.
pub fn resolve_script(
    name: &str,
    script: &str,
    lookup: &dyn TaskLookup,
) -> Result<TaskDescriptor> {
    let mut desc = TaskDescriptor {
        name: name.to_string(),
        path: None,
        required_deps: Vec::new(),
        optional_deps: Vec::new(),
        conflicts: Vec::new(),
        successors: Vec::new(),
        run_once: false,
        include_files: Vec::new(),
        send_files: Vec::new(),
        body: String::new(),
    };

    let mut lines: Vec<String> = Vec::new();

    for (idx, raw) in script.split('\n').enumerate() {
        let parsed = parse_line(raw).map_err(|message| TaskshipError::Parse {
            task: name.to_string(),
            line: idx + 1,
            message,
        })?;

        let Some(mac) = parsed else {
            lines.push(raw.to_string());
            continue;
        };

        match mac {
            Macro::DependsOn(dep) => {
                push_unique(&mut desc.required_deps, dep);
                lines.push(raw.to_string());
            }
            Macro::MaybeDependsOn(dep) => {
                if lookup.task_exists(&dep) {
                    debug!(task = %name, dep = %dep, "optional dependency is available");
                    lines.push(raw.replacen("MAYBE_DEPENDS_ON", "DEPENDS_ON", 1));
                    push_unique(&mut desc.optional_deps, dep);
                } else {
                    debug!(task = %name, dep = %dep, "optional dependency not found; dropping");
                    lines.push(comment_out(raw));
                }
            }
            Macro::ConflictsWith(other) => {
                push_unique(&mut desc.conflicts, other);
                lines.push(raw.to_string());
            }
            Macro::RunOnce => {
                desc.run_once = true;
                lines.push(raw.to_string());
            }
            Macro::PrereqFor(succ) => {
                push_unique(&mut desc.successors, succ);
                lines.push(raw.to_string());
            }
            Macro::IncludeFile(inc) => {
                desc.include_files.push(inc);
                lines.push(comment_out(raw));
            }
            Macro::SendFile(path) => {
                desc.send_files.push(expand_home(&path));
                lines.push(comment_out(raw));
            }
        }
    }

    // A resolved optional dependency that is also declared required is just
    // a required dependency.
    desc.optional_deps
        .retain(|dep| !desc.required_deps.contains(dep));

    desc.body = lines.join("\n");
    Ok(desc)
}

fn push_unique(list: &mut Vec<TaskName>, name: TaskName) {
    if !list.contains(&name) {
        list.push(name);
    }
}

/// Comment out a line, keeping its indentation.
fn comment_out(raw: &str) -> String {
    let trimmed = raw.trim_start();
    let indent = &raw[..raw.len() - trimmed.len()];
    format!("{indent}# {trimmed}")
}

/// Recognise a single line. `Ok(None)` for ordinary script lines.
fn parse_line(raw: &str) -> std::result::Result<Option<Macro>, String> {
    let line = raw.trim();
    let keyword = match line.split_whitespace().next() {
        Some(k) => k,
        None => return Ok(None),
    };

    let is_macro = matches!(
        keyword,
        "DEPENDS_ON"
            | "MAYBE_DEPENDS_ON"
            | "CONFLICTS_WITH"
            | "RUN_ONCE"
            | "PREREQ_FOR"
            | "INCLUDE_FILE"
            | "MAYBE_INCLUDE_FILE"
            | "SENDFILE"
    );
    if !is_macro {
        return Ok(None);
    }

    let args = split_words(line[keyword.len()..].trim())?;
    if let Some(bad) = args.iter().find(|a| a.contains('$')) {
        return Err(format!(
            "{keyword}: argument `{bad}` uses shell expansion; macro arguments must be literal"
        ));
    }

    let mac = match keyword {
        "DEPENDS_ON" => Macro::DependsOn(task_arg(keyword, args)?),
        "MAYBE_DEPENDS_ON" => Macro::MaybeDependsOn(task_arg(keyword, args)?),
        "CONFLICTS_WITH" => Macro::ConflictsWith(task_arg(keyword, args)?),
        "PREREQ_FOR" => Macro::PrereqFor(task_arg(keyword, args)?),
        "RUN_ONCE" => {
            if !args.is_empty() {
                return Err(format!("RUN_ONCE expects no args, got {}", args.len()));
            }
            Macro::RunOnce
        }
        "INCLUDE_FILE" => Macro::IncludeFile(include_arg(keyword, args, false)?),
        "MAYBE_INCLUDE_FILE" => Macro::IncludeFile(include_arg(keyword, args, true)?),
        "SENDFILE" => {
            let mut args = args;
            if args.len() != 1 {
                return Err(format!("SENDFILE expects 1 arg, got {}", args.len()));
            }
            Macro::SendFile(args.remove(0))
        }
        _ => unreachable!("keyword checked above"),
    };

    Ok(Some(mac))
}

fn task_arg(keyword: &str, mut args: Vec<String>) -> std::result::Result<TaskName, String> {
    if args.len() != 1 {
        return Err(format!("{keyword} expects 1 task name, got {}", args.len()));
    }
    let name = args.remove(0);
    if name.contains('/') {
        return Err(format!("{keyword}: invalid task name `{name}`"));
    }
    Ok(name)
}

fn include_arg(
    keyword: &str,
    mut args: Vec<String>,
    optional: bool,
) -> std::result::Result<IncludeFile, String> {
    let (source, destination) = match args.len() {
        1 => {
            let source = args.remove(0);
            (source.clone(), None)
        }
        2 => {
            let destination = args.remove(1);
            (args.remove(0), Some(destination))
        }
        n => return Err(format!("{keyword} expects 1-2 args, got {n}")),
    };

    ensure_rooted(&source)?;
    if let Some(dest) = &destination {
        ensure_rooted(dest)?;
    }

    if is_glob_pattern(&source) && destination.is_none() {
        return Err(format!(
            "{keyword}: glob results need to have a destination directory: {source}"
        ));
    }

    Ok(IncludeFile {
        destination: destination.unwrap_or_else(|| source.clone()),
        source,
        optional,
    })
}

fn ensure_rooted(path: &str) -> std::result::Result<(), String> {
    if path.starts_with('/') || path.starts_with("~/") {
        Ok(())
    } else {
        Err(format!(
            "Only absolute or user-relative paths are allowed: {path}"
        ))
    }
}

/// Split macro arguments into words.
///
/// Supports single quotes (literal), double quotes (backslash escapes `"`
/// and `\`), and backslash escapes outside quotes. Quotes may appear in the
/// middle of a word: `~/"My File".txt` is one word.
fn split_words(input: &str) -> std::result::Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err("unterminated single quote".to_string()),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\')) => current.push(ch),
                            Some(ch) => {
                                current.push('\\');
                                current.push(ch);
                            }
                            None => return Err("unterminated double quote".to_string()),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err("unterminated double quote".to_string()),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(ch) => current.push(ch),
                    None => return Err("trailing backslash".to_string()),
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }
    Ok(words)
}
