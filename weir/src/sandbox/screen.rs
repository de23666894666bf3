//! Security screening for user-supplied Python scripts.
//!
//! Screening runs before any child process exists and uses two layers:
//! a full parse (any syntax error is a rejection), then a token-stream
//! scan that hard-blocks dangerous patterns. A pluggable [`CodeAuditor`]
//! can add a deeper, best-effort pass on top.
//!
//! Blocked by the scan:
//! - imports of any module outside [`SAFE_MODULES`]
//! - every `from X import Y` form
//! - calls to the built-ins in [`FORBIDDEN_CALLS`]
//! - calls to the attribute paths in [`FORBIDDEN_ATTR_CALLS`]

use crate::errors::UnsafeCodeError;
use rustpython_parser::{ast, lexer::lex, Mode, Parse, Tok};
use std::str::FromStr;

/// Allow-list of importable modules.
pub const SAFE_MODULES: &[&str] = &["json", "math", "decimal", "datetime", "re", "uuid", "orjson"];

/// Built-in functions whose calls are rejected.
pub const FORBIDDEN_CALLS: &[&str] = &["eval", "exec", "compile", "open", "__import__", "input"];

/// Attribute paths whose calls are rejected.
pub const FORBIDDEN_ATTR_CALLS: &[&str] = &["os.system", "subprocess.call", "subprocess.Popen"];

/// Severity threshold for the secondary auditor pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Severity {
    /// Reject findings of any severity.
    #[default]
    Low,
    /// Reject medium and high severity findings.
    Medium,
    /// Reject only high severity findings.
    High,
}

impl FromStr for Severity {
    type Err = UnsafeCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(UnsafeCodeError::new(format!(
                "invalid severity threshold: {other}"
            ))),
        }
    }
}

/// A deeper static-analysis pass over screened code.
///
/// Implementations reject scripts with findings at or above the given
/// severity threshold. The pass is best-effort and may be absent.
pub trait CodeAuditor: Send + Sync {
    /// Audits the script, rejecting findings at or above `threshold`.
    ///
    /// # Errors
    ///
    /// Returns an [`UnsafeCodeError`] describing the finding.
    fn audit(&self, code: &str, threshold: Severity) -> Result<(), UnsafeCodeError>;
}

/// Screens a script with the default (auditor-less) configuration.
///
/// # Errors
///
/// Returns an [`UnsafeCodeError`] when the script is syntactically invalid
/// or contains a blocked pattern.
pub fn screen_code(code: &str) -> Result<(), UnsafeCodeError> {
    screen_code_with(code, None, Severity::Low)
}

/// Screens a script, optionally running a secondary auditor pass.
///
/// # Errors
///
/// Returns an [`UnsafeCodeError`] on syntax errors, blocked patterns, or
/// auditor findings at or above `threshold`.
pub fn screen_code_with(
    code: &str,
    auditor: Option<&dyn CodeAuditor>,
    threshold: Severity,
) -> Result<(), UnsafeCodeError> {
    ast::Suite::parse(code, "<sandbox>")
        .map_err(|err| UnsafeCodeError::new(format!("syntax error in code: {err}")))?;

    let tokens = collect_tokens(code)?;
    scan_tokens(&tokens)?;

    if let Some(auditor) = auditor {
        auditor.audit(code, threshold)?;
    }
    Ok(())
}

fn collect_tokens(code: &str) -> Result<Vec<Tok>, UnsafeCodeError> {
    let mut tokens = Vec::new();
    for item in lex(code, Mode::Module) {
        let (token, _range) =
            item.map_err(|err| UnsafeCodeError::new(format!("syntax error in code: {err:?}")))?;
        match token {
            Tok::Comment(_) | Tok::NonLogicalNewline => {}
            other => tokens.push(other),
        }
    }
    Ok(tokens)
}

fn scan_tokens(tokens: &[Tok]) -> Result<(), UnsafeCodeError> {
    let mut stmt_start = true;
    let mut index = 0;
    while index < tokens.len() {
        match &tokens[index] {
            Tok::From if stmt_start => {
                return Err(UnsafeCodeError::new(
                    "use of `from ... import ...` is not allowed",
                ));
            }
            Tok::Import if stmt_start => check_import(&tokens[index + 1..])?,
            Tok::Name { name } => {
                let (path, consumed) = attribute_chain(tokens, index);
                if consumed > 1 {
                    let called = matches!(tokens.get(index + consumed), Some(Tok::Lpar));
                    if called && FORBIDDEN_ATTR_CALLS.contains(&path.as_str()) {
                        return Err(UnsafeCodeError::new(format!(
                            "disallowed attribute call: {path}"
                        )));
                    }
                    index += consumed;
                    stmt_start = false;
                    continue;
                }
                let called = matches!(tokens.get(index + 1), Some(Tok::Lpar));
                let defined = index > 0 && matches!(tokens[index - 1], Tok::Def | Tok::Dot);
                if called && !defined && FORBIDDEN_CALLS.contains(&name.as_str()) {
                    return Err(UnsafeCodeError::new(format!(
                        "disallowed function call: {name}"
                    )));
                }
            }
            _ => {}
        }
        stmt_start = matches!(
            tokens[index],
            Tok::Newline | Tok::Indent | Tok::Dedent | Tok::Semi
        );
        index += 1;
    }
    Ok(())
}

/// Collects a dotted `a.b.c` chain starting at `start`, returning the
/// joined path and the number of tokens it spans.
fn attribute_chain(tokens: &[Tok], start: usize) -> (String, usize) {
    let mut parts = Vec::new();
    let mut index = start;
    while let Some(Tok::Name { name }) = tokens.get(index) {
        parts.push(name.clone());
        if matches!(tokens.get(index + 1), Some(Tok::Dot)) {
            index += 2;
        } else {
            break;
        }
    }
    (parts.join("."), index + 1 - start)
}

/// Checks every module named in one `import` statement against the
/// allow-list; only the top-level package of a dotted name is considered.
fn check_import(rest: &[Tok]) -> Result<(), UnsafeCodeError> {
    let mut expect_module = true;
    let mut index = 0;
    while index < rest.len() {
        match &rest[index] {
            Tok::Newline | Tok::Semi => break,
            Tok::Name { name } if expect_module => {
                if !SAFE_MODULES.contains(&name.as_str()) {
                    return Err(UnsafeCodeError::new(format!("import not allowed: {name}")));
                }
                expect_module = false;
                // skip the rest of this dotted or aliased segment
                while index + 1 < rest.len()
                    && !matches!(rest[index + 1], Tok::Comma | Tok::Newline | Tok::Semi)
                {
                    index += 1;
                }
            }
            Tok::Comma => expect_module = true,
            _ => {}
        }
        index += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_listed_script_passes() {
        let code = "\
import json
import math

def execute(data, context):
    value = math.sqrt(data[\"input\"])
    return {\"result\": value}, context
";
        assert!(screen_code(code).is_ok());
    }

    #[test]
    fn test_import_os_is_rejected() {
        let err = screen_code("import os\n").unwrap_err();
        assert!(err.reason.contains("import not allowed: os"));
    }

    #[test]
    fn test_nested_import_is_rejected() {
        let code = "\
def execute(data, context):
    import subprocess
    return data, context
";
        assert!(screen_code(code).is_err());
    }

    #[test]
    fn test_from_import_is_rejected() {
        let err = screen_code("from json import loads\n").unwrap_err();
        assert!(err.reason.contains("from ... import"));
    }

    #[test]
    fn test_dotted_import_checks_top_level_package() {
        assert!(screen_code("import os.path\n").is_err());
        assert!(screen_code("import datetime, json\n").is_ok());
        assert!(screen_code("import json, os\n").is_err());
    }

    #[test]
    fn test_forbidden_builtins_are_rejected() {
        for call in ["eval(\"1\")", "exec(\"x=1\")", "open(\"f\")", "input()"] {
            let code = format!("def execute(data, context):\n    {call}\n    return data, context\n");
            assert!(screen_code(&code).is_err(), "expected {call} to be rejected");
        }
    }

    #[test]
    fn test_forbidden_attribute_calls_are_rejected() {
        let code = "\
def execute(data, context):
    os.system(\"rm -rf /\")
    return data, context
";
        let err = screen_code(code).unwrap_err();
        assert!(err.reason.contains("os.system"));
    }

    #[test]
    fn test_unrelated_attribute_calls_pass() {
        let code = "\
import re

def execute(data, context):
    match = re.compile(\"a+\").match(data[\"text\"])
    return {\"matched\": match is not None}, context
";
        assert!(screen_code(code).is_ok());
    }

    #[test]
    fn test_syntax_error_is_rejected() {
        let err = screen_code("def execute(data context):\n    return\n").unwrap_err();
        assert!(err.reason.contains("syntax error"));
    }

    #[test]
    fn test_bare_name_reference_is_allowed() {
        // only calls are blocked, mirroring the original scanner
        assert!(screen_code("handler = print\n").is_ok());
    }

    #[test]
    fn test_auditor_pass_can_reject() {
        struct RejectEverything;
        impl CodeAuditor for RejectEverything {
            fn audit(&self, _code: &str, _threshold: Severity) -> Result<(), UnsafeCodeError> {
                Err(UnsafeCodeError::new("audit finding"))
            }
        }

        let code = "import json\n";
        assert!(screen_code(code).is_ok());
        let err = screen_code_with(code, Some(&RejectEverything), Severity::Medium).unwrap_err();
        assert!(err.reason.contains("audit finding"));
    }

    #[test]
    fn test_severity_parsing() {
        assert_eq!("low".parse::<Severity>().unwrap(), Severity::Low);
        assert_eq!("high".parse::<Severity>().unwrap(), Severity::High);
        assert!("extreme".parse::<Severity>().is_err());
    }
}
