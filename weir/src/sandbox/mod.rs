//! Isolated execution of user-supplied code.
//!
//! This module provides:
//! - Security screening of Python-equivalent scripts before any process
//!   is spawned
//! - The sandbox session: a long-lived child process serving one JSON
//!   request per line of input

mod process;
mod screen;

pub use process::{SandboxOptions, SandboxSession};
pub use screen::{
    screen_code, screen_code_with, CodeAuditor, Severity, FORBIDDEN_ATTR_CALLS, FORBIDDEN_CALLS,
    SAFE_MODULES,
};
