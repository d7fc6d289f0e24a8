// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Source language detection for TON contract projects

use serde::{Deserialize, Serialize};
use std::fmt;

/// Languages the pipeline knows how to verify.
///
/// `Other` files are carried through revisions but never drive planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Language {
    Tact,
    Func,
    Tolk,
    TypeScript,
    JavaScript,
    Other,
}

impl Language {
    /// Detect the language from a normalized file path.
    pub fn detect(path: &str) -> Self {
        match extension(path) {
            Some("tact") => Language::Tact,
            Some("fc") | Some("func") => Language::Func,
            Some("tolk") => Language::Tolk,
            Some("ts") => Language::TypeScript,
            Some("js") => Language::JavaScript,
            _ => Language::Other,
        }
    }

    /// Contract languages the sandbox has a dedicated check step for.
    pub fn is_contract_language(self) -> bool {
        matches!(self, Language::Tact | Language::Func | Language::Tolk)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Tact => "tact",
            Language::Func => "func",
            Language::Tolk => "tolk",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Other => "other",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Extensions accepted into a revision. Everything else is dropped during
/// archive validation.
pub const ACCEPTED_EXTENSIONS: &[&str] = &[
    "tact", "fc", "func", "tolk", "ts", "js", "json", "md", "toml", "yml", "yaml", "txt",
];

/// True when the extension is in the accepted allow-list.
pub fn is_accepted_extension(path: &str) -> bool {
    extension(path).is_some_and(|ext| ACCEPTED_EXTENSIONS.contains(&ext))
}

/// True when the path lives under a `test`/`tests`/`__tests__` directory or
/// carries a `.spec.` infix.
pub fn is_test_path(path: &str) -> bool {
    if path.contains(".spec.") {
        return true;
    }
    let mut segments: Vec<&str> = path.split('/').collect();
    // The final segment is the file name, not a directory.
    segments.pop();
    segments
        .iter()
        .any(|dir| matches!(*dir, "test" | "tests" | "__tests__"))
}

fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then_some(ext)
}

#[cfg(test)]
#[path = "language_tests.rs"]
mod tests;
