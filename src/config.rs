//! Analyzer configuration.
//!
//! Holds the heuristic tables the schema engine consults (wrapper classification keywords,
//! error and data field names) and the schema depth bound. Everything has a default, and a TOML
//! file may override any subset of it:
//!
//! ```toml
//! max_depth = 6
//! default_verdict = "success"
//! error_field_names = ["error", "message"]
//!
//! [[classification]]
//! keywords = ["Err", "Fail"]
//! verdict = "error"
//! ```

use crate::error::{Error, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Outcome a response wrapper is classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Success,
    Error,
}

/// One row of the ordered keyword table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRule {
    pub keywords: Vec<String>,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Maximum nesting depth of a resolved schema
    pub max_depth: usize,
    /// Rules tried in order against a wrapper's function name
    pub classification: Vec<ClassificationRule>,
    /// Verdict when no rule matches
    pub default_verdict: Verdict,
    /// Properties whose presence marks a payload as an error shape
    pub error_field_names: Vec<String>,
    /// Property names that usually carry the business payload
    pub data_field_names: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        let words = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            max_depth: 10,
            classification: vec![
                ClassificationRule {
                    keywords: words(&["Err", "Error", "Fail", "Failed", "Bad", "Invalid"]),
                    verdict: Verdict::Error,
                },
                ClassificationRule {
                    keywords: words(&["OK", "Success"]),
                    verdict: Verdict::Success,
                },
            ],
            default_verdict: Verdict::Success,
            error_field_names: words(&[
                "error", "err", "errors", "message", "msg", "code", "err_code", "status",
            ]),
            data_field_names: words(&["data", "result", "payload", "body", "resp", "response"]),
        }
    }
}

impl AnalyzerConfig {
    /// Loads a TOML config file; missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading analyzer config from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| match e {
            Error::ConfigError(msg) => Error::ConfigError(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AnalyzerConfig = toml::from_str(content)?;
        if config.max_depth == 0 {
            return Err(Error::ConfigError("max_depth must be at least 1".to_string()));
        }
        Ok(config)
    }

    /// Verdict of the first rule with a keyword contained in `name`, ignoring case.
    pub fn classify_name(&self, name: &str) -> Option<Verdict> {
        let name = name.to_lowercase();
        self.classification
            .iter()
            .find(|rule| {
                rule.keywords
                    .iter()
                    .any(|keyword| name.contains(&keyword.to_lowercase()))
            })
            .map(|rule| rule.verdict)
    }

    pub fn is_error_field(&self, name: &str) -> bool {
        self.error_field_names
            .iter()
            .any(|field| field.eq_ignore_ascii_case(name))
    }

    pub fn is_data_field(&self, name: &str) -> bool {
        self.data_field_names
            .iter()
            .any(|field| field.eq_ignore_ascii_case(name))
    }
}
