//! `$placeholder` email templates.
//!
//! Syntax:
//! - `$$` is a literal `$`
//! - `$name` and `${name}` are placeholders; names are ASCII identifiers
//!   (`[_A-Za-z][_A-Za-z0-9]*`)
//! - any other `$` makes the template malformed
//!
//! Substitution is strict: every placeholder must have a value.

use crate::error::{NotificationError, NotificationResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{AsRefStr, Display};

/// Built-in plaintext template.
pub const DEFAULT_PLAINTEXT_TEMPLATE: &str =
    "Dear $recipient_name,\n\n$plaintext_body\n\nWarm regards,\n\nThe Team";

/// Built-in HTML template.
pub const DEFAULT_HTML_TEMPLATE: &str = concat!(
    "<!DOCTYPE html><html><head></head>",
    "<body style=\"color: #00393f;padding: 12px;\">",
    "<h2>Dear $recipient_name,</h2>",
    "<p>$plaintext_body</p>",
    "<p>Warm regards,</p>",
    "<h3>The Team</h3>",
    "</body></html>"
);

/// Which body part a template renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    Plaintext,
    Html,
}

/// Values available to placeholders, keyed by name.
pub type TemplateVars = HashMap<String, String>;

/// An email template of a known kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailTemplate {
    kind: TemplateKind,
    source: String,
}

impl EmailTemplate {
    pub fn new(kind: TemplateKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    pub fn plaintext(source: impl Into<String>) -> Self {
        Self::new(TemplateKind::Plaintext, source)
    }

    pub fn html(source: impl Into<String>) -> Self {
        Self::new(TemplateKind::Html, source)
    }

    /// Replace every placeholder with its value from `vars`.
    ///
    /// Fails on the first problem found scanning left to right: a malformed
    /// `$` yields `MalformedTemplate`, an unknown name yields
    /// `MissingTemplateVariable`.
    pub fn substitute(&self, vars: &TemplateVars) -> NotificationResult<String> {
        let source = self.source.as_str();
        let mut output = String::with_capacity(source.len());
        let mut rest = source;

        while let Some(dollar) = rest.find('$') {
            output.push_str(&rest[..dollar]);
            let offset = source.len() - rest.len() + dollar;
            let after = &rest[dollar + 1..];

            let (name, consumed) = if let Some(stripped) = after.strip_prefix('$') {
                output.push('$');
                rest = stripped;
                continue;
            } else if let Some(braced) = after.strip_prefix('{') {
                match identifier_len(braced) {
                    len if len > 0 && braced[len..].starts_with('}') => (&braced[..len], len + 2),
                    _ => return Err(self.malformed(offset)),
                }
            } else {
                match identifier_len(after) {
                    0 => return Err(self.malformed(offset)),
                    len => (&after[..len], len),
                }
            };

            let value = vars
                .get(name)
                .ok_or_else(|| NotificationError::MissingTemplateVariable {
                    variable: name.to_string(),
                    template_type: self.kind,
                })?;

            output.push_str(value);
            rest = &after[consumed..];
        }

        output.push_str(rest);
        Ok(output)
    }

    fn malformed(&self, offset: usize) -> NotificationError {
        let (line, column) = line_and_column(&self.source, offset);
        NotificationError::MalformedTemplate {
            template_type: self.kind,
            problem: format!("invalid placeholder at line {}, column {}", line, column),
        }
    }
}

/// Byte length of the ASCII identifier at the start of `input` (0 if none).
fn identifier_len(input: &str) -> usize {
    let bytes = input.as_bytes();
    match bytes.first() {
        Some(b) if b.is_ascii_alphabetic() || *b == b'_' => bytes
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
            .count(),
        _ => 0,
    }
}

/// 1-based line and column (in characters) of a byte offset.
fn line_and_column(source: &str, offset: usize) -> (usize, usize) {
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}
