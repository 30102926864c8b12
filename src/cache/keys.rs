//! Cache key templates.
//!
//! A `KeyPattern` is parsed once from a template such as `user:email:{email}`
//! and resolved per call against a `FilterSet`. Resolution is a pure function
//! of the template and the filter values: equal inputs always yield the same
//! key.

use std::fmt;
use std::str::FromStr;

use crate::domain::{DomainError, FilterSet};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed key template with `{name}` placeholders.
///
/// `{{` and `}}` produce literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern {
    template: String,
    segments: Vec<Segment>,
}

impl KeyPattern {
    pub fn parse(template: impl Into<String>) -> Result<Self, DomainError> {
        let template = template.into();
        let segments = parse_segments(&template)?;
        Ok(Self { template, segments })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    pub fn is_empty(&self) -> bool {
        self.template.is_empty()
    }

    /// Placeholder names in order of first appearance, without duplicates.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder(name) = segment
                && !names.contains(&name.as_str())
            {
                names.push(name);
            }
        }
        names
    }

    pub fn references(&self, name: &str) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, Segment::Placeholder(n) if n == name))
    }

    /// Substitute every placeholder with the canonical form of its argument.
    pub fn resolve(&self, args: &FilterSet) -> Result<String, DomainError> {
        self.render(args, |value| value)
    }

    /// Like [`resolve`](Self::resolve) but escapes glob metacharacters in the
    /// substituted values, so an argument can never widen a pattern scan.
    pub fn resolve_glob(&self, args: &FilterSet) -> Result<String, DomainError> {
        self.render(args, |value| escape_glob(&value))
    }

    fn render(
        &self,
        args: &FilterSet,
        transform: impl Fn(String) -> String,
    ) -> Result<String, DomainError> {
        let mut key = String::with_capacity(self.template.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => key.push_str(text),
                Segment::Placeholder(name) => {
                    let value = args
                        .get(name)
                        .ok_or_else(|| DomainError::missing_key_argument(name.clone()))?;
                    key.push_str(&transform(value.canonical()));
                }
            }
        }
        Ok(key)
    }
}

impl FromStr for KeyPattern {
    type Err = DomainError;

    fn from_str(template: &str) -> Result<Self, Self::Err> {
        Self::parse(template)
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

fn parse_segments(template: &str) -> Result<Vec<Segment>, DomainError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    match inner {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => {
                            return Err(DomainError::invalid_pattern(
                                template,
                                "nested `{` inside placeholder",
                            ));
                        }
                        other => name.push(other),
                    }
                }
                if !closed {
                    return Err(DomainError::invalid_pattern(
                        template,
                        "unterminated placeholder",
                    ));
                }
                let name = name.trim();
                if name.is_empty() {
                    return Err(DomainError::invalid_pattern(
                        template,
                        "empty placeholder name",
                    ));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Placeholder(name.to_string()));
            }
            '}' => {
                return Err(DomainError::invalid_pattern(template, "unmatched `}`"));
            }
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Escape Redis glob metacharacters (`*`, `?`, `[`, `]`, `\`).
pub fn escape_glob(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
