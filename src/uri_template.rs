//! Minimal RFC 6570 level-1 templates such as `docs://{doc_id}`, used to route
//! `resources/read` requests to resource template handlers.

use crate::error::{Error, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Variable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UriTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl UriTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| Error::Malformed(format!("unclosed variable in '{}'", template)))?;
            let name = &after[..close];
            if name.is_empty() || name.contains('{') {
                return Err(Error::Malformed(format!("bad variable name in '{}'", template)));
            }
            if matches!(segments.last(), Some(Segment::Variable(_))) {
                return Err(Error::Malformed(format!(
                    "adjacent variables are ambiguous in '{}'",
                    template
                )));
            }
            segments.push(Segment::Variable(name.to_string()));
            rest = &after[close + 1..];
        }
        if rest.contains('}') {
            return Err(Error::Malformed(format!("stray '}}' in '{}'", template)));
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Ok(Self {
            raw: template.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Variable(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Matches a concrete URI. Each variable binds one or more characters and never
    /// spans a `/`.
    pub fn matches(&self, uri: &str) -> Option<HashMap<String, String>> {
        let mut bindings = HashMap::new();
        let mut rest = uri;
        let mut segments = self.segments.iter().peekable();
        while let Some(segment) = segments.next() {
            match segment {
                Segment::Literal(text) => rest = rest.strip_prefix(text.as_str())?,
                Segment::Variable(name) => {
                    let end = match segments.peek() {
                        Some(Segment::Literal(next)) => rest.find(next.as_str())?,
                        _ => rest.len(),
                    };
                    let value = &rest[..end];
                    if value.is_empty() || value.contains('/') {
                        return None;
                    }
                    bindings.insert(name.clone(), value.to_string());
                    rest = &rest[end..];
                }
            }
        }
        rest.is_empty().then_some(bindings)
    }
}
