//! Autocomplete for partially typed prompt and resource-template arguments.
//!
//! A `CompletionCatalog` is a declarative table keyed by `(reference, argument)`.
//! Each entry is either a fixed candidate list or a list chosen by the value of a
//! sibling argument the caller has already bound. Completing is a pure lookup.

use crate::types::{CompleteParams, CompleteResult, Completion, CompletionReference};
use std::collections::HashMap;

/// What is being completed and what the caller has typed so far.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionQuery {
    pub reference: CompletionReference,
    pub argument: String,
    pub value: String,
    /// Sibling arguments already bound by the caller.
    pub context: HashMap<String, String>,
}

impl CompletionQuery {
    pub fn new(reference: CompletionReference, argument: &str, value: &str) -> Self {
        Self {
            reference,
            argument: argument.to_string(),
            value: value.to_string(),
            context: HashMap::new(),
        }
    }

    pub fn with_context(mut self, name: &str, value: &str) -> Self {
        self.context.insert(name.to_string(), value.to_string());
        self
    }
}

impl From<CompleteParams> for CompletionQuery {
    fn from(params: CompleteParams) -> Self {
        Self {
            reference: params.reference,
            argument: params.argument.name,
            value: params.argument.value,
            context: params
                .context
                .and_then(|c| c.arguments)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompletionResult {
    pub values: Vec<String>,
    /// Always `false`. There is no pagination: every match is returned in one
    /// response, which the short candidate lists make affordable.
    pub has_more: bool,
}

impl CompletionResult {
    pub fn total(&self) -> usize {
        self.values.len()
    }
}

impl From<CompletionResult> for CompleteResult {
    fn from(result: CompletionResult) -> Self {
        CompleteResult {
            completion: Completion {
                total: Some(result.total() as u32),
                has_more: Some(result.has_more),
                values: result.values,
            },
        }
    }
}

#[derive(Debug, Clone)]
enum CandidateSource {
    Fixed(Vec<String>),
    DependsOn {
        sibling: String,
        table: HashMap<String, Vec<String>>,
    },
}

/// The declarative completion table.
#[derive(Debug, Clone, Default)]
pub struct CompletionCatalog {
    entries: HashMap<(CompletionReference, String), CandidateSource>,
}

impl CompletionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an unconditional candidate list, offered in the given order.
    pub fn fixed<I, S>(
        mut self,
        reference: CompletionReference,
        argument: &str,
        candidates: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries.insert(
            (reference, argument.to_string()),
            CandidateSource::Fixed(candidates.into_iter().map(Into::into).collect()),
        );
        self
    }

    /// Registers candidates chosen by the value bound to `sibling`. Table keys are
    /// matched against the lower-cased sibling value.
    pub fn dependent<I, K, V, S>(
        mut self,
        reference: CompletionReference,
        argument: &str,
        sibling: &str,
        table: I,
    ) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let table = table
            .into_iter()
            .map(|(k, v)| (k.into(), v.into_iter().map(Into::into).collect()))
            .collect();
        self.entries.insert(
            (reference, argument.to_string()),
            CandidateSource::DependsOn {
                sibling: sibling.to_string(),
                table,
            },
        );
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `None` for an unknown `(reference, argument)` pair. A dependent entry
    /// whose sibling is unbound or has no table row yields an empty result.
    pub fn complete(&self, query: &CompletionQuery) -> Option<CompletionResult> {
        let source = self
            .entries
            .get(&(query.reference.clone(), query.argument.clone()))?;
        let candidates: &[String] = match source {
            CandidateSource::Fixed(candidates) => candidates,
            CandidateSource::DependsOn { sibling, table } => {
                match query
                    .context
                    .get(sibling)
                    .and_then(|bound| table.get(&bound.to_lowercase()))
                {
                    Some(candidates) => candidates,
                    None => return Some(CompletionResult::default()),
                }
            }
        };

        let mut values: Vec<String> = Vec::new();
        for candidate in candidates {
            if candidate.starts_with(&query.value) && !values.contains(candidate) {
                values.push(candidate.clone());
            }
        }
        Some(CompletionResult {
            values,
            has_more: false,
        })
    }
}
