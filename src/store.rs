//! An in-memory document store keyed by document id.

use crate::error::{Error, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Maps document ids to their text. Edits hold the write lock for the whole
/// replacement, so readers never observe a half-applied edit.
#[derive(Debug, Default)]
pub struct DocumentStore {
    docs: RwLock<HashMap<String, String>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents<I, K, V>(documents: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            docs: RwLock::new(
                documents
                    .into_iter()
                    .map(|(id, content)| (id.into(), content.into()))
                    .collect(),
            ),
        }
    }

    /// The six demonstration documents served by the document server.
    pub fn seeded() -> Self {
        Self::with_documents([
            (
                "deposition.md",
                "This deposition covers the testimony of Angela Smith, P.E.",
            ),
            (
                "report.pdf",
                "The report details the state of a 20m condenser tower.",
            ),
            (
                "financials.docx",
                "These financials outline the project's budget and expenditures.",
            ),
            (
                "outlook.pdf",
                "This document presents the projected future performance of the system.",
            ),
            (
                "plan.md",
                "The plan outlines the steps for the project's implementation.",
            ),
            (
                "spec.txt",
                "These specifications define the technical requirements for the equipment.",
            ),
        ])
    }

    pub async fn read(&self, id: &str) -> Result<String> {
        self.docs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Doc with id {} not found", id)))
    }

    /// Replaces every non-overlapping occurrence of `old` with `new` and returns how
    /// many were replaced. An `old` that does not occur, or is empty, leaves the
    /// document untouched.
    pub async fn edit(&self, id: &str, old: &str, new: &str) -> Result<usize> {
        let mut docs = self.docs.write().await;
        let content = docs
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("Doc with id {} not found", id)))?;
        if old.is_empty() {
            return Ok(0);
        }
        let count = content.matches(old).count();
        if count > 0 {
            *content = content.replace(old, new);
        }
        Ok(count)
    }

    pub async fn insert(&self, id: &str, content: &str) {
        self.docs
            .write()
            .await
            .insert(id.to_string(), content.to_string());
    }

    /// Document ids in lexical order.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.docs.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_read_and_missing() {
        let store = DocumentStore::seeded();
        assert!(store.read("report.pdf").await.unwrap().contains("condenser tower"));
        assert!(matches!(store.read("nope.md").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_edit_replaces_every_occurrence() {
        let store = DocumentStore::with_documents([("a.txt", "aaa and aaa")]);
        assert_eq!(store.edit("a.txt", "aa", "b").await.unwrap(), 2);
        assert_eq!(store.read("a.txt").await.unwrap(), "ba and ba");
    }

    #[tokio::test]
    async fn test_edit_then_read_back() {
        let store = DocumentStore::seeded();
        store.edit("plan.md", "steps", "milestones").await.unwrap();
        assert_eq!(
            store.read("plan.md").await.unwrap(),
            "The plan outlines the milestones for the project's implementation."
        );
    }

    #[tokio::test]
    async fn test_edit_without_match_is_byte_identical() {
        let store = DocumentStore::seeded();
        let before = store.read("spec.txt").await.unwrap();
        assert_eq!(store.edit("spec.txt", "zebra", "lion").await.unwrap(), 0);
        assert_eq!(store.edit("spec.txt", "", "lion").await.unwrap(), 0);
        assert_eq!(store.read("spec.txt").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_edit_round_trip_restores_original() {
        let store = DocumentStore::seeded();
        let original = store.read("report.pdf").await.unwrap();
        assert_eq!(store.edit("report.pdf", "condenser", "cooling").await.unwrap(), 1);
        assert_ne!(store.read("report.pdf").await.unwrap(), original);
        assert_eq!(store.edit("report.pdf", "cooling", "condenser").await.unwrap(), 1);
        assert_eq!(store.read("report.pdf").await.unwrap().as_bytes(), original.as_bytes());
    }

    #[tokio::test]
    async fn test_edit_missing_document() {
        let store = DocumentStore::seeded();
        assert!(matches!(
            store.edit("ghost.md", "a", "b").await,
            Err(Error::NotFound(_))
        ));
        assert_eq!(store.ids().await.len(), 6);
    }

    #[tokio::test]
    async fn test_ids_are_sorted_and_stable() {
        let store = DocumentStore::seeded();
        store.insert("aardvark.txt", "first").await;
        let ids = store.ids().await;
        assert_eq!(ids.first().map(String::as_str), Some("aardvark.txt"));
        assert_eq!(ids, store.ids().await);
    }

    #[tokio::test]
    async fn test_concurrent_edits_do_not_interleave() {
        let store = Arc::new(DocumentStore::with_documents([("n.txt", "x")]));
        let mut tasks = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.edit("n.txt", "x", "xy").await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        let content = store.read("n.txt").await.unwrap();
        assert_eq!(content, format!("x{}", "y".repeat(50)));
    }
}
