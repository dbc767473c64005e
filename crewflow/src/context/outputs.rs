//! Write-once store of finished stage outputs.

use crate::errors::OutputConflictError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A finished stage output with attempt tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// The final text produced by the stage.
    pub output: String,
    /// The API attempt that produced it (1-indexed, 0 when seeded).
    pub attempts: u32,
    /// Whether the entry came from the initial input rather than the API.
    pub seeded: bool,
}

/// Mapping from stage id to finished output for one run.
///
/// Entries are inserted exactly once, when their stage completes, and are
/// never overwritten. Only the orchestrator holds a mutable handle; prompt
/// builders and observers see it by shared reference.
#[derive(Debug, Clone, Default)]
pub struct PipelineContext {
    entries: HashMap<String, ContextEntry>,
    /// Completion order.
    order: Vec<String>,
}

impl PipelineContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the output for a stage.
    #[must_use]
    pub fn get(&self, stage_id: &str) -> Option<&str> {
        self.entries.get(stage_id).map(|e| e.output.as_str())
    }

    /// Gets the output for a stage, or an empty string.
    ///
    /// Prompt builders use this for optional upstream text.
    #[must_use]
    pub fn get_or_empty(&self, stage_id: &str) -> &str {
        self.get(stage_id).unwrap_or_default()
    }

    /// Gets the full entry for a stage.
    #[must_use]
    pub fn entry(&self, stage_id: &str) -> Option<&ContextEntry> {
        self.entries.get(stage_id)
    }

    /// Checks if a stage has finished.
    #[must_use]
    pub fn contains(&self, stage_id: &str) -> bool {
        self.entries.contains_key(stage_id)
    }

    /// Returns true if every id in `stage_ids` has an entry.
    pub fn contains_all<'a>(&self, mut stage_ids: impl Iterator<Item = &'a String>) -> bool {
        stage_ids.all(|id| self.entries.contains_key(id))
    }

    /// Records a stage output.
    ///
    /// # Errors
    ///
    /// Returns `OutputConflictError` if the stage already has an output.
    pub fn insert(
        &mut self,
        stage_id: impl Into<String>,
        entry: ContextEntry,
    ) -> Result<(), OutputConflictError> {
        let stage_id = stage_id.into();
        if self.entries.contains_key(&stage_id) {
            return Err(OutputConflictError::new(
                &stage_id,
                "Stage already has a final output",
            ));
        }
        self.order.push(stage_id.clone());
        self.entries.insert(stage_id, entry);
        Ok(())
    }

    /// Returns a copy of all outputs keyed by stage id.
    #[must_use]
    pub fn outputs(&self) -> HashMap<String, String> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.output.clone()))
            .collect()
    }

    /// Returns the attempt count recorded for each stage.
    #[must_use]
    pub fn attempts(&self) -> HashMap<String, u32> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.attempts))
            .collect()
    }

    /// Stage ids in completion order.
    #[must_use]
    pub fn completion_order(&self) -> &[String] {
        &self.order
    }

    /// Returns the number of finished stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no stage has finished.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry. Only a reset may do this.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(output: &str, attempts: u32) -> ContextEntry {
        ContextEntry {
            output: output.to_string(),
            attempts,
            seeded: false,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let mut ctx = PipelineContext::new();
        ctx.insert("idea", entry("Title: X", 1)).unwrap();

        assert_eq!(ctx.get("idea"), Some("Title: X"));
        assert!(ctx.contains("idea"));
        assert!(!ctx.contains("code"));
        assert_eq!(ctx.get_or_empty("code"), "");
    }

    #[test]
    fn test_insert_is_write_once() {
        let mut ctx = PipelineContext::new();
        ctx.insert("idea", entry("first", 1)).unwrap();

        let err = ctx.insert("idea", entry("second", 2)).unwrap_err();
        assert_eq!(err.stage, "idea");
        assert_eq!(ctx.get("idea"), Some("first"));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_entry_attempts() {
        let mut ctx = PipelineContext::new();
        ctx.insert("a", entry("x", 3)).unwrap();

        assert_eq!(ctx.entry("a").unwrap().attempts, 3);
        assert_eq!(ctx.attempts().get("a"), Some(&3));
    }

    #[test]
    fn test_contains_all_and_order() {
        let mut ctx = PipelineContext::new();
        ctx.insert("b", entry("1", 1)).unwrap();
        ctx.insert("a", entry("2", 1)).unwrap();

        let deps = vec!["a".to_string(), "b".to_string()];
        assert!(ctx.contains_all(deps.iter()));
        let more = vec!["a".to_string(), "c".to_string()];
        assert!(!ctx.contains_all(more.iter()));
        assert_eq!(ctx.completion_order(), &["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_clear() {
        let mut ctx = PipelineContext::new();
        ctx.insert("a", entry("x", 1)).unwrap();
        ctx.clear();

        assert!(ctx.is_empty());
        assert!(ctx.completion_order().is_empty());
        ctx.insert("a", entry("y", 1)).unwrap();
        assert_eq!(ctx.get("a"), Some("y"));
    }
}
