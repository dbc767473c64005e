//! Stage definitions.

use crate::context::PipelineContext;
use crate::errors::{ContractErrorInfo, PipelineValidationError};
use std::fmt;
use std::sync::Arc;

/// Builds a stage prompt from the outputs finished so far.
pub type PromptBuilder = Arc<dyn Fn(&PipelineContext) -> String + Send + Sync>;

/// Turns an initial input into the output of a bypassed stage.
pub type SeedFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// One stage of a pipeline.
///
/// Definitions are plain data: the orchestrator treats every stage the same
/// way and never branches on a stage id.
#[derive(Clone)]
pub struct StageDefinition {
    /// The unique id of the stage.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Display role, e.g. "Product Manager".
    pub role: String,
    /// Display description.
    pub description: String,
    /// Ids of stages whose output this stage reads.
    pub depends_on: Vec<String>,
    build_prompt: PromptBuilder,
    seed: Option<SeedFn>,
}

impl fmt::Debug for StageDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("seeded", &self.seed.is_some())
            .finish_non_exhaustive()
    }
}

impl StageDefinition {
    /// Creates a stage with no dependencies.
    pub fn new<F>(id: impl Into<String>, build_prompt: F) -> Self
    where
        F: Fn(&PipelineContext) -> String + Send + Sync + 'static,
    {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            role: String::new(),
            description: String::new(),
            depends_on: Vec::new(),
            build_prompt: Arc::new(build_prompt),
            seed: None,
        }
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        let dep = dep.into();
        if !self.depends_on.contains(&dep) {
            self.depends_on.push(dep);
        }
        self
    }

    /// Adds several dependencies.
    #[must_use]
    pub fn with_dependencies(self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        deps.into_iter().fold(self, |def, dep| def.with_dependency(dep))
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the display role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    /// Sets the display description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets how an initial input becomes this stage's output.
    #[must_use]
    pub fn with_seed<F>(mut self, seed: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.seed = Some(Arc::new(seed));
        self
    }

    /// Builds the prompt for this stage.
    #[must_use]
    pub fn build_prompt(&self, context: &PipelineContext) -> String {
        (self.build_prompt)(context)
    }

    /// Produces the seeded output for an initial input.
    ///
    /// Without a seed function the input is used as is.
    #[must_use]
    pub fn seed(&self, initial_input: &str) -> String {
        self.seed
            .as_ref()
            .map_or_else(|| initial_input.to_string(), |seed| seed(initial_input))
    }

    /// Validates the definition on its own.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is blank or the stage depends on itself.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.id.trim().is_empty() {
            return Err(PipelineValidationError::new("Stage id cannot be empty")
                .with_error_info(
                    ContractErrorInfo::new("CONTRACT-004-INVALID_ID", "Empty stage id")
                        .with_fix_hint("Give every stage a non-empty id."),
                ));
        }
        if self.depends_on.contains(&self.id) {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' cannot depend on itself",
                self.id
            ))
            .with_stages(vec![self.id.clone()])
            .with_error_info(
                ContractErrorInfo::new(
                    "CONTRACT-004-SELF_DEP",
                    format!("Stage '{}' lists itself as a dependency", self.id),
                )
                .with_fix_hint("Remove the stage from its own dependency list."),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextEntry;

    #[test]
    fn test_definition_builder() {
        let def = StageDefinition::new("code", |_| "prompt".to_string())
            .with_name("Code Generation")
            .with_role("Developer")
            .with_description("Writes the code")
            .with_dependencies(["idea", "reqs", "idea"]);

        assert_eq!(def.id, "code");
        assert_eq!(def.name, "Code Generation");
        assert_eq!(def.role, "Developer");
        assert_eq!(def.depends_on, vec!["idea".to_string(), "reqs".to_string()]);
    }

    #[test]
    fn test_build_prompt_reads_context() {
        let def = StageDefinition::new("reqs", |ctx| format!("Expand: {}", ctx.get_or_empty("idea")))
            .with_dependency("idea");
        let mut ctx = PipelineContext::new();
        ctx.insert(
            "idea",
            ContextEntry {
                output: "Title: Notes".to_string(),
                attempts: 1,
                seeded: false,
            },
        )
        .unwrap();
        assert_eq!(def.build_prompt(&ctx), "Expand: Title: Notes");
    }

    #[test]
    fn test_seed_defaults_to_identity() {
        let def = StageDefinition::new("idea", |_| String::new());
        assert_eq!(def.seed("raw"), "raw");

        let def = def.with_seed(|input| format!("Title: {input}"));
        assert_eq!(def.seed("raw"), "Title: raw");
    }

    #[test]
    fn test_validate_self_dependency() {
        let def = StageDefinition::new("a", |_| String::new()).with_dependency("a");
        let err = def.validate().unwrap_err();
        assert_eq!(err.code(), Some("CONTRACT-004-SELF_DEP"));
        assert_eq!(err.stages, vec!["a".to_string()]);
    }

    #[test]
    fn test_validate_empty_id() {
        let def = StageDefinition::new("  ", |_| String::new());
        assert!(def.validate().is_err());
    }
}
