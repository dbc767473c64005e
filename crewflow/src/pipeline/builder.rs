//! Pipeline builder with validation.

use super::{StageDefinition, StageGraph};
use crate::errors::{ConfigurationError, ContractErrorInfo, CycleDetectedError, PipelineValidationError};
use std::collections::{HashMap, HashSet};

/// Builder for creating validated stage graphs.
///
/// Stages may be added in any order; dependencies are resolved in
/// [`PipelineBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    /// The stage definitions, in definition order.
    stages: Vec<StageDefinition>,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder where each stage depends on the one before it.
    #[must_use]
    pub fn sequential(stages: impl IntoIterator<Item = StageDefinition>) -> Self {
        let mut builder = Self::new();
        let mut previous: Option<String> = None;
        for stage in stages {
            let stage = match previous.take() {
                Some(prev) => stage.with_dependency(prev),
                None => stage,
            };
            previous = Some(stage.id.clone());
            builder.add_stage(stage);
        }
        builder
    }

    /// Adds a stage.
    #[must_use]
    pub fn stage(mut self, stage: StageDefinition) -> Self {
        self.add_stage(stage);
        self
    }

    /// Adds several stages.
    #[must_use]
    pub fn stage_all(mut self, stages: impl IntoIterator<Item = StageDefinition>) -> Self {
        self.stages.extend(stages);
        self
    }

    /// Adds a stage in place.
    pub fn add_stage(&mut self, stage: StageDefinition) {
        self.stages.push(stage);
    }

    /// Returns the number of stages added so far.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Validates the stages and builds the graph.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] for an empty pipeline, duplicate ids,
    /// self or unknown dependencies, or a dependency cycle.
    pub fn build(self) -> Result<StageGraph, ConfigurationError> {
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no stages")
                .with_error_info(
                    ContractErrorInfo::new("CONTRACT-004-EMPTY", "Cannot build an empty pipeline")
                        .with_fix_hint("Add at least one stage to the pipeline before building."),
                )
                .into());
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            stage.validate()?;
            if !seen.insert(stage.id.as_str()) {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{}' is defined more than once",
                    stage.id
                ))
                .with_stages(vec![stage.id.clone()])
                .with_error_info(
                    ContractErrorInfo::new(
                        "CONTRACT-004-CONFLICT",
                        format!("Duplicate stage id '{}'", stage.id),
                    )
                    .with_fix_hint("Rename one of the stages so every id is unique."),
                )
                .into());
            }
        }

        for stage in &self.stages {
            for dep in &stage.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(PipelineValidationError::new(format!(
                        "Stage '{}' depends on unknown stage '{}'",
                        stage.id, dep
                    ))
                    .with_stages(vec![stage.id.clone(), dep.clone()])
                    .with_error_info(
                        ContractErrorInfo::new(
                            "CONTRACT-004-MISSING_DEP",
                            format!("Dependency '{dep}' not found"),
                        )
                        .with_fix_hint("Add the missing stage or remove the dependency."),
                    )
                    .into());
                }
            }
        }

        detect_cycles(&self.stages)?;
        Ok(StageGraph::new(self.stages))
    }
}

/// Detects cycles in the dependency graph, visiting stages in definition order.
fn detect_cycles(stages: &[StageDefinition]) -> Result<(), CycleDetectedError> {
    let deps: HashMap<&str, &[String]> = stages
        .iter()
        .map(|s| (s.id.as_str(), s.depends_on.as_slice()))
        .collect();
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for stage in stages {
        if !visited.contains(stage.id.as_str()) {
            if let Some(cycle) = dfs_cycle(&stage.id, &deps, &mut visited, &mut rec_stack, &mut path) {
                return Err(CycleDetectedError::new(cycle));
            }
        }
    }
    Ok(())
}

fn dfs_cycle<'a>(
    node: &'a str,
    deps: &HashMap<&'a str, &'a [String]>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    for dep in deps.get(node).copied().unwrap_or_default() {
        let dep = dep.as_str();
        if !visited.contains(dep) {
            if let Some(cycle) = dfs_cycle(dep, deps, visited, rec_stack, path) {
                return Some(cycle);
            }
        } else if rec_stack.contains(dep) {
            if let Some(start) = path.iter().position(|n| *n == dep) {
                let mut cycle: Vec<String> = path[start..].iter().map(|s| (*s).to_string()).collect();
                cycle.push(dep.to_string());
                return Some(cycle);
            }
        }
    }

    path.pop();
    rec_stack.remove(node);
    None
}
