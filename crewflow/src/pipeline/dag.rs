//! Validated stage graph and wavefront planning.

use super::StageDefinition;
use crate::context::PipelineContext;
use std::collections::{HashMap, HashSet};

/// A validated, acyclic set of stages.
///
/// Built by [`PipelineBuilder`](super::PipelineBuilder); the constructor
/// itself performs no validation.
#[derive(Debug, Clone)]
pub struct StageGraph {
    stages: Vec<StageDefinition>,
    index: HashMap<String, usize>,
}

impl StageGraph {
    pub(crate) fn new(stages: Vec<StageDefinition>) -> Self {
        let index = stages
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        Self { stages, index }
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false for a built graph.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The first stage in definition order; the one an initial input seeds.
    #[must_use]
    pub fn first(&self) -> Option<&StageDefinition> {
        self.stages.first()
    }

    /// Looks up a stage.
    #[must_use]
    pub fn stage(&self, id: &str) -> Option<&StageDefinition> {
        self.index.get(id).map(|&i| &self.stages[i])
    }

    /// All stages in definition order.
    #[must_use]
    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    /// Stage ids in definition order.
    #[must_use]
    pub fn stage_ids(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.id.as_str()).collect()
    }

    /// Stages that read the output of `id`.
    #[must_use]
    pub fn dependents(&self, id: &str) -> Vec<&StageDefinition> {
        self.stages
            .iter()
            .filter(|s| s.depends_on.iter().any(|d| d == id))
            .collect()
    }

    /// Stages that may start now: not yet launched, with every dependency
    /// present in `context`. Returned in definition order.
    #[must_use]
    pub fn next_wavefront(
        &self,
        context: &PipelineContext,
        launched: &HashSet<String>,
    ) -> Vec<&StageDefinition> {
        self.stages
            .iter()
            .filter(|s| !launched.contains(&s.id) && !context.contains(&s.id))
            .filter(|s| context.contains_all(s.depends_on.iter()))
            .collect()
    }

    /// The full wavefront plan for a run where every stage succeeds.
    #[must_use]
    pub fn wavefronts(&self) -> Vec<Vec<&str>> {
        let mut done: HashSet<&str> = HashSet::new();
        let mut waves = Vec::new();
        while done.len() < self.stages.len() {
            let wave: Vec<&str> = self
                .stages
                .iter()
                .filter(|s| !done.contains(s.id.as_str()))
                .filter(|s| s.depends_on.iter().all(|d| done.contains(d.as_str())))
                .map(|s| s.id.as_str())
                .collect();
            if wave.is_empty() {
                break;
            }
            done.extend(wave.iter().copied());
            waves.push(wave);
        }
        waves
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextEntry;
    use crate::pipeline::PipelineBuilder;

    fn stage(id: &str, deps: &[&str]) -> StageDefinition {
        StageDefinition::new(id, |_| String::new()).with_dependencies(deps.iter().copied())
    }

    fn crew_shape() -> StageGraph {
        PipelineBuilder::new()
            .stage(stage("idea", &[]))
            .stage(stage("reqs", &["idea"]))
            .stage(stage("code", &["idea", "reqs"]))
            .stage(stage("review", &["code"]))
            .stage(stage("deploy", &["idea"]))
            .stage(stage("tests", &["idea", "code"]))
            .build()
            .unwrap()
    }

    fn done(ctx: &mut PipelineContext, id: &str) {
        ctx.insert(
            id,
            ContextEntry {
                output: id.to_string(),
                attempts: 1,
                seeded: false,
            },
        )
        .unwrap();
    }

    #[test]
    fn test_wavefront_plan() {
        let graph = crew_shape();
        assert_eq!(
            graph.wavefronts(),
            vec![
                vec!["idea"],
                vec!["reqs", "deploy"],
                vec!["code"],
                vec!["review", "tests"],
            ]
        );
    }

    #[test]
    fn test_next_wavefront_respects_context() {
        let graph = crew_shape();
        let mut ctx = PipelineContext::new();
        let mut launched = HashSet::new();

        let ids = |w: Vec<&StageDefinition>| w.iter().map(|s| s.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(graph.next_wavefront(&ctx, &launched)), vec!["idea"]);

        launched.insert("idea".to_string());
        assert!(graph.next_wavefront(&ctx, &launched).is_empty());

        done(&mut ctx, "idea");
        assert_eq!(ids(graph.next_wavefront(&ctx, &launched)), vec!["reqs", "deploy"]);
    }

    #[test]
    fn test_lookup_and_dependents() {
        let graph = crew_shape();
        assert_eq!(graph.first().unwrap().id, "idea");
        assert!(graph.stage("code").is_some());
        assert!(graph.stage("nope").is_none());
        let deps: Vec<_> = graph.dependents("code").iter().map(|s| s.id.as_str()).collect();
        assert_eq!(deps, vec!["review", "tests"]);
        assert!(!graph.is_empty());
    }
}
