//! The six-agent application crew.
//!
//! Idea generation feeds requirements, deployment and testing; requirements
//! feed code generation; code feeds review and testing:
//!
//! ```text
//! idea-generation ─┬─ app-requirements ── code-generation ─┬─ code-review
//!                  ├──────────────────────────────────────┴─ testing
//!                  └─ deployment
//! ```

mod history;
pub mod prompts;

use std::sync::Arc;

pub use history::{extract_title, IdeaHistory};

use crate::client::PromptTransport;
use crate::config::CrewflowConfig;
use crate::errors::ConfigurationError;
use crate::pipeline::{PipelineBuilder, PipelineOrchestrator, StageDefinition, StageGraph};

/// Generates the application idea.
pub const IDEA_STAGE: &str = "idea-generation";
/// Writes the requirements document.
pub const REQUIREMENTS_STAGE: &str = "app-requirements";
/// Writes boilerplate code.
pub const CODE_STAGE: &str = "code-generation";
/// Reviews the code.
pub const REVIEW_STAGE: &str = "code-review";
/// Plans deployment.
pub const DEPLOYMENT_STAGE: &str = "deployment";
/// Plans testing.
pub const TESTING_STAGE: &str = "testing";

/// Formats a user-supplied idea the way the idea stage would answer.
#[must_use]
pub fn seed_idea(idea: &str) -> String {
    format!("Title: {idea}\nDescription: {idea}")
}

/// Builds the crew's stage graph.
///
/// The idea prompt lists every title in `history`, read when the prompt is
/// built.
///
/// # Errors
///
/// Returns an error only if the stage definitions are inconsistent.
pub fn crew_pipeline(history: Arc<IdeaHistory>) -> Result<StageGraph, ConfigurationError> {
    PipelineBuilder::new()
        .stage(
            StageDefinition::new(IDEA_STAGE, move |_| prompts::idea_generation(&history.titles()))
                .with_name("Idea Generation")
                .with_role("Product Strategist")
                .with_description("Generates a marketable full-stack application idea")
                .with_seed(seed_idea),
        )
        .stage(
            StageDefinition::new(REQUIREMENTS_STAGE, |ctx| {
                prompts::app_requirements(ctx.get_or_empty(IDEA_STAGE))
            })
            .with_name("Requirements Analysis")
            .with_role("Business Analyst")
            .with_description("Turns the idea into user stories and technical requirements")
            .with_dependency(IDEA_STAGE),
        )
        .stage(
            StageDefinition::new(CODE_STAGE, |ctx| {
                prompts::code_generation(
                    ctx.get_or_empty(IDEA_STAGE),
                    ctx.get_or_empty(REQUIREMENTS_STAGE),
                )
            })
            .with_name("Code Generation")
            .with_role("Full-Stack Developer")
            .with_description("Writes frontend, backend and schema boilerplate")
            .with_dependencies([IDEA_STAGE, REQUIREMENTS_STAGE]),
        )
        .stage(
            StageDefinition::new(REVIEW_STAGE, |ctx| {
                prompts::code_review(ctx.get_or_empty(CODE_STAGE))
            })
            .with_name("Code Review")
            .with_role("Senior Reviewer")
            .with_description("Reviews the generated code for security and quality")
            .with_dependency(CODE_STAGE),
        )
        .stage(
            StageDefinition::new(DEPLOYMENT_STAGE, |ctx| {
                prompts::deployment(ctx.get_or_empty(IDEA_STAGE))
            })
            .with_name("Deployment Strategy")
            .with_role("DevOps Engineer")
            .with_description("Plans hosting, CI/CD and monitoring")
            .with_dependency(IDEA_STAGE),
        )
        .stage(
            StageDefinition::new(TESTING_STAGE, |ctx| {
                prompts::testing(ctx.get_or_empty(IDEA_STAGE), ctx.get_or_empty(CODE_STAGE))
            })
            .with_name("Testing Plan")
            .with_role("QA Engineer")
            .with_description("Plans unit, integration and end-to-end tests")
            .with_dependencies([IDEA_STAGE, CODE_STAGE]),
        )
        .build()
}

/// Builds a crew orchestrator over any transport and subscribes `history`.
///
/// # Errors
///
/// Returns an error if the configuration is invalid.
pub fn crew_orchestrator_with(
    transport: Arc<dyn PromptTransport>,
    config: &CrewflowConfig,
    history: Arc<IdeaHistory>,
) -> Result<PipelineOrchestrator, ConfigurationError> {
    let graph = crew_pipeline(history.clone())?;
    let orchestrator = PipelineOrchestrator::from_config(graph, transport, config)?;
    orchestrator.subscribe(history);
    Ok(orchestrator)
}

/// Builds a crew orchestrator that talks to Gemini.
///
/// # Errors
///
/// Returns `MissingCredential` without a usable API key, or another
/// configuration error if the settings are invalid.
#[cfg(feature = "gemini")]
pub fn crew_orchestrator(
    config: &CrewflowConfig,
    history: Arc<IdeaHistory>,
) -> Result<PipelineOrchestrator, ConfigurationError> {
    let transport = crate::client::GeminiTransport::new(config)?;
    crew_orchestrator_with(Arc::new(transport), config, history)
}
