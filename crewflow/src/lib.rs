//! # Crewflow
//!
//! Orchestration core for multi-agent LLM pipelines.
//!
//! A pipeline is a set of stages, each one prompt to a generative model, wired
//! together by the outputs they read. Crewflow provides:
//!
//! - **Wavefront execution**: every stage whose inputs are ready runs at once
//! - **Resilient API calls**: classified retries with linear or exponential backoff
//! - **Streaming**: partial responses published to observers as they grow
//! - **Status tracking**: per-stage and per-run state with change listeners
//! - **Reset**: abandon a run at any point and start clean
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use crewflow::prelude::*;
//! use std::sync::Arc;
//!
//! let config = CrewflowConfig::from_json_str(r#"{ "api_key": "..." }"#)?;
//! let history = Arc::new(IdeaHistory::new());
//! let orchestrator = crew_orchestrator(&config, history)?;
//!
//! orchestrator.subscribe(Arc::new(LoggingStatusListener::default()));
//! let report = orchestrator.run(None).await?;
//! println!("{}", report.output("code-generation").unwrap_or_default());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod client;
pub mod config;
pub mod context;
pub mod core;
pub mod crew;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod streaming;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    #[cfg(feature = "gemini")]
    pub use crate::client::GeminiTransport;
    pub use crate::client::{
        PromptTransport, RetryConfig, RetryPolicy, RetryingApiClient, TransportError,
    };
    pub use crate::config::{ApiCredential, CrewflowConfig, GenerationConfig};
    pub use crate::context::{ContextEntry, PipelineContext, RunIdentity};
    pub use crate::core::{RunStatus, StageStatus, StatusEvent};
    #[cfg(feature = "gemini")]
    pub use crate::crew::crew_orchestrator;
    pub use crate::crew::{crew_orchestrator_with, crew_pipeline, IdeaHistory};
    pub use crate::errors::{
        ApiError, ApiErrorKind, ConfigurationError, CrewflowError, OutputConflictError,
    };
    pub use crate::events::{
        CollectingStatusListener, LoggingStatusListener, StatusListener, StatusTracker,
    };
    pub use crate::observability::{init_tracing, LoggingConfig};
    pub use crate::pipeline::{
        PipelineBuilder, PipelineOrchestrator, RunReport, StageDefinition, StageGraph,
    };
    pub use crate::streaming::StreamAggregator;
}
