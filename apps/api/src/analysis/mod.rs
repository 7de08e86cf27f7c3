// Résumé analysis: tiered remote → lenient-parse → local-heuristic pipeline,
// with every tier's output forced through the shaper.
// All provider calls go through llm_client; no direct HTTP here.

pub mod handlers;
pub mod heuristic;
pub mod lenient;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod shaper;
pub mod submission;

pub use orchestrator::Analyzer;
pub use submission::SubmissionService;
