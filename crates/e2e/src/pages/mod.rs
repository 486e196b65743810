//! Page objects for the Foundry console

pub mod ingestion;
pub mod workflows;

pub use ingestion::{CardMatch, FormState, IngestionPage, RecordCard};
pub use workflows::{Lookup, RunPhase, WorkflowName, WorkflowRunReport, WorkflowsPage};
