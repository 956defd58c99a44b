//! The scraping pipeline.
//!
//! [`classifier`] tells which page the browser is on, [`auth`] walks the
//! login flow, [`grid`] reads the invoice list, [`detail`] reads invoice
//! summaries and statements, and [`orchestrator`] ties them together with
//! persistence and run bookkeeping.

pub mod auth;
pub mod classifier;
pub mod detail;
pub mod grid;
pub mod numeric;
pub mod orchestrator;
pub mod portal;
mod run_log;
pub mod selectors;

pub use auth::{AuthError, AuthState, AuthenticationFlow};
pub use classifier::{PageClassifier, PageState};
pub use detail::{DetailExtractor, InvoiceSummary, StatementTableFinder, TableLocator};
pub use grid::{ListExtractor, PaginationState};
pub use orchestrator::{
    PipelineError, RunOutcome, RunSummary, ScrapeOrchestrator, ScrapeRun, ScrapeSettings,
};
pub use portal::Portal;
pub use run_log::RunLogger;
