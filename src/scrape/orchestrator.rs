//! Runs the whole scrape: login, list, per-invoice detail, persistence.
//!
//! Every run is recorded before anything else happens and finished on every
//! exit path, with a status of success, failure or mfa_required. Errors in
//! one invoice (or one property) are logged and skipped; only login failure,
//! an unreachable invoice list, or interruption end the run early.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::browser::Driver;
use crate::clock::{Clock, SystemClock};
use crate::config::{ExtractionConfig, PortalConfig, ResolvedConfig, TimeoutConfig};
use crate::credentials::PortalCredentials;
use crate::models::{Invoice, Property, RunCompletion, RunId, RunStatus, StatementId};
use crate::storage::Storage;

use super::auth::{AuthError, AuthenticationFlow};
use super::detail::{DetailExtractor, StatementTableFinder};
use super::grid::ListExtractor;
use super::portal::Portal;
use super::run_log::RunLogger;

/// What ended a run early.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Run interrupted before completion")]
    Interrupted,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// How a run ended, from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    LoginFailed,
    MfaRequired,
    Failed,
    Interrupted,
}

impl RunOutcome {
    pub fn status(self) -> RunStatus {
        match self {
            RunOutcome::Completed => RunStatus::Success,
            RunOutcome::MfaRequired => RunStatus::MfaRequired,
            RunOutcome::LoginFailed | RunOutcome::Failed | RunOutcome::Interrupted => {
                RunStatus::Failure
            }
        }
    }

    /// Process exit code for this outcome.
    pub fn exit_code(self) -> u8 {
        match self {
            RunOutcome::Completed => 0,
            RunOutcome::LoginFailed => 2,
            RunOutcome::MfaRequired => 3,
            RunOutcome::Failed | RunOutcome::Interrupted => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: RunId,
    pub outcome: RunOutcome,
    pub invoices_processed: u32,
    pub invoices_skipped: u32,
    pub error: Option<String>,
}

impl RunSummary {
    /// One line for the console.
    pub fn message(&self) -> String {
        match self.outcome {
            RunOutcome::Completed => format!(
                "Done: {} invoices processed, {} skipped",
                self.invoices_processed, self.invoices_skipped
            ),
            RunOutcome::MfaRequired => {
                "MFA required: complete the challenge in a headed browser and re-run".to_string()
            }
            RunOutcome::LoginFailed => format!(
                "Login failed: {}",
                self.error.as_deref().unwrap_or("unknown error")
            ),
            RunOutcome::Failed => format!(
                "Scrape failed after {} invoices: {}",
                self.invoices_processed,
                self.error.as_deref().unwrap_or("unknown error")
            ),
            RunOutcome::Interrupted => format!(
                "Interrupted after {} invoices processed",
                self.invoices_processed
            ),
        }
    }
}

/// Everything the pipeline reads from configuration.
#[derive(Debug, Clone, Default)]
pub struct ScrapeSettings {
    pub portal: PortalConfig,
    pub timeouts: TimeoutConfig,
    pub extraction: ExtractionConfig,
    /// Process only the first new invoice.
    pub debug: bool,
}

impl ScrapeSettings {
    pub fn from_config(config: &ResolvedConfig, debug: bool) -> Self {
        Self {
            portal: config.portal.clone(),
            timeouts: config.timeouts.clone(),
            extraction: config.extraction.clone(),
            debug,
        }
    }
}

#[derive(Debug, Default)]
struct Progress {
    processed: u32,
    skipped: u32,
}

/// A run record that has been created and is waiting to be finished.
///
/// Starting the run before the browser exists means a failed launch still
/// leaves a `failure` row with the error in its log.
pub struct ScrapeRun {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    log: RunLogger,
}

impl ScrapeRun {
    pub async fn start(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, debug: bool) -> Result<Self> {
        let run_id = storage
            .create_run(clock.now())
            .await
            .context("Failed to create scrape run")?;
        let log = RunLogger::new(storage.clone(), clock.clone(), run_id);
        log.info(format!(
            "Scrape run {run_id} started{}",
            if debug { " (debug: first new invoice only)" } else { "" }
        ))
        .await;
        Ok(Self { storage, clock, log })
    }

    pub fn run_id(&self) -> RunId {
        self.log.run_id()
    }

    pub fn log(&self) -> &RunLogger {
        &self.log
    }

    /// Finish the run as failed because setup (credentials, browser launch)
    /// went wrong before the pipeline could start.
    pub async fn abort(self, error: anyhow::Error) -> Result<RunSummary> {
        self.log.error(format!("Scrape failed: {error:?}")).await;
        let message = format!("{error:#}");
        self.finish(RunOutcome::Failed, Some(message), Progress::default())
            .await
    }

    async fn finish(
        self,
        outcome: RunOutcome,
        error: Option<String>,
        progress: Progress,
    ) -> Result<RunSummary> {
        let run_id = self.run_id();
        let completion = RunCompletion {
            status: outcome.status(),
            invoices_processed: progress.processed,
            invoices_skipped: progress.skipped,
            error_message: error.clone(),
        };
        self.storage
            .finish_run(run_id, &completion, self.clock.now())
            .await
            .with_context(|| format!("Failed to finish scrape run {run_id}"))?;

        Ok(RunSummary {
            run_id,
            outcome,
            invoices_processed: progress.processed,
            invoices_skipped: progress.skipped,
            error,
        })
    }
}

pub struct ScrapeOrchestrator<D: Driver> {
    driver: D,
    storage: Arc<dyn Storage>,
    settings: ScrapeSettings,
    credentials: PortalCredentials,
    tables: StatementTableFinder,
    clock: Arc<dyn Clock>,
}

impl<D: Driver> ScrapeOrchestrator<D> {
    pub fn new(
        driver: D,
        storage: Arc<dyn Storage>,
        settings: ScrapeSettings,
        credentials: PortalCredentials,
    ) -> Self {
        let tables = StatementTableFinder::from_config(&settings.extraction);
        Self {
            driver,
            storage,
            settings,
            credentials,
            tables,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the statement table strategies.
    pub fn with_table_finder(mut self, tables: StatementTableFinder) -> Self {
        self.tables = tables;
        self
    }

    pub async fn run(&self) -> Result<RunSummary> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run the pipeline, stopping early (and recording the run as failed)
    /// if `shutdown` resolves first.
    ///
    /// Only errors from creating or finishing the run record itself are
    /// returned as `Err`; everything else lands in the summary.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<RunSummary>
    where
        F: Future<Output = ()> + Send,
    {
        let run = ScrapeRun::start(self.storage.clone(), self.clock.clone(), self.settings.debug)
            .await?;
        self.run_in(run, shutdown).await
    }

    /// Continue a run that was started before the driver existed.
    pub async fn run_in<F>(&self, run: ScrapeRun, shutdown: F) -> Result<RunSummary>
    where
        F: Future<Output = ()> + Send,
    {
        let mut progress = Progress::default();
        let result = tokio::select! {
            biased;
            _ = shutdown => Err(PipelineError::Interrupted),
            result = self.pipeline(&run.log, &mut progress) => result,
        };

        let log = &run.log;
        let (outcome, error) = match result {
            Ok(()) => {
                log.info(format!(
                    "Scrape run complete: {} processed, {} skipped",
                    progress.processed, progress.skipped
                ))
                .await;
                (RunOutcome::Completed, None)
            }
            Err(PipelineError::Auth(e @ AuthError::MfaRequired { .. })) => {
                let message = e.to_string();
                log.error(format!("MFA required: {message}")).await;
                (RunOutcome::MfaRequired, Some(message))
            }
            Err(PipelineError::Auth(e @ AuthError::LoginFailed { .. }))
            | Err(PipelineError::Auth(e @ AuthError::MissingCredential(_))) => {
                let message = e.to_string();
                log.error(format!("Login failed: {message}")).await;
                (RunOutcome::LoginFailed, Some(message))
            }
            Err(PipelineError::Auth(AuthError::Driver(e))) | Err(PipelineError::Other(e)) => {
                log.error(format!("Scrape failed: {e:?}")).await;
                (RunOutcome::Failed, Some(format!("{e:#}")))
            }
            Err(PipelineError::Interrupted) => {
                let message = PipelineError::Interrupted.to_string();
                log.error(message.clone()).await;
                (RunOutcome::Interrupted, Some(message))
            }
        };

        run.finish(outcome, error, progress).await
    }

    async fn pipeline(&self, log: &RunLogger, progress: &mut Progress) -> Result<(), PipelineError> {
        let settings = &self.settings;

        log.info("Logging in").await;
        AuthenticationFlow::new(
            &self.driver,
            &settings.portal,
            &settings.timeouts,
            &self.credentials,
        )
        .login()
        .await?;
        log.info("Login successful").await;

        let portal = Portal::new(&self.driver, &settings.portal, &settings.timeouts);
        portal
            .navigate_to_invoices()
            .await
            .context("Failed to open the invoice list")?;

        let listed = ListExtractor::new(&self.driver, &settings.portal, &settings.timeouts)
            .extract_all()
            .await
            .context("Failed to read the invoice list")?;
        log.info(format!("Found {} invoices in the list", listed.len()))
            .await;

        let (mut pending, known) = partition_new(self.storage.as_ref(), listed).await?;
        progress.skipped = known;
        log.info(format!(
            "{} new invoices to process, {known} already stored",
            pending.len()
        ))
        .await;

        if settings.debug && pending.len() > 1 {
            pending.truncate(1);
            log.info("Debug mode: processing only the first new invoice")
                .await;
        }

        let extractor = DetailExtractor::new(&self.driver, &settings.timeouts, &self.tables);
        let mut seen_statements = HashSet::new();
        for invoice in pending {
            let invoice_id = invoice.invoice_id;
            match self
                .process_invoice(invoice, &portal, &extractor, log, &mut seen_statements)
                .await
            {
                Ok(()) => progress.processed += 1,
                Err(e) => {
                    log.warn(format!("Error processing invoice {invoice_id}: {e:#}"))
                        .await
                }
            }
        }

        Ok(())
    }

    async fn process_invoice(
        &self,
        mut invoice: Invoice,
        portal: &Portal<'_, D>,
        extractor: &DetailExtractor<'_, D>,
        log: &RunLogger,
        seen_statements: &mut HashSet<StatementId>,
    ) -> Result<()> {
        let invoice_id = invoice.invoice_id;
        log.info(format!(
            "Processing invoice {invoice_id} ({})",
            invoice.operator
        ))
        .await;

        portal.navigate_to_invoice_summary(invoice_id).await?;
        let summary = extractor.invoice_summary(invoice_id).await?;
        invoice.merge_financials(&summary.financials);

        self.storage
            .insert_invoice(&invoice, log.run_id(), self.clock.now())
            .await?;
        log.info(format!(
            "Stored invoice {invoice_id} with {} properties",
            summary.properties.len()
        ))
        .await;

        for property in &summary.properties {
            let statement_id = property.statement_id;
            if !seen_statements.insert(statement_id) {
                tracing::debug!(%statement_id, "Statement already handled this run");
                continue;
            }
            if let Err(e) = self.process_property(property, portal, extractor, log).await {
                log.warn(format!(
                    "Error processing statement {statement_id} of invoice {invoice_id}: {e:#}"
                ))
                .await;
            }
        }

        Ok(())
    }

    async fn process_property(
        &self,
        property: &Property,
        portal: &Portal<'_, D>,
        extractor: &DetailExtractor<'_, D>,
        log: &RunLogger,
    ) -> Result<()> {
        let statement_id = property.statement_id;
        if !self
            .storage
            .insert_property(property, self.clock.now())
            .await?
        {
            log.info(format!(
                "Statement {statement_id} already stored, skipping details"
            ))
            .await;
            return Ok(());
        }

        portal.navigate_to_statement(statement_id).await?;
        let details = extractor.statement_details(statement_id).await?;
        for detail in &details {
            self.storage.insert_statement_detail(detail).await?;
        }
        log.info(format!(
            "Statement {statement_id} ({}): {} line items",
            property.description,
            details.len()
        ))
        .await;
        Ok(())
    }
}

/// Split the listing into invoices not yet stored (in list order) and a
/// count of those already stored.
pub async fn partition_new(
    storage: &dyn Storage,
    listed: Vec<Invoice>,
) -> Result<(Vec<Invoice>, u32)> {
    let mut pending = Vec::new();
    let mut known = 0;
    let mut queued = HashSet::new();
    for invoice in listed {
        if storage.invoice_exists(invoice.invoice_id).await? {
            known += 1;
        } else if queued.insert(invoice.invoice_id) {
            pending.push(invoice);
        }
    }
    Ok((pending, known))
}
