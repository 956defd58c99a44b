use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};
use royaltybook::clock::{Clock, FixedClock};
use royaltybook::credentials::PortalCredentials;
use royaltybook::models::{Invoice, InvoiceId, LogLevel, RunStatus, StatementId};
use royaltybook::scrape::{RunOutcome, ScrapeOrchestrator, ScrapeRun};
use royaltybook::storage::{MemoryStorage, SqliteStorage, Storage};
use rust_decimal::Decimal;
use tempfile::TempDir;

mod support;
use support::{
    dashboard_page, dashboard_url, grid_page, grid_page_url, line_item, property_row,
    statement_page, statement_page_url, summary_page, summary_url, table_row, test_credentials,
    test_settings, with_login, with_session, FakeDriver, GridRow, MFA_URL,
};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 2, 1, 9, 30, 0).unwrap(),
    ))
}

/// Dashboard, a one-page grid listing invoices 101-103, and their detail
/// pages. Invoice 102 has statements 9001 and 9002; 103 has 9003.
fn portal(driver: FakeDriver) -> FakeDriver {
    driver
        .page(dashboard_url(), dashboard_page())
        .page(
            grid_page_url(1),
            grid_page(
                &[
                    GridRow::new("101", "Devon Energy", "$50.00"),
                    GridRow::new("102", "Pioneer", "$200.00"),
                    GridRow::new("103", "Oxy", "$300.00"),
                ],
                1,
                1,
            ),
        )
        .page(summary_url(101), summary_page("$50.00", vec![]))
        .page(
            summary_url(102),
            summary_page(
                "$985.00",
                vec![
                    property_row(9001, "100234", "SMITH 1H", "$600.00"),
                    property_row(9002, "100235", "SMITH 2H", "$385.00"),
                ],
            ),
        )
        .page(
            summary_url(103),
            summary_page(
                "$300.00",
                vec![property_row(9003, "200871", "JONES UNIT", "$300.00")],
            ),
        )
        .page(
            statement_page_url(9001),
            statement_page(vec![
                table_row(&["GAS"]),
                line_item("200.10", "400.00"),
                line_item("200.20", "200.00"),
            ]),
        )
        .page(
            statement_page_url(9002),
            statement_page(vec![table_row(&["OIL"]), line_item("400.10", "385.00")]),
        )
        .page(
            statement_page_url(9003),
            statement_page(vec![table_row(&["OIL"]), line_item("400.10", "300.00")]),
        )
}

async fn seeded_storage() -> Arc<MemoryStorage> {
    let storage = Arc::new(MemoryStorage::new());
    storage.seed_invoice(Invoice::new(InvoiceId::new(101))).await;
    storage
}

fn orchestrator(
    driver: FakeDriver,
    storage: Arc<dyn Storage>,
    debug: bool,
) -> ScrapeOrchestrator<FakeDriver> {
    ScrapeOrchestrator::new(driver, storage, test_settings(debug), test_credentials())
        .with_clock(clock())
}

#[tokio::test]
async fn processes_only_new_invoices() -> Result<()> {
    let storage = seeded_storage().await;
    let driver = portal(with_session(FakeDriver::new()));

    let summary = orchestrator(driver.clone(), storage.clone(), false)
        .run()
        .await?;

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.invoices_processed, 2);
    assert_eq!(summary.invoices_skipped, 1);
    assert_eq!(summary.message(), "Done: 2 invoices processed, 1 skipped");
    assert!(!driver.visits().contains(&summary_url(101)));

    let ids: Vec<_> = storage
        .invoices()
        .await
        .iter()
        .map(|i| i.invoice_id.get())
        .collect();
    assert_eq!(ids, vec![101, 102, 103]);
    assert_eq!(storage.detail_count().await, 4);

    let gas = storage.list_statement_details(StatementId::new(9001)).await?;
    assert_eq!(gas.len(), 2);
    assert!(gas.iter().all(|d| d.product_category == "GAS"));

    let run = storage.get_run(summary.run_id).await?.unwrap();
    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.invoices_processed, 2);
    assert_eq!(run.invoices_skipped, 1);
    assert_eq!(run.error_message, None);
    assert_eq!(run.started_at, clock().now());
    assert!(run.finished_at.is_some());
    Ok(())
}

#[tokio::test]
async fn summary_values_override_grid_values() -> Result<()> {
    let storage = seeded_storage().await;
    let driver = portal(with_session(FakeDriver::new()));

    orchestrator(driver, storage.clone(), false).run().await?;

    let invoice = storage.get_invoice(InvoiceId::new(102)).await?.unwrap();
    assert_eq!(invoice.total_amount, Some(dec("985.00")));
    assert_eq!(invoice.total_revenue, Some(dec("1000.00")));
    assert_eq!(invoice.check_number, "CHK-SUMMARY");
    assert_eq!(invoice.operator, "Pioneer");

    let properties = storage.list_properties(InvoiceId::new(102)).await?;
    assert_eq!(properties.len(), 2);
    assert_eq!(properties[0].description, "SMITH 1H");
    Ok(())
}

#[tokio::test]
async fn failing_statement_does_not_stop_the_invoice() -> Result<()> {
    let storage = seeded_storage().await;
    let driver = portal(with_session(FakeDriver::new())).fail_on(statement_page_url(9001));

    let summary = orchestrator(driver, storage.clone(), false).run().await?;

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.invoices_processed, 2);
    assert!(storage
        .list_statement_details(StatementId::new(9001))
        .await?
        .is_empty());
    assert_eq!(
        storage
            .list_statement_details(StatementId::new(9002))
            .await?
            .len(),
        1
    );

    let logs = storage.list_logs(summary.run_id).await?;
    assert!(logs
        .iter()
        .any(|l| l.level == LogLevel::Warning && l.message.contains("statement 9001")));
    Ok(())
}

#[tokio::test]
async fn failing_invoice_does_not_stop_the_run() -> Result<()> {
    let storage = seeded_storage().await;
    let driver = portal(with_session(FakeDriver::new())).fail_on(summary_url(102));

    let summary = orchestrator(driver, storage.clone(), false).run().await?;

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.invoices_processed, 1);
    assert!(storage.get_invoice(InvoiceId::new(102)).await?.is_none());
    assert!(storage.get_invoice(InvoiceId::new(103)).await?.is_some());

    let logs = storage.list_logs(summary.run_id).await?;
    assert!(logs.iter().any(|l| l.level == LogLevel::Warning
        && l.message.starts_with("Error processing invoice 102")));
    Ok(())
}

#[tokio::test]
async fn debug_mode_processes_first_new_invoice_only() -> Result<()> {
    let storage = seeded_storage().await;
    let driver = portal(with_session(FakeDriver::new()));

    let summary = orchestrator(driver, storage.clone(), true).run().await?;

    assert_eq!(summary.invoices_processed, 1);
    assert_eq!(summary.invoices_skipped, 1);
    assert!(storage.get_invoice(InvoiceId::new(102)).await?.is_some());
    assert!(storage.get_invoice(InvoiceId::new(103)).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn second_run_skips_everything() -> Result<()> {
    let storage = seeded_storage().await;
    let driver = portal(with_session(FakeDriver::new()));

    orchestrator(driver.clone(), storage.clone(), false)
        .run()
        .await?;
    let details_after_first = storage.detail_count().await;

    let second = orchestrator(driver, storage.clone(), false).run().await?;

    assert_eq!(second.invoices_processed, 0);
    assert_eq!(second.invoices_skipped, 3);
    assert_eq!(storage.detail_count().await, details_after_first);

    let runs = storage.list_runs(10).await?;
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].id, second.run_id);
    Ok(())
}

#[tokio::test]
async fn mfa_challenge_ends_run_as_mfa_required() -> Result<()> {
    let storage = seeded_storage().await;
    let driver = portal(with_login(FakeDriver::new(), MFA_URL));

    let summary = orchestrator(driver, storage.clone(), false).run().await?;

    assert_eq!(summary.outcome, RunOutcome::MfaRequired);
    assert_eq!(summary.outcome.exit_code(), 3);
    assert_eq!(summary.invoices_processed, 0);

    let run = storage.get_run(summary.run_id).await?.unwrap();
    assert_eq!(run.status, RunStatus::MfaRequired);
    assert!(run.error_message.is_some());
    assert!(run.finished_at.is_some());
    Ok(())
}

#[tokio::test]
async fn missing_credentials_are_a_login_failure() -> Result<()> {
    let storage = seeded_storage().await;
    let driver = portal(with_login(FakeDriver::new(), &dashboard_url()));

    let summary = ScrapeOrchestrator::new(
        driver,
        storage.clone(),
        test_settings(false),
        PortalCredentials::default(),
    )
    .run()
    .await?;

    assert_eq!(summary.outcome, RunOutcome::LoginFailed);
    assert_eq!(summary.outcome.exit_code(), 2);
    let run = storage.get_run(summary.run_id).await?.unwrap();
    assert_eq!(run.status, RunStatus::Failure);
    Ok(())
}

#[tokio::test]
async fn unreachable_dashboard_fails_the_run() -> Result<()> {
    let storage = seeded_storage().await;
    let driver = with_session(FakeDriver::new()).fail_on(dashboard_url());

    let summary = orchestrator(driver, storage.clone(), false).run().await?;

    assert_eq!(summary.outcome, RunOutcome::Failed);
    assert_eq!(summary.outcome.exit_code(), 1);
    let logs = storage.list_logs(summary.run_id).await?;
    assert!(logs.iter().any(|l| l.level == LogLevel::Error));
    Ok(())
}

#[tokio::test]
async fn interruption_is_recorded_as_failure() -> Result<()> {
    let storage = seeded_storage().await;
    let driver = portal(with_session(FakeDriver::new()));

    let summary = orchestrator(driver, storage.clone(), false)
        .run_until(std::future::ready(()))
        .await?;

    assert_eq!(summary.outcome, RunOutcome::Interrupted);
    let run = storage.get_run(summary.run_id).await?.unwrap();
    assert_eq!(run.status, RunStatus::Failure);
    assert_eq!(
        run.error_message.as_deref(),
        Some("Run interrupted before completion")
    );
    let logs = storage.list_logs(summary.run_id).await?;
    assert_eq!(logs.last().map(|l| l.level), Some(LogLevel::Error));
    Ok(())
}

#[tokio::test]
async fn failed_browser_launch_still_records_the_run() -> Result<()> {
    let storage = seeded_storage().await;
    let run = ScrapeRun::start(storage.clone(), clock(), false).await?;
    let run_id = run.run_id();
    run.log().info("Launching browser").await;

    let summary = run
        .abort(anyhow!("Chrome executable not found").context("Failed to launch browser"))
        .await?;

    assert_eq!(summary.run_id, run_id);
    assert_eq!(summary.outcome, RunOutcome::Failed);
    assert_eq!(summary.outcome.exit_code(), 1);

    let run = storage.get_run(run_id).await?.unwrap();
    assert_eq!(run.status, RunStatus::Failure);
    assert!(run.finished_at.is_some());
    assert_eq!(
        run.error_message.as_deref(),
        Some("Failed to launch browser: Chrome executable not found")
    );

    let logs = storage.list_logs(run_id).await?;
    let last = logs.last().unwrap();
    assert_eq!(last.level, LogLevel::Error);
    assert!(last.message.contains("Chrome executable not found"));
    Ok(())
}

#[tokio::test]
async fn run_started_before_launch_is_continued() -> Result<()> {
    let storage = seeded_storage().await;
    let run = ScrapeRun::start(storage.clone(), clock(), false).await?;
    let run_id = run.run_id();

    let driver = portal(with_session(FakeDriver::new()));
    let summary = orchestrator(driver, storage.clone(), false)
        .run_in(run, std::future::pending::<()>())
        .await?;

    assert_eq!(summary.run_id, run_id);
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.invoices_processed, 2);

    let runs = storage.list_runs(10).await?;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Success);
    Ok(())
}

#[tokio::test]
async fn end_to_end_with_sqlite() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("data").join("royalties.db");
    let storage = Arc::new(SqliteStorage::open(&path)?);
    let driver = portal(with_session(FakeDriver::new()));

    let summary = orchestrator(driver.clone(), storage.clone(), false)
        .run()
        .await?;
    assert_eq!(summary.invoices_processed, 3);

    let again = orchestrator(driver, storage.clone(), false).run().await?;
    assert_eq!(again.invoices_processed, 0);
    assert_eq!(again.invoices_skipped, 3);

    assert_eq!(
        storage
            .list_statement_details(StatementId::new(9003))
            .await?
            .len(),
        1
    );
    let run = storage.get_run(summary.run_id).await?.unwrap();
    assert_eq!(run.status, RunStatus::Success);
    Ok(())
}
