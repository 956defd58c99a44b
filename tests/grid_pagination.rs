use std::time::Duration;

use anyhow::Result;
use royaltybook::browser::Driver;
use royaltybook::config::{PortalConfig, TimeoutConfig};
use royaltybook::models::InvoiceId;
use royaltybook::scrape::{ListExtractor, PaginationState};
use rust_decimal::Decimal;

mod support;
use support::{grid_page, grid_page_url, FakeDriver, GridRow};

fn ids(invoices: &[royaltybook::models::Invoice]) -> Vec<i64> {
    invoices.iter().map(|i| i.invoice_id.get()).collect()
}

#[tokio::test]
async fn concatenates_every_page_in_order() -> Result<()> {
    let driver = FakeDriver::new()
        .page(
            grid_page_url(1),
            grid_page(
                &[
                    GridRow::new("101", "Devon Energy", "$100.00"),
                    GridRow::new("102", "Pioneer", "$200.00"),
                ],
                1,
                3,
            ),
        )
        .page(
            grid_page_url(2),
            grid_page(&[GridRow::new("103", "Oxy", "$300.00")], 2, 3),
        )
        .page(
            grid_page_url(3),
            grid_page(&[GridRow::new("104", "EOG", "(25.50)")], 3, 3),
        );
    driver.goto(&grid_page_url(1), Duration::ZERO).await?;

    let portal = PortalConfig::default();
    let timeouts = TimeoutConfig::immediate();
    let invoices = ListExtractor::new(&driver, &portal, &timeouts)
        .extract_all()
        .await?;

    assert_eq!(ids(&invoices), vec![101, 102, 103, 104]);
    assert_eq!(invoices[0].operator, "Devon Energy");
    assert_eq!(invoices[0].check_number, "CHK-101");
    assert_eq!(invoices[0].invoice_date, "01/15/2025");
    assert_eq!(invoices[3].total_amount, Some(Decimal::new(-2550, 2)));
    assert_eq!(driver.url(), grid_page_url(3));
    Ok(())
}

#[tokio::test]
async fn ignores_other_grids_and_group_rows() -> Result<()> {
    let driver = FakeDriver::new().page(
        grid_page_url(1),
        grid_page(
            &[
                GridRow::new("group-Devon", "Devon Energy", ""),
                GridRow::new("201", "Devon Energy", "$10.00"),
            ],
            1,
            1,
        ),
    );
    driver.goto(&grid_page_url(1), Duration::ZERO).await?;

    let portal = PortalConfig::default();
    let timeouts = TimeoutConfig::immediate();
    let invoices = ListExtractor::new(&driver, &portal, &timeouts)
        .extract_all()
        .await?;

    assert_eq!(ids(&invoices), vec![201]);
    assert!(!invoices.iter().any(|i| i.invoice_id == InvoiceId::new(555)));
    Ok(())
}

#[tokio::test]
async fn empty_grid_is_empty_list() -> Result<()> {
    let driver = FakeDriver::new().page(grid_page_url(1), grid_page(&[], 1, 1));
    driver.goto(&grid_page_url(1), Duration::ZERO).await?;

    let portal = PortalConfig::default();
    let timeouts = TimeoutConfig::immediate();
    let invoices = ListExtractor::new(&driver, &portal, &timeouts)
        .extract_all()
        .await?;

    assert!(invoices.is_empty());
    Ok(())
}

#[tokio::test]
async fn pagination_reads_visible_widget_only() -> Result<()> {
    let driver = FakeDriver::new().page(
        grid_page_url(2),
        grid_page(&[GridRow::new("7", "Oxy", "$1.00")], 2, 4),
    );
    driver.goto(&grid_page_url(2), Duration::ZERO).await?;

    let portal = PortalConfig::default();
    let timeouts = TimeoutConfig::immediate();
    let state = ListExtractor::new(&driver, &portal, &timeouts)
        .pagination()
        .await?;

    assert_eq!(state, Some(PaginationState { current: 2, total: 4 }));
    Ok(())
}

#[tokio::test]
async fn stuck_pagination_stops_instead_of_looping() -> Result<()> {
    // The jump to page 2 is ignored: the same rows and "page 1 of 2" again.
    let driver = FakeDriver::new()
        .page(
            grid_page_url(1),
            grid_page(&[GridRow::new("301", "Oxy", "$1.00")], 1, 2),
        )
        .page(
            grid_page_url(2),
            grid_page(&[GridRow::new("301", "Oxy", "$1.00")], 1, 2),
        );
    driver.goto(&grid_page_url(1), Duration::ZERO).await?;

    let portal = PortalConfig::default();
    let timeouts = TimeoutConfig::immediate();
    let invoices = ListExtractor::new(&driver, &portal, &timeouts)
        .extract_all()
        .await?;

    assert_eq!(ids(&invoices), vec![301]);
    assert_eq!(driver.filled(), vec!["2".to_string()]);
    Ok(())
}
