//! Reads the "Sales" sheet, copies it to "Forecast" and writes both back.
//!
//! Settings come from `sharepoint-excel.toml` (or the file named by
//! `SHAREPOINT_EXCEL_CONFIG`). Without a config file, credentials are taken
//! from `SHAREPOINT_TENANT_ID`, `SHAREPOINT_CLIENT_ID` and
//! `SHAREPOINT_CLIENT_SECRET` and the placeholder location below is used.
//!
//! ```text
//! RUST_LOG=sharepoint_excel=debug cargo run --example demo_usage
//! ```

use anyhow::{Context, Result};
use sharepoint_excel::{Config, Credentials, ExcelSync, FileLocation};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse().context("failed to parse log directive")?),
        )
        .init();

    let (sync, credentials, location) = match Config::resolve()? {
        Some(config) => (
            ExcelSync::from_config(&config),
            config.credentials()?,
            config.location()?,
        ),
        None => (
            ExcelSync::new(),
            Credentials::from_env().context(
                "no config file found and SHAREPOINT_TENANT_ID/SHAREPOINT_CLIENT_ID/SHAREPOINT_CLIENT_SECRET not set",
            )?,
            FileLocation::new(
                "yourcompany.sharepoint.com",
                "YourSiteName",
                "Shared Documents/Reports/your_excel.xlsx",
            ),
        ),
    };
    let sync = sync.with_debug(std::env::var_os("SHAREPOINT_EXCEL_DEBUG").is_some());

    let sales = sync
        .read_sheet(&credentials, &location, "Sales")
        .await
        .context("failed to read the Sales sheet")?;
    info!(
        rows = sales.row_count(),
        columns = ?sales.columns(),
        "read Sales"
    );

    let forecast = sales.clone();
    sync.write_sheets(
        &credentials,
        &location,
        [("Sales", sales), ("Forecast", forecast)],
    )
    .await
    .context("failed to upload the updated workbook")?;

    info!(path = %location.path, "Sales and Forecast written");
    Ok(())
}
