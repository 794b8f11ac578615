//! The read and write pipelines.
//!
//! Read: authenticate → resolve site → (diagnostics) → download by path →
//! decode one sheet.
//!
//! Write: authenticate → resolve site → resolve drive item → download by id →
//! decode all sheets → merge → encode → upload.
//!
//! Every step is awaited before the next one starts and the first failure
//! ends the operation.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    auth::{TokenAcquirer, TokenCache},
    codec,
    config::{Config, Credentials, Endpoints, FileLocation},
    error::Result,
    graph::{self, GraphClient},
    table::Table,
    workbook::Workbook,
};

/// Settings shared by the read and write operations.
///
/// This is a plain value owned by the caller; it holds no connection or
/// session. Each operation builds its own HTTP client and acquires its own
/// token, unless a [`TokenCache`] is attached.
#[derive(Debug, Clone, Default)]
pub struct ExcelSync {
    endpoints: Endpoints,
    debug: bool,
    timeout: Option<Duration>,
    token_cache: Option<TokenCache>,
}

impl ExcelSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes endpoints and timeout from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoints: config.endpoints.clone(),
            timeout: config.timeout(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Enables diagnostic logging on the read path: folder listings and the
    /// download URL are logged before the file is fetched.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_token_cache(mut self, cache: TokenCache) -> Self {
        self.token_cache = Some(cache);
        self
    }

    async fn connect(&self, credentials: &Credentials) -> Result<GraphClient> {
        credentials.validate()?;
        let endpoints = self.endpoints.normalized()?;

        let mut builder = Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        let acquirer = TokenAcquirer::new(http.clone(), endpoints.clone());
        let token = match &self.token_cache {
            Some(cache) => acquirer.acquire_cached(credentials, cache).await?,
            None => acquirer.acquire(credentials).await?,
        };
        if self.debug {
            info!(
                token_len = token.secret().len(),
                expires_in = ?token.expires_in(),
                "access token acquired"
            );
        }
        Ok(GraphClient::new(http, endpoints.graph, token))
    }

    /// Downloads the workbook at `location` and returns the sheet named
    /// `sheet_name`.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step: [`Error::Auth`],
    /// [`Error::Lookup`], [`Error::Fetch`], [`Error::Decode`], or
    /// [`Error::SheetNotFound`]. Invalid inputs yield [`Error::Config`].
    ///
    /// [`Error::Auth`]: crate::Error::Auth
    /// [`Error::Lookup`]: crate::Error::Lookup
    /// [`Error::Fetch`]: crate::Error::Fetch
    /// [`Error::Decode`]: crate::Error::Decode
    /// [`Error::SheetNotFound`]: crate::Error::SheetNotFound
    /// [`Error::Config`]: crate::Error::Config
    pub async fn read_sheet(
        &self,
        credentials: &Credentials,
        location: &FileLocation,
        sheet_name: &str,
    ) -> Result<Table> {
        location.validate()?;
        let graph = self.connect(credentials).await?;
        let site_id = graph.resolve_site(&location.domain, &location.site).await?;
        if self.debug {
            info!(site = %location.site, %site_id, "resolved site");
            log_diagnostics(&graph, &site_id, &location.path).await;
            info!(
                url = %graph.content_url_for_path(&site_id, &location.path),
                "file download URL"
            );
        }

        let bytes = graph.download_by_path(&site_id, &location.path).await?;
        let table = codec::decode_sheet(&bytes, sheet_name)?;
        info!(
            sheet = sheet_name,
            rows = table.row_count(),
            "workbook loaded"
        );
        Ok(table)
    }

    /// Merges `sheets` into the workbook at `location` and uploads the result.
    ///
    /// Sheets named in `sheets` replace existing ones or are appended; every
    /// other sheet of the existing workbook is written back unchanged.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step: [`Error::Auth`],
    /// [`Error::Lookup`], [`Error::Fetch`], [`Error::Decode`],
    /// [`Error::Encode`], or [`Error::Upload`]. Invalid inputs yield
    /// [`Error::Config`].
    ///
    /// [`Error::Auth`]: crate::Error::Auth
    /// [`Error::Lookup`]: crate::Error::Lookup
    /// [`Error::Fetch`]: crate::Error::Fetch
    /// [`Error::Decode`]: crate::Error::Decode
    /// [`Error::Encode`]: crate::Error::Encode
    /// [`Error::Upload`]: crate::Error::Upload
    /// [`Error::Config`]: crate::Error::Config
    pub async fn write_sheets<I, S>(
        &self,
        credentials: &Credentials,
        location: &FileLocation,
        sheets: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = (S, Table)>,
        S: Into<String>,
    {
        location.validate()?;
        let updates: Workbook = sheets.into_iter().collect();

        let graph = self.connect(credentials).await?;
        let site_id = graph.resolve_site(&location.domain, &location.site).await?;
        let item_id = graph.resolve_item_id(&site_id, &location.path).await?;
        let existing = graph.download_by_id(&site_id, &item_id).await?;

        let mut workbook = codec::decode_workbook(&existing)?;
        let updated = updates.len();
        workbook.merge(updates);
        let bytes = codec::encode_workbook(&workbook)?;

        graph.upload_content(&site_id, &item_id, bytes).await?;
        info!(
            path = %location.path,
            updated,
            sheets = workbook.len(),
            "file uploaded successfully"
        );
        Ok(())
    }
}

/// Logs the drive root listing and, when the file sits in a folder, that
/// folder's listing. Failures only produce warnings.
async fn log_diagnostics(graph: &GraphClient, site_id: &str, file_path: &str) {
    match graph.list_children(site_id, None).await {
        Ok(listing) => info!("root folder contents:\n{}", pretty(&listing)),
        Err(err) => warn!(error = %err, "failed to list root folder"),
    }

    if let Some(folder) = graph::parent_folder(file_path) {
        match graph.list_children(site_id, Some(folder)).await {
            Ok(listing) => info!("contents of folder '{folder}':\n{}", pretty(&listing)),
            Err(err) => warn!(error = %err, folder, "failed to list folder"),
        }
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Reads one sheet of a SharePoint-hosted workbook with default endpoints.
///
/// `debug` turns on the diagnostic folder listings of
/// [`ExcelSync::with_debug`].
///
/// # Errors
///
/// See [`ExcelSync::read_sheet`].
pub async fn read_sheet(
    credentials: &Credentials,
    location: &FileLocation,
    sheet_name: &str,
    debug: bool,
) -> Result<Table> {
    ExcelSync::new()
        .with_debug(debug)
        .read_sheet(credentials, location, sheet_name)
        .await
}

/// Upserts sheets into a SharePoint-hosted workbook with default endpoints.
///
/// # Errors
///
/// See [`ExcelSync::write_sheets`].
pub async fn write_sheets<I, S>(
    credentials: &Credentials,
    location: &FileLocation,
    sheets: I,
) -> Result<()>
where
    I: IntoIterator<Item = (S, Table)>,
    S: Into<String>,
{
    ExcelSync::new()
        .write_sheets(credentials, location, sheets)
        .await
}
