//! Read and write Excel workbooks stored in SharePoint document libraries.
//!
//! Two operations are exposed:
//! - [`read_sheet`] downloads a workbook and returns one sheet as a [`Table`]
//! - [`write_sheets`] upserts named sheets into a workbook and uploads it back,
//!   leaving every other sheet untouched
//!
//! Both authenticate with the OAuth2 client-credentials grant and talk to
//! Microsoft Graph. [`ExcelSync`] carries the optional settings (endpoints,
//! timeout, diagnostic logging, token cache); the free functions use the
//! defaults.
//!
//! ```no_run
//! use sharepoint_excel::{Credentials, FileLocation, read_sheet, write_sheets};
//!
//! # async fn run() -> sharepoint_excel::Result<()> {
//! let credentials = Credentials::new("tenant-id", "client-id", "client-secret");
//! let location = FileLocation::new(
//!     "contoso.sharepoint.com",
//!     "Finance",
//!     "Shared Documents/Reports/book.xlsx",
//! );
//!
//! let sales = read_sheet(&credentials, &location, "Sales", false).await?;
//! write_sheets(&credentials, &location, [("Forecast", sales)]).await?;
//! # Ok(())
//! # }
//! ```

mod auth;
pub mod codec;
mod config;
mod error;
mod graph;
mod pipeline;
mod table;
mod workbook;

pub use auth::{AccessToken, TokenAcquirer, TokenCache};
pub use config::{
    CLIENT_ID_ENV, CLIENT_SECRET_ENV, CONFIG_ENV, Config, Credentials, DEFAULT_AUTHORITY,
    DEFAULT_GRAPH_ENDPOINT, DEFAULT_SCOPE, Endpoints, FileLocation, TENANT_ID_ENV,
};
pub use error::{Error, Result};
pub use graph::GraphClient;
pub use pipeline::{ExcelSync, read_sheet, write_sheets};
pub use table::{CellValue, Row, Table};
pub use workbook::Workbook;
