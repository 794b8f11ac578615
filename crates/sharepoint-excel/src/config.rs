//! Credentials, file locations, endpoints, and the optional config file.
//!
//! Nothing here is required: callers can build [`Credentials`] and
//! [`FileLocation`] directly. The config file exists for scripts that would
//! rather keep secrets out of their source.
//!
//! # Resolution
//!
//! [`Config::resolve`] looks for a config file in this order:
//!
//! 1. The path in `SHAREPOINT_EXCEL_CONFIG`
//! 2. `sharepoint-excel.toml` in the current directory
//! 3. `sharepoint-excel/config.toml` in the user config directory
//!
//! A missing file is not an error. Credentials from the environment
//! (`SHAREPOINT_TENANT_ID`, `SHAREPOINT_CLIENT_ID`,
//! `SHAREPOINT_CLIENT_SECRET`) override those in the file when all three are
//! set.
//!
//! ```toml
//! timeout_secs = 30
//!
//! [credentials]
//! tenant_id = "00000000-0000-0000-0000-000000000000"
//! client_id = "11111111-1111-1111-1111-111111111111"
//! client_secret = "..."
//!
//! [location]
//! domain = "contoso.sharepoint.com"
//! site = "Finance"
//! path = "Shared Documents/Reports/sales.xlsx"
//! ```

use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "SHAREPOINT_EXCEL_CONFIG";
pub const TENANT_ID_ENV: &str = "SHAREPOINT_TENANT_ID";
pub const CLIENT_ID_ENV: &str = "SHAREPOINT_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "SHAREPOINT_CLIENT_SECRET";

const CONFIG_FILE_NAME: &str = "sharepoint-excel.toml";

/// Default Microsoft identity platform host.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
/// Default Microsoft Graph API endpoint.
pub const DEFAULT_GRAPH_ENDPOINT: &str = "https://graph.microsoft.com/v1.0";
/// Scope requested in the client-credentials grant.
pub const DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Application credentials for the client-credentials grant.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Reads credentials from `SHAREPOINT_TENANT_ID`, `SHAREPOINT_CLIENT_ID`
    /// and `SHAREPOINT_CLIENT_SECRET`. Returns `None` unless all three are set
    /// and non-empty.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Some(Self::new(
            var(TENANT_ID_ENV)?,
            var(CLIENT_ID_ENV)?,
            var(CLIENT_SECRET_ENV)?,
        ))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("tenant_id", &self.tenant_id),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Where a workbook lives: SharePoint host, site name, and the path inside
/// the site's default document library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLocation {
    /// SharePoint host, e.g. `contoso.sharepoint.com`.
    pub domain: String,
    /// Site name as it appears in `/sites/{site}`.
    pub site: String,
    /// Path inside the document library, e.g. `Shared Documents/sales.xlsx`.
    pub path: String,
}

impl FileLocation {
    pub fn new(
        domain: impl Into<String>,
        site: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            site: site.into(),
            path: path.into(),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.domain.trim().is_empty() {
            return Err(Error::Config("domain must not be empty".to_string()));
        }
        if self.site.trim().is_empty() {
            return Err(Error::Config("site must not be empty".to_string()));
        }
        if self.path.trim_matches('/').trim().is_empty() {
            return Err(Error::Config("path must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Identity and Graph endpoints. Overridable so the pipelines can be pointed
/// at a sovereign cloud or a local mock server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Identity host; the token URL is `{authority}/{tenant}/oauth2/v2.0/token`.
    pub authority: String,
    /// Graph base URL including the version segment.
    pub graph: String,
    /// Scope requested for the token.
    pub scope: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            authority: DEFAULT_AUTHORITY.to_string(),
            graph: DEFAULT_GRAPH_ENDPOINT.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
        }
    }
}

impl Endpoints {
    /// Returns a copy with trailing slashes removed from both URLs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if any field is empty.
    pub fn normalized(&self) -> Result<Self> {
        Ok(Self {
            authority: normalize_base_url("authority", &self.authority)?,
            graph: normalize_base_url("graph", &self.graph)?,
            scope: {
                let scope = self.scope.trim();
                if scope.is_empty() {
                    return Err(Error::Config("scope must not be empty".to_string()));
                }
                scope.to_string()
            },
        })
    }
}

/// Contents of `sharepoint-excel.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub credentials: Option<Credentials>,
    pub location: Option<FileLocation>,
    #[serde(default)]
    pub endpoints: Endpoints,
    /// Per-request timeout. Unset means the HTTP client default.
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Loads and parses a config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigIo`] if the file cannot be read and
    /// [`Error::ConfigParse`] if it is not valid TOML for this struct.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with(path.as_ref(), Credentials::from_env())
    }

    fn load_with(path: &Path, env_credentials: Option<Credentials>) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| Error::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = toml::from_str(&contents)?;
        if let Some(creds) = env_credentials {
            config.credentials = Some(creds);
        }
        Ok(config)
    }

    /// Finds and loads the config file using the resolution order described
    /// in the module docs. Returns `Ok(None)` if no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a file is found but cannot be read or parsed.
    pub fn resolve() -> Result<Option<Self>> {
        if let Some(path) = std::env::var_os(CONFIG_ENV).map(PathBuf::from) {
            return Self::load(&path).map(Some);
        }

        let candidates = [
            std::env::current_dir().ok().map(|dir| dir.join(CONFIG_FILE_NAME)),
            dirs::config_dir().map(|dir| dir.join("sharepoint-excel").join("config.toml")),
        ];
        for path in candidates.into_iter().flatten() {
            if path.is_file() {
                return Self::load(&path).map(Some);
            }
        }
        Ok(None)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Credentials from the file or the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if neither source provides them.
    pub fn credentials(&self) -> Result<Credentials> {
        self.credentials
            .clone()
            .or_else(Credentials::from_env)
            .ok_or_else(|| {
                Error::Config(format!(
                    "no [credentials] section and {TENANT_ID_ENV}/{CLIENT_ID_ENV}/{CLIENT_SECRET_ENV} not set"
                ))
            })
    }

    /// The configured file location.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file has no `[location]` section.
    pub fn location(&self) -> Result<FileLocation> {
        self.location
            .clone()
            .ok_or_else(|| Error::Config("no [location] section".to_string()))
    }
}

fn normalize_base_url(field: &str, endpoint: &str) -> Result<String> {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return Err(Error::Config(format!("{field} endpoint must not be empty")));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}
