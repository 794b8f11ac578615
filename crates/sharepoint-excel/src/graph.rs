//! Microsoft Graph calls used by the pipelines: site lookup, drive item
//! resolution, content download and replace, and folder listings.

use reqwest::{Client, RequestBuilder, Response, header};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    auth::AccessToken,
    codec::XLSX_CONTENT_TYPE,
    error::{Error, Result},
};

/// Any Graph resource we only need the id of (sites, drive items).
#[derive(Debug, Deserialize)]
struct GraphResource {
    id: Option<String>,
}

/// Authenticated Graph client for one operation.
///
/// Holds the bearer token for the duration of a single read or write; a new
/// client is built per operation.
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: Client,
    base_url: String,
    token: AccessToken,
}

impl GraphClient {
    /// `base_url` is the Graph root including the version segment, without a
    /// trailing slash.
    pub fn new(http: Client, base_url: impl Into<String>, token: AccessToken) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        Ok(request.bearer_auth(self.token.secret()).send().await?)
    }

    /// Resolves `{domain}:/sites/{site}` to the opaque site id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lookup`] on a non-success status or a response
    /// without an `id`.
    pub async fn resolve_site(&self, domain: &str, site: &str) -> Result<String> {
        let url = self.url(&format!(
            "/sites/{}:/sites/{}",
            domain.trim(),
            urlencoding::encode(site.trim())
        ));
        let response = self
            .send(self.http.get(&url).header(header::ACCEPT, "application/json"))
            .await?;
        if !response.status().is_success() {
            return Err(Error::Lookup(describe_failure(response).await));
        }

        let resource: GraphResource = response
            .json()
            .await
            .map_err(|e| Error::Lookup(format!("invalid site response: {e}")))?;
        let site_id = resource
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Lookup(format!("site '{site}' response has no id")))?;
        debug!(%site_id, "resolved site");
        Ok(site_id)
    }

    /// Downloads a file's bytes by its path in the site's default drive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fetch`] on a non-success status.
    pub async fn download_by_path(&self, site_id: &str, file_path: &str) -> Result<Vec<u8>> {
        let url = self.content_url_for_path(site_id, file_path);
        debug!(%url, "downloading file");
        self.download(&url).await
    }

    /// URL of a file's content endpoint, addressed by path.
    pub fn content_url_for_path(&self, site_id: &str, file_path: &str) -> String {
        self.url(&format!(
            "/sites/{site_id}/drive/root:/{}:/content",
            encode_drive_path(file_path)
        ))
    }

    /// Resolves a path in the site's default drive to a stable drive item id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fetch`] on a non-success status or a response without
    /// an `id`.
    pub async fn resolve_item_id(&self, site_id: &str, file_path: &str) -> Result<String> {
        let url = self.url(&format!(
            "/sites/{site_id}/drive/root:/{}",
            encode_drive_path(file_path)
        ));
        let response = self
            .send(self.http.get(&url).header(header::ACCEPT, "application/json"))
            .await?;
        if !response.status().is_success() {
            return Err(Error::Fetch(describe_failure(response).await));
        }

        let resource: GraphResource = response
            .json()
            .await
            .map_err(|e| Error::Fetch(format!("invalid drive item response: {e}")))?;
        let item_id = resource
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Fetch(format!("drive item '{file_path}' has no id")))?;
        debug!(%item_id, "resolved drive item");
        Ok(item_id)
    }

    /// Downloads a file's bytes by drive item id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fetch`] on a non-success status.
    pub async fn download_by_id(&self, site_id: &str, item_id: &str) -> Result<Vec<u8>> {
        let url = self.url(&format!("/sites/{site_id}/drive/items/{item_id}/content"));
        self.download(&url).await
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.send(self.http.get(url)).await?;
        if !response.status().is_success() {
            return Err(Error::Fetch(describe_failure(response).await));
        }
        let bytes = response.bytes().await?;
        debug!(bytes = bytes.len(), "downloaded file content");
        Ok(bytes.to_vec())
    }

    /// Replaces a drive item's content.
    ///
    /// Any 2xx status counts as success.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Upload`] with the status and response text for any
    /// other status.
    pub async fn upload_content(&self, site_id: &str, item_id: &str, bytes: Vec<u8>) -> Result<()> {
        let url = self.url(&format!("/sites/{site_id}/drive/items/{item_id}/content"));
        let size = bytes.len();
        let response = self
            .send(
                self.http
                    .put(&url)
                    .header(header::CONTENT_TYPE, XLSX_CONTENT_TYPE)
                    .body(bytes),
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            return Err(Error::Upload { status, body });
        }
        debug!(%status, bytes = size, "uploaded file content");
        Ok(())
    }

    /// Lists the children of the drive root, or of `folder` when given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fetch`] on a non-success status or a non-JSON body.
    pub async fn list_children(&self, site_id: &str, folder: Option<&str>) -> Result<Value> {
        let path = match folder {
            Some(folder) => format!(
                "/sites/{site_id}/drive/root:/{}:/children",
                encode_drive_path(folder)
            ),
            None => format!("/sites/{site_id}/drive/root/children"),
        };
        let response = self
            .send(
                self.http
                    .get(self.url(&path))
                    .header(header::ACCEPT, "application/json"),
            )
            .await?;
        if !response.status().is_success() {
            return Err(Error::Fetch(describe_failure(response).await));
        }
        response
            .json()
            .await
            .map_err(|e| Error::Fetch(format!("invalid children response: {e}")))
    }
}

async fn describe_failure(response: Response) -> String {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error body".to_string());
    format!("{status}: {body}")
}

/// Percent-encodes each segment of a drive path, keeping `/` separators and
/// dropping leading, trailing, and doubled slashes.
pub(crate) fn encode_drive_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Parent folder of a drive path, if it has one.
pub(crate) fn parent_folder(path: &str) -> Option<&str> {
    let trimmed = path.trim_matches('/');
    trimmed
        .rsplit_once('/')
        .map(|(parent, _)| parent)
        .filter(|parent| !parent.is_empty())
}

#[cfg(test)]
mod tests {
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_bytes, header, method, path},
    };

    use super::*;

    fn client_for(server: &MockServer) -> GraphClient {
        GraphClient::new(
            Client::new(),
            format!("{}/v1.0", server.uri()),
            AccessToken::new("test-token", None),
        )
    }

    #[test]
    fn test_encode_drive_path_encodes_segments() {
        assert_eq!(
            encode_drive_path("/Shared Documents/Q1 Reports/sales#1.xlsx"),
            "Shared%20Documents/Q1%20Reports/sales%231.xlsx"
        );
        assert_eq!(encode_drive_path("a//b/"), "a/b");
    }

    #[test]
    fn test_parent_folder() {
        assert_eq!(
            parent_folder("Shared Documents/Reports/x.xlsx"),
            Some("Shared Documents/Reports")
        );
        assert_eq!(parent_folder("/x.xlsx"), None);
        assert_eq!(parent_folder("x.xlsx"), None);
    }

    #[tokio::test]
    async fn test_resolve_site_success_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.0/sites/contoso.sharepoint.com:/sites/Finance"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{ "id": "contoso.sharepoint.com,abc,def", "name": "Finance" }"#,
                "application/json",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let site_id = client_for(&server)
            .resolve_site("contoso.sharepoint.com", "Finance")
            .await
            .unwrap();
        assert_eq!(site_id, "contoso.sharepoint.com,abc,def");
    }

    #[tokio::test]
    async fn test_resolve_site_404_returns_lookup_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_raw(
                r#"{ "error": { "code": "itemNotFound" } }"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .resolve_site("contoso.sharepoint.com", "Nope")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Lookup(_)));
        assert!(err.to_string().contains("404"));
        assert!(err.to_string().contains("itemNotFound"));
    }

    #[tokio::test]
    async fn test_resolve_site_missing_id_returns_lookup_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(r#"{ "name": "Finance" }"#, "application/json"),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .resolve_site("contoso.sharepoint.com", "Finance")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Lookup(_)));
        assert!(err.to_string().contains("has no id"));
    }

    #[tokio::test]
    async fn test_download_by_path_encodes_spaces() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(
                "/v1.0/sites/site-1/drive/root:/Shared%20Documents/book.xlsx:/content",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let bytes = client_for(&server)
            .download_by_path("site-1", "/Shared Documents/book.xlsx")
            .await
            .unwrap();
        assert_eq!(bytes, b"PK\x03\x04");
    }

    #[tokio::test]
    async fn test_download_by_path_403_returns_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("accessDenied"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .download_by_path("site-1", "book.xlsx")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
        assert!(err.to_string().contains("accessDenied"));
    }

    #[tokio::test]
    async fn test_resolve_item_id_and_download_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.0/sites/site-1/drive/root:/Reports/book.xlsx"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{ "id": "item-42", "name": "book.xlsx" }"#,
                "application/json",
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1.0/sites/site-1/drive/items/item-42/content"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data".to_vec()))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let item_id = client
            .resolve_item_id("site-1", "Reports/book.xlsx")
            .await
            .unwrap();
        assert_eq!(item_id, "item-42");
        let bytes = client.download_by_id("site-1", &item_id).await.unwrap();
        assert_eq!(bytes, b"data");
    }

    #[tokio::test]
    async fn test_resolve_item_id_missing_id_returns_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .resolve_item_id("site-1", "book.xlsx")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
    }

    #[tokio::test]
    async fn test_upload_content_sends_bytes_with_xlsx_type() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1.0/sites/site-1/drive/items/item-42/content"))
            .and(header("authorization", "Bearer test-token"))
            .and(header("content-type", XLSX_CONTENT_TYPE))
            .and(body_bytes(b"workbook".to_vec()))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{ "id": "item-42" }"#,
                "application/json",
            ))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .upload_content("site-1", "item-42", b"workbook".to_vec())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_upload_content_accepts_any_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        client_for(&server)
            .upload_content("site-1", "item-42", Vec::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_upload_content_503_returns_upload_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(503).set_body_string("service busy"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .upload_content("site-1", "item-42", Vec::new())
            .await
            .unwrap_err();
        match err {
            Error::Upload { status, body } => {
                assert_eq!(status.as_u16(), 503);
                assert_eq!(body, "service busy");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_list_children_root_and_folder() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.0/sites/site-1/drive/root/children"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{ "value": [ { "name": "Shared Documents" } ] }"#,
                "application/json",
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1.0/sites/site-1/drive/root:/Shared%20Documents:/children"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{ "value": [ { "name": "book.xlsx" } ] }"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let root = client.list_children("site-1", None).await.unwrap();
        assert_eq!(root["value"][0]["name"], "Shared Documents");
        let folder = client
            .list_children("site-1", Some("Shared Documents"))
            .await
            .unwrap();
        assert_eq!(folder["value"][0]["name"], "book.xlsx");
    }
}
