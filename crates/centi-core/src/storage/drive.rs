//! Drive-style REST implementation of the blob store.
//!
//! Speaks the provider's v3 file API: folder lookup by well-known name,
//! listing by parent, `alt=media` downloads, multipart uploads, and trash via
//! metadata patch. Base URLs are injectable so tests and self-hosted
//! deployments can point the client elsewhere.

use reqwest::StatusCode;
use serde::Deserialize;

use crate::util::{compact_text, is_http_url, normalize_text_option};

use super::{BlobStore, RemoteFile, StorageError, StorageResult};

const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/drive/v3";
const DEFAULT_UPLOAD_BASE_URL: &str = "https://www.googleapis.com/upload/drive/v3";
const DEFAULT_ROOT_FOLDER_NAME: &str = "Centi";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const MULTIPART_BOUNDARY: &str = "centi_boundary";

/// Endpoints and root folder name for [`DriveClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveConfig {
    /// Metadata/query API base, e.g. `https://www.googleapis.com/drive/v3`
    pub api_base_url: String,
    /// Upload API base, e.g. `https://www.googleapis.com/upload/drive/v3`
    pub upload_base_url: String,
    /// Name of the app's folder in the user's remote store
    pub root_folder_name: String,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            upload_base_url: DEFAULT_UPLOAD_BASE_URL.to_string(),
            root_folder_name: DEFAULT_ROOT_FOLDER_NAME.to_string(),
        }
    }
}

/// Drive REST client implementing [`BlobStore`].
#[derive(Debug, Clone)]
pub struct DriveClient {
    config: DriveConfig,
    client: reqwest::Client,
}

impl DriveClient {
    /// Create a client against the default public endpoints.
    pub fn new() -> StorageResult<Self> {
        Self::with_config(DriveConfig::default())
    }

    /// Create a client against custom endpoints.
    pub fn with_config(config: DriveConfig) -> StorageResult<Self> {
        let config = DriveConfig {
            api_base_url: normalize_base_url(config.api_base_url, "api_base_url")?,
            upload_base_url: normalize_base_url(config.upload_base_url, "upload_base_url")?,
            root_folder_name: normalize_text_option(Some(config.root_folder_name)).ok_or_else(
                || {
                    StorageError::InvalidConfiguration(
                        "root_folder_name must not be empty".to_string(),
                    )
                },
            )?,
        };

        Ok(Self {
            config,
            client: reqwest::Client::builder().build()?,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &DriveConfig {
        &self.config
    }

    async fn expect_success(response: reqwest::Response) -> StorageResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(StorageError::Api {
            status: status.as_u16(),
            message: parse_api_error(status, &body),
        })
    }

    async fn query_files(&self, token: &str, query: &str) -> StorageResult<Vec<RemoteFile>> {
        let url = format!(
            "{}/files?q={}&fields=files(id,name)",
            self.config.api_base_url,
            urlencoding::encode(query)
        );
        let response = self.client.get(&url).bearer_auth(token).send().await?;
        let listing = Self::expect_success(response)
            .await?
            .json::<DriveFileList>()
            .await?;

        Ok(listing
            .files
            .into_iter()
            .map(|file| RemoteFile {
                id: file.id,
                name: file.name,
            })
            .collect())
    }

    async fn find_file(
        &self,
        token: &str,
        root_id: &str,
        name: &str,
    ) -> StorageResult<Option<String>> {
        let query = format!(
            "name='{}' and '{}' in parents and trashed=false",
            escape_query_value(name),
            escape_query_value(root_id)
        );
        let files = self.query_files(token, &query).await?;
        Ok(files.into_iter().next().map(|file| file.id))
    }

    async fn create_file(
        &self,
        token: &str,
        root_id: &str,
        name: &str,
        payload: &[u8],
    ) -> StorageResult<()> {
        let metadata = serde_json::json!({ "name": name, "parents": [root_id] });
        let body = build_multipart(&metadata, payload);

        let url = format!(
            "{}/files?uploadType=multipart&fields=id",
            self.config.upload_base_url
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(body)
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn update_file(&self, token: &str, file_id: &str, payload: &[u8]) -> StorageResult<()> {
        let body = build_multipart(&serde_json::json!({}), payload);

        let url = format!(
            "{}/files/{file_id}?uploadType=multipart",
            self.config.upload_base_url
        );
        let response = self
            .client
            .patch(&url)
            .bearer_auth(token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(body)
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }
}

impl BlobStore for DriveClient {
    async fn ensure_root(&self, token: &str) -> StorageResult<String> {
        let query = format!(
            "name='{}' and mimeType='{FOLDER_MIME}' and trashed=false",
            escape_query_value(&self.config.root_folder_name)
        );
        if let Some(existing) = self.query_files(token, &query).await?.into_iter().next() {
            return Ok(existing.id);
        }

        tracing::debug!(
            "Creating remote root folder '{}'",
            self.config.root_folder_name
        );
        let response = self
            .client
            .post(format!("{}/files", self.config.api_base_url))
            .bearer_auth(token)
            .json(&serde_json::json!({
                "name": self.config.root_folder_name,
                "mimeType": FOLDER_MIME,
            }))
            .send()
            .await?;
        let created = Self::expect_success(response)
            .await?
            .json::<DriveFile>()
            .await?;
        Ok(created.id)
    }

    async fn list(&self, token: &str, root_id: &str) -> StorageResult<Vec<RemoteFile>> {
        let query = format!(
            "'{}' in parents and trashed=false",
            escape_query_value(root_id)
        );
        self.query_files(token, &query).await
    }

    async fn download(&self, token: &str, file_id: &str) -> StorageResult<Vec<u8>> {
        let url = format!("{}/files/{file_id}?alt=media", self.config.api_base_url);
        let response = self.client.get(&url).bearer_auth(token).send().await?;
        let bytes = Self::expect_success(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn upsert(
        &self,
        token: &str,
        root_id: &str,
        name: &str,
        payload: &[u8],
    ) -> StorageResult<()> {
        match self.find_file(token, root_id, name).await? {
            Some(file_id) => self.update_file(token, &file_id, payload).await,
            None => self.create_file(token, root_id, name, payload).await,
        }
    }

    async fn trash(&self, token: &str, file_id: &str) -> StorageResult<()> {
        let url = format!("{}/files/{file_id}", self.config.api_base_url);
        let response = self
            .client
            .patch(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "trashed": true }))
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveErrorBody {
    error: Option<DriveErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct DriveErrorDetail {
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<DriveErrorBody>(body) {
        if let Some(message) = payload.error.and_then(|detail| detail.message) {
            return message.trim().to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        compact_text(trimmed)
    }
}

fn normalize_base_url(raw: String, field: &str) -> StorageResult<String> {
    let value = normalize_text_option(Some(raw)).ok_or_else(|| {
        StorageError::InvalidConfiguration(format!("{field} must not be empty"))
    })?;
    if is_http_url(&value) {
        Ok(value.trim_end_matches('/').to_string())
    } else {
        Err(StorageError::InvalidConfiguration(format!(
            "{field} must include http:// or https://"
        )))
    }
}

/// Escape a value for inclusion inside single quotes in a query expression.
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn build_multipart(metadata: &serde_json::Value, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--").as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_config_rejects_invalid_base_urls() {
        let missing_scheme = DriveClient::with_config(DriveConfig {
            api_base_url: "www.googleapis.com/drive/v3".to_string(),
            ..DriveConfig::default()
        });
        assert!(matches!(
            missing_scheme.unwrap_err(),
            StorageError::InvalidConfiguration(_)
        ));

        let empty_folder = DriveClient::with_config(DriveConfig {
            root_folder_name: "   ".to_string(),
            ..DriveConfig::default()
        });
        assert!(empty_folder.is_err());
    }

    #[test]
    fn with_config_trims_trailing_slashes() {
        let client = DriveClient::with_config(DriveConfig {
            api_base_url: "https://drive.example.com/v3/".to_string(),
            upload_base_url: "https://upload.example.com/v3/".to_string(),
            root_folder_name: "Centi".to_string(),
        })
        .unwrap();

        assert_eq!(client.config().api_base_url, "https://drive.example.com/v3");
        assert_eq!(
            client.config().upload_base_url,
            "https://upload.example.com/v3"
        );
    }

    #[test]
    fn escape_query_value_handles_quotes() {
        assert_eq!(escape_query_value("plain"), "plain");
        assert_eq!(escape_query_value("it's"), "it\\'s");
    }

    #[test]
    fn build_multipart_wraps_metadata_and_content() {
        let metadata = serde_json::json!({ "name": "2024-03.json" });
        let body = build_multipart(&metadata, b"[]");
        let rendered = String::from_utf8(body).unwrap();

        assert!(rendered.starts_with("--centi_boundary\r\n"));
        assert!(rendered.contains("\"name\":\"2024-03.json\""));
        assert!(rendered.contains("Content-Type: application/json\r\n\r\n[]"));
        assert!(rendered.ends_with("--centi_boundary--"));
    }

    #[test]
    fn parse_api_error_prefers_structured_message() {
        let body = r#"{"error": {"message": "Invalid Credentials", "code": 401}}"#;
        let message = parse_api_error(StatusCode::UNAUTHORIZED, body);
        assert_eq!(message, "Invalid Credentials");
    }

    #[test]
    fn parse_api_error_falls_back_to_body_text() {
        let message = parse_api_error(StatusCode::BAD_GATEWAY, "");
        assert_eq!(message, "HTTP 502");

        let message = parse_api_error(StatusCode::BAD_GATEWAY, "upstream exploded");
        assert_eq!(message, "upstream exploded");
    }
}
