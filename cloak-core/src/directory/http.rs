use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{KeyDirectory, PublishReceipt};
use crate::error::DirectoryError;

pub const DEFAULT_DIRECTORY_URL: &str = "http://localhost:5000";

/// Usernames per batch request
const BATCH_LIMIT: usize = 50;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct KeyResponse {
    public_key: String,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    usernames: &'a [String],
}

#[derive(Deserialize)]
struct BatchResponse {
    #[serde(default)]
    keys: HashMap<String, Option<String>>,
}

#[derive(Serialize)]
struct PublishRequest<'a> {
    public_key: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    code: Option<String>,
}

/// REST client for the public-key directory service
pub struct HttpDirectory {
    base_url: Url,
    auth_token: Option<String>,
    client: Client,
}

impl HttpDirectory {
    pub fn new(base_url: &str, auth_token: Option<String>) -> Result<Self, DirectoryError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| DirectoryError::Http(format!("invalid directory URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(DirectoryError::Http(format!(
                "invalid directory URL: {}",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DirectoryError::Http(e.to_string()))?;

        Ok(Self {
            base_url,
            auth_token,
            client,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in new()
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn failure(response: reqwest::Response, username: Option<&str>) -> DirectoryError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed: Option<ErrorBody> = serde_json::from_str(&body).ok();

        match status {
            StatusCode::UNAUTHORIZED => DirectoryError::Unauthorized,
            StatusCode::NOT_FOUND => {
                let name = username.unwrap_or_default().to_string();
                match parsed.and_then(|b| b.code) {
                    Some(code) if code == "NO_PUBLIC_KEY" => DirectoryError::NoPublicKey(name),
                    _ => DirectoryError::UserNotFound(name),
                }
            }
            StatusCode::BAD_REQUEST => DirectoryError::Rejected(
                parsed
                    .map(|b| b.error)
                    .filter(|e| !e.is_empty())
                    .unwrap_or(body),
            ),
            _ => DirectoryError::BadResponse {
                status: status.as_u16(),
                body,
            },
        }
    }
}

fn transport_error(e: reqwest::Error) -> DirectoryError {
    DirectoryError::Http(e.to_string())
}

fn decode_error(status: StatusCode, e: reqwest::Error) -> DirectoryError {
    DirectoryError::BadResponse {
        status: status.as_u16(),
        body: e.to_string(),
    }
}

#[async_trait]
impl KeyDirectory for HttpDirectory {
    async fn fetch_key(&self, username: &str) -> Result<String, DirectoryError> {
        let url = self.endpoint(&["api", "keys", "user", username]);
        debug!(username = %username, "Fetching public key");

        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::failure(response, Some(username)).await);
        }

        let body: KeyResponse = response
            .json()
            .await
            .map_err(|e| decode_error(status, e))?;
        Ok(body.public_key)
    }

    async fn fetch_keys(
        &self,
        usernames: &[String],
    ) -> Result<HashMap<String, Option<String>>, DirectoryError> {
        let mut keys = HashMap::with_capacity(usernames.len());

        for chunk in usernames.chunks(BATCH_LIMIT) {
            let url = self.endpoint(&["api", "keys", "users"]);
            let response = self
                .authorize(self.client.post(url))
                .json(&BatchRequest { usernames: chunk })
                .send()
                .await
                .map_err(transport_error)?;

            let status = response.status();
            if !status.is_success() {
                return Err(Self::failure(response, None).await);
            }

            let body: BatchResponse = response
                .json()
                .await
                .map_err(|e| decode_error(status, e))?;
            keys.extend(body.keys);
        }

        debug!(requested = usernames.len(), returned = keys.len(), "Fetched key batch");
        Ok(keys)
    }

    async fn publish_key(&self, public_key: &str) -> Result<PublishReceipt, DirectoryError> {
        if self.auth_token.is_none() {
            warn!("Publishing public key without an auth token");
        }

        let url = self.endpoint(&["api", "keys", "me"]);
        let response = self
            .authorize(self.client.put(url))
            .json(&PublishRequest { public_key })
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::failure(response, None).await);
        }

        response.json().await.map_err(|e| decode_error(status, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_username() {
        let directory = HttpDirectory::new("http://localhost:5000/", None).unwrap();
        assert_eq!(
            directory.endpoint(&["api", "keys", "user", "bob/../admin"]).as_str(),
            "http://localhost:5000/api/keys/user/bob%2F..%2Fadmin"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let directory = HttpDirectory::new("https://example.com/directory", None).unwrap();
        assert_eq!(
            directory.endpoint(&["api", "keys", "me"]).as_str(),
            "https://example.com/directory/api/keys/me"
        );
    }

    #[test]
    fn test_rejects_unusable_base() {
        assert!(HttpDirectory::new("not a url", None).is_err());
        assert!(HttpDirectory::new("mailto:keys@example.com", None).is_err());
    }
}
