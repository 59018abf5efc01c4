//! Shared request plumbing.

use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::ClientError;

/// One upstream base URL plus a configured HTTP client.
#[derive(Debug, Clone)]
pub(crate) struct Upstream {
    base: Url,
    client: Client,
}

impl Upstream {
    pub(crate) fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ClientError> {
        let base = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { base, client })
    }

    /// Appends percent-encoded path segments to the base URL.
    pub(crate) fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GETs JSON. A 404 is `Ok(None)`.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, ClientError> {
        let response = self.client.get(url).query(query).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(Self::status_error(status, response).await),
        }
    }

    /// POSTs a JSON body, expecting any 2xx.
    pub(crate) async fn post_json<B: Serialize + Sync>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<(), ClientError> {
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::status_error(status, response).await)
        }
    }

    async fn status_error(status: StatusCode, response: reqwest::Response) -> ClientError {
        ClientError::Status {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_encodes_segments_and_keeps_base_path() {
        let upstream = Upstream::new("http://manage.local/base/", 5).unwrap();
        let url = upstream.url(&["tenants", "t 1", "groups", "a/b"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://manage.local/base/tenants/t%201/groups/a%2Fb"
        );
    }

    #[test]
    fn test_rejects_non_base_url() {
        assert!(matches!(
            Upstream::new("mailto:ops@example.com", 5),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
