use crate::config::Settings;
use crate::domain::model::{ApiResponse, CopyRequest, DeployLog, DumpInfo, DumpRequest, PostOutcome};
use crate::domain::ports::{DeployServer, DumpService};
use crate::utils::error::{CapatrossError, Result};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// JSON client for the albatross deploy tracking server.
#[derive(Debug, Clone)]
pub struct AlbatrossClient {
    client: Client,
    base_uri: String,
    deploy_path: String,
    data_key: String,
}

impl AlbatrossClient {
    pub fn new(
        base_uri: impl Into<String>,
        deploy_path: impl Into<String>,
        data_key: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("capatross/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_uri: base_uri.into().trim_end_matches('/').to_string(),
            deploy_path: deploy_path.into(),
            data_key: data_key.into(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            settings.albatross_uri.clone(),
            settings.albatross_deploy_path.clone(),
            settings.capatross_key(),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_uri, path)
    }

    /// POSTs `body` and returns the status with the raw response text.
    ///
    /// Error statuses are not errors here; albatross explains failures in
    /// the JSON body.
    async fn post_json<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<(u16, String)> {
        tracing::debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .header(ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        tracing::debug!("albatross response status: {}", status);
        let text = response.text().await?;
        Ok((status.as_u16(), text))
    }

    async fn post_for<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let (status, text) = self.post_json(&url, body).await?;
        serde_json::from_str(&text).map_err(|e| {
            tracing::debug!("unparseable albatross response body: {}", text);
            CapatrossError::remote(format!(
                "Unexpected response from {} (Code: {}): {}",
                url, status, e
            ))
        })
    }
}

#[async_trait]
impl DumpService for AlbatrossClient {
    async fn dumpinfo(&self, appname: &str, dbtype: &str) -> Result<DumpInfo> {
        let request = DumpRequest {
            appname,
            dbtype,
            data_key: &self.data_key,
        };
        self.post_for("/dumps/dumpinfo", &request).await
    }

    async fn request_dump(&self, appname: &str, dbtype: &str) -> Result<ApiResponse> {
        let request = DumpRequest {
            appname,
            dbtype,
            data_key: &self.data_key,
        };
        self.post_for("/dumps/do", &request).await
    }

    async fn request_copy(&self, appname: &str) -> Result<ApiResponse> {
        let request = CopyRequest {
            appname,
            data_key: &self.data_key,
        };
        self.post_for("/dumps/copy", &request).await
    }
}

#[async_trait]
impl DeployServer for AlbatrossClient {
    fn deploy_url(&self) -> String {
        self.url(&self.deploy_path)
    }

    async fn post_deploy_log(&self, log: &DeployLog) -> Result<PostOutcome> {
        let mut payload = log.clone();
        payload.mark_from_cli();

        let (status, text) = self.post_json(&self.deploy_url(), &payload).await?;
        let success = serde_json::from_str::<serde_json::Value>(&text)
            .map(|body| crate::domain::model::truthy(body.get("success")))
            .unwrap_or(false);

        Ok(PostOutcome { status, success })
    }
}
