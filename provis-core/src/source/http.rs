// HTTP implementation of the lineage, registry, and job sources.

use std::sync::Once;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::{ApiSection, ProvisConfig};
use crate::error::{ApiError, ProvisError};
use crate::types::{
    ItemRecord, JobPage, JobRecord, LineageDirection, LineageResponse, StatusEnvelope,
};

use super::traits::{JobSource, LineageSource};

const USER_AGENT: &str = concat!("provis/", env!("CARGO_PKG_VERSION"));

static CRYPTO_PROVIDER: Once = Once::new();

/// reqwest is built without a bundled TLS provider; install aws-lc-rs once
/// per process before the first client is constructed.
fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        // Err means another provider is already installed, which is fine.
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

/// Client for the provenance, registry, and job REST APIs.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    api: ApiSection,
    token: Option<String>,
}

impl HttpSource {
    /// Build a source from the `[api]` config section and the token
    /// environment variable it names.
    pub fn from_config(config: &ProvisConfig) -> crate::error::Result<Self> {
        install_crypto_provider();
        let client = Client::builder()
            .timeout(config.api.timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ApiError::Network(format!("build client: {e}")))?;
        Ok(Self {
            client,
            api: config.api.clone(),
            token: config.token(),
        })
    }

    /// Create with explicit endpoints (for testing).
    pub fn new(api: ApiSection, token: Option<String>) -> Self {
        install_crypto_provider();
        Self {
            client: Client::new(),
            api,
            token,
        }
    }

    fn lineage_url(&self, direction: LineageDirection) -> String {
        format!(
            "{}/explore/{}",
            self.api.prov_url.trim_end_matches('/'),
            direction.as_str()
        )
    }

    fn item_url(&self) -> String {
        format!(
            "{}/registry/general/fetch",
            self.api.registry_url.trim_end_matches('/')
        )
    }

    fn jobs_url(&self, admin_mode: bool, action: &str) -> String {
        let scope = if admin_mode { "admin" } else { "user" };
        format!(
            "{}/jobs/{scope}/{action}",
            self.api.jobs_url.trim_end_matches('/')
        )
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    // ── HTTP Client ─────────────────────────────────────────────────

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> crate::error::Result<T> {
        let resp = self
            .authorize(req)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ProvisError::Api(ApiError::Network(e.to_string())))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "API request failed");
            return Err(ProvisError::Api(ApiError::Http {
                status: status.as_u16(),
                body,
            }));
        }

        resp.json()
            .await
            .map_err(|e| ProvisError::Api(ApiError::Parse(e.to_string())))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> crate::error::Result<T> {
        debug!(url, "GET");
        self.send(self.client.get(url).query(query)).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> crate::error::Result<T> {
        debug!(url, "POST");
        self.send(self.client.post(url).json(body)).await
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ItemFetchResponse {
    status: StatusEnvelope,
    item: Option<ItemRecord>,
}

#[derive(Deserialize)]
struct JobFetchResponse {
    status: StatusEnvelope,
    job: Option<JobRecord>,
}

#[derive(Deserialize)]
struct JobListResponse {
    status: StatusEnvelope,
    #[serde(default)]
    jobs: Vec<JobRecord>,
    #[serde(default)]
    pagination_key: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    batch_id: &'a str,
    limit: u32,
}

#[derive(Serialize)]
struct ListRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pagination_key: Option<&'a serde_json::Value>,
    limit: u32,
}

fn required<T>(value: Option<T>, what: &str) -> crate::error::Result<T> {
    value.ok_or_else(|| {
        ProvisError::Api(ApiError::Parse(format!(
            "successful response carried no {what}"
        )))
    })
}

#[async_trait::async_trait]
impl LineageSource for HttpSource {
    #[instrument(skip(self), name = "fetch_lineage")]
    async fn fetch_lineage(
        &self,
        id: &str,
        direction: LineageDirection,
        depth: u32,
    ) -> crate::error::Result<LineageResponse> {
        self.get_json(
            &self.lineage_url(direction),
            &[("starting_id", id.to_string()), ("depth", depth.to_string())],
        )
        .await
    }

    #[instrument(skip(self), name = "fetch_item_details")]
    async fn fetch_item_details(&self, id: &str) -> crate::error::Result<ItemRecord> {
        let resp: ItemFetchResponse = self
            .get_json(&self.item_url(), &[("id", id.to_string())])
            .await?;
        resp.status.check()?;
        required(resp.item, "item")
    }
}

#[async_trait::async_trait]
impl JobSource for HttpSource {
    #[instrument(skip(self), name = "fetch_job_status")]
    async fn fetch_job_status(
        &self,
        session_id: &str,
        admin_mode: bool,
    ) -> crate::error::Result<JobRecord> {
        let resp: JobFetchResponse = self
            .get_json(
                &self.jobs_url(admin_mode, "fetch"),
                &[("session_id", session_id.to_string())],
            )
            .await?;
        resp.status.check()?;
        required(resp.job, "job")
    }

    #[instrument(skip(self), name = "fetch_jobs_by_batch")]
    async fn fetch_jobs_by_batch(
        &self,
        batch_id: &str,
        limit: u32,
        admin_mode: bool,
    ) -> crate::error::Result<Vec<JobRecord>> {
        let resp: JobListResponse = self
            .post_json(
                &self.jobs_url(admin_mode, "list_batch"),
                &BatchRequest { batch_id, limit },
            )
            .await?;
        resp.status.check()?;
        Ok(resp.jobs)
    }

    #[instrument(skip(self, pagination_key), name = "list_jobs")]
    async fn list_jobs(
        &self,
        pagination_key: Option<&serde_json::Value>,
        limit: u32,
        admin_mode: bool,
    ) -> crate::error::Result<JobPage> {
        let resp: JobListResponse = self
            .post_json(
                &self.jobs_url(admin_mode, "list"),
                &ListRequest {
                    pagination_key,
                    limit,
                },
            )
            .await?;
        resp.status.check()?;
        Ok(JobPage {
            jobs: resp.jobs,
            pagination_key: resp.pagination_key.filter(|k| !k.is_null()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> HttpSource {
        HttpSource::new(
            ApiSection {
                prov_url: "https://prov.example.org/".into(),
                registry_url: "https://registry.example.org".into(),
                jobs_url: "https://jobs.example.org".into(),
                ..ApiSection::default()
            },
            None,
        )
    }

    #[test]
    fn lineage_urls_per_direction() {
        let s = source();
        assert_eq!(
            s.lineage_url(LineageDirection::Upstream),
            "https://prov.example.org/explore/upstream"
        );
        assert_eq!(
            s.lineage_url(LineageDirection::Downstream),
            "https://prov.example.org/explore/downstream"
        );
    }

    #[test]
    fn admin_mode_switches_job_path() {
        let s = source();
        assert_eq!(
            s.jobs_url(false, "fetch"),
            "https://jobs.example.org/jobs/user/fetch"
        );
        assert_eq!(
            s.jobs_url(true, "list_batch"),
            "https://jobs.example.org/jobs/admin/list_batch"
        );
        assert_eq!(
            s.item_url(),
            "https://registry.example.org/registry/general/fetch"
        );
    }

    #[test]
    fn list_request_omits_missing_cursor() {
        let body = serde_json::to_value(ListRequest {
            pagination_key: None,
            limit: 20,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "limit": 20 }));
    }

    #[test]
    fn job_list_response_tolerates_missing_fields() {
        let resp: JobListResponse =
            serde_json::from_str(r#"{"status":{"success":true,"details":""}}"#).unwrap();
        assert!(resp.jobs.is_empty());
        assert!(resp.pagination_key.is_none());
    }

    #[test]
    fn missing_payload_is_a_parse_error() {
        let err = required::<JobRecord>(None, "job").unwrap_err();
        assert!(matches!(err, ProvisError::Api(ApiError::Parse(_))));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        let s = HttpSource::new(
            ApiSection {
                jobs_url: "http://127.0.0.1:9".into(),
                ..ApiSection::default()
            },
            None,
        );
        let err = s.fetch_job_status("s1", false).await.unwrap_err();
        assert!(matches!(err, ProvisError::Api(ApiError::Network(_))));
    }
}
