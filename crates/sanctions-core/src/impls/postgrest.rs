//! PostgrestStore - PostgREST 形式の HTTPS リモートストア
//!
//! # 学習ポイント
//! - `reqwest::Client` にタイムアウトと認証ヘッダーを既定で持たせる
//! - reqwest のエラーを「タイムアウト」「通信失敗」「応答不正」に振り分ける
//! - non-2xx はステータスと本文を残して `Rejected` にする

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::RemoteConfig;
use crate::domain::{ClaimCheckResult, NewSanction, RemoteError, SanctionId, WorkItem};
use crate::ports::RemoteStore;

/// エラー本文はログに残すので長さを抑える
const MAX_ERROR_BODY: usize = 200;

/// PostgrestStore は `{base_url}/rest/v1/{table}` に対する REST クライアント
///
/// # 使用例
/// ```ignore
/// let store = PostgrestStore::from_config(&config.remote)?;
/// let pending = store.fetch_pending().await?;
/// ```
#[derive(Clone)]
pub struct PostgrestStore {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl std::fmt::Debug for PostgrestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestStore")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl PostgrestStore {
    pub fn new(
        base_url: &str,
        api_key: &str,
        table: &str,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key)
            .map_err(|_| RemoteError::InvalidRequest("api key is not a valid header".into()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| RemoteError::InvalidRequest("api key is not a valid header".into()))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::InvalidRequest(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/rest/v1/{}", base_url.trim_end_matches('/'), table),
            timeout,
        })
    }

    pub fn from_config(config: &RemoteConfig) -> Result<Self, RemoteError> {
        Self::new(
            &config.base_url,
            &config.api_key,
            &config.table,
            config.request_timeout(),
        )
    }

    fn map_send_error(&self, err: reqwest::Error) -> RemoteError {
        if err.is_timeout() {
            RemoteError::Timeout(self.timeout)
        } else if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Transport(err.to_string())
        }
    }

    /// 期待したステータス以外なら本文つきで `Rejected`
    async fn expect_status(
        &self,
        response: Response,
        accepted: &[StatusCode],
    ) -> Result<Response, RemoteError> {
        let status = response.status();
        if accepted.contains(&status) {
            return Ok(response);
        }
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let cut = body
                .char_indices()
                .map(|(i, _)| i)
                .take_while(|i| *i <= MAX_ERROR_BODY)
                .last()
                .unwrap_or(0);
            body.truncate(cut);
        }
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    async fn get_items(&self, query: &[(&str, String)]) -> Result<Vec<WorkItem>, RemoteError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(query)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = self.expect_status(response, &[StatusCode::OK]).await?;
        response
            .json::<Vec<WorkItem>>()
            .await
            .map_err(|e| self.map_send_error(e))
    }
}

#[async_trait]
impl RemoteStore for PostgrestStore {
    async fn read_claim_status(
        &self,
        ids: &[SanctionId],
    ) -> Result<HashMap<SanctionId, ClaimCheckResult>, RemoteError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let list = ids.iter().map(SanctionId::as_str).collect::<Vec<_>>().join(",");
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("select", "id,comentarios_rrhh,updated_at".to_string()),
                ("id", format!("in.({list})")),
            ])
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = self.expect_status(response, &[StatusCode::OK]).await?;
        let rows = response
            .json::<Vec<ClaimCheckResult>>()
            .await
            .map_err(|e| self.map_send_error(e))?;
        debug!(requested = ids.len(), returned = rows.len(), "claim status read");
        Ok(rows.into_iter().map(|r| (r.id.clone(), r)).collect())
    }

    async fn patch_comment(&self, id: &SanctionId, text: &str) -> Result<(), RemoteError> {
        let response = self
            .client
            .patch(&self.endpoint)
            .query(&[("id", format!("eq.{id}"))])
            .json(&json!({ "comentarios_rrhh": text }))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.expect_status(response, &[StatusCode::OK, StatusCode::NO_CONTENT])
            .await?;
        Ok(())
    }

    async fn fetch_pending(&self) -> Result<Vec<WorkItem>, RemoteError> {
        self.get_items(&[
            ("select", "*".into()),
            ("status", "eq.aprobado".into()),
            ("comentarios_rrhh", "is.null".into()),
            ("order", "fecha.asc".into()),
        ])
        .await
    }

    async fn fetch_processed(&self, limit: usize) -> Result<Vec<WorkItem>, RemoteError> {
        self.get_items(&[
            ("select", "*".into()),
            ("comentarios_rrhh", "not.is.null".into()),
            ("order", "updated_at.desc".into()),
            ("limit", limit.to_string()),
        ])
        .await
    }

    async fn insert_item(&self, item: &NewSanction) -> Result<(), RemoteError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(item)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.expect_status(response, &[StatusCode::OK, StatusCode::CREATED])
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("select", "count"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.expect_status(response, &[StatusCode::OK])
            .await
            .inspect_err(|e| warn!(error = %e, "remote store ping failed"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TABLE_PATH: &str = "/rest/v1/sanciones";

    fn store(server: &MockServer, timeout: Duration) -> PostgrestStore {
        PostgrestStore::new(&server.uri(), "secret-key", "sanciones", timeout).unwrap()
    }

    #[tokio::test]
    async fn read_claim_status_sends_projection_and_in_filter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TABLE_PATH))
            .and(query_param("select", "id,comentarios_rrhh,updated_at"))
            .and(query_param("id", "in.(a,b)"))
            .and(header("apikey", "secret-key"))
            .and(header("authorization", "Bearer secret-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "a", "comentarios_rrhh": null, "updated_at": "2024-03-01T10:00:00"},
                {"id": "b", "comentarios_rrhh": "Procesado para nómina - 2024-03-01 10:00 - jose"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let result = store(&server, Duration::from_secs(2))
            .read_claim_status(&[SanctionId::new("a"), SanctionId::new("b")])
            .await
            .unwrap();

        assert!(!result[&SanctionId::new("a")].is_claimed());
        assert!(result[&SanctionId::new("b")].is_claimed());
    }

    #[tokio::test]
    async fn read_claim_status_with_no_ids_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = store(&server, Duration::from_secs(2))
            .read_claim_status(&[])
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn patch_comment_filters_on_id() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(TABLE_PATH))
            .and(query_param("id", "eq.s-1"))
            .and(body_json(json!({"comentarios_rrhh": "hecho"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        store(&server, Duration::from_secs(2))
            .patch_comment(&SanctionId::new("s-1"), "hecho")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(409).set_body_string("conflict"))
            .mount(&server)
            .await;

        let err = store(&server, Duration::from_secs(2))
            .patch_comment(&SanctionId::new("s-1"), "hecho")
            .await
            .unwrap_err();
        match err {
            RemoteError::Rejected { status, body } => {
                assert_eq!(status, 409);
                assert_eq!(body, "conflict");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_response_is_timeout_not_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_millis(800)))
            .mount(&server)
            .await;

        let err = store(&server, Duration::from_millis(100))
            .patch_comment(&SanctionId::new("s-1"), "hecho")
            .await
            .unwrap_err();
        assert!(err.is_timeout(), "got {err:?}");
    }

    #[tokio::test]
    async fn fetch_pending_uses_approved_unclaimed_filter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TABLE_PATH))
            .and(query_param("status", "eq.aprobado"))
            .and(query_param("comentarios_rrhh", "is.null"))
            .and(query_param("order", "fecha.asc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "s-1", "tipo_sancion": "FALTA", "empleado_cod": 7, "extra": 1}
            ])))
            .mount(&server)
            .await;

        let items = store(&server, Duration::from_secs(2))
            .fetch_pending()
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].employee_code, Some(7));
    }

    #[tokio::test]
    async fn fetch_processed_passes_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("comentarios_rrhh", "not.is.null"))
            .and(query_param("order", "updated_at.desc"))
            .and(query_param("limit", "25"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let items = store(&server, Duration::from_secs(2))
            .fetch_processed(25)
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = store(&server, Duration::from_secs(2))
            .fetch_pending()
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Decode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn insert_accepts_created() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TABLE_PATH))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let record = NewSanction::test_record(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            "2024-03-01 09:00:00",
        );
        store(&server, Duration::from_secs(2))
            .insert_item(&record)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn ping_reports_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("select", "count"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = store(&server, Duration::from_secs(2)).ping().await.unwrap_err();
        assert!(matches!(err, RemoteError::Rejected { status: 401, .. }));
    }

    #[test]
    fn header_unsafe_key_is_rejected_up_front() {
        let err = PostgrestStore::new("http://localhost", "bad\nkey", "t", Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, RemoteError::InvalidRequest(_)));
    }
}
