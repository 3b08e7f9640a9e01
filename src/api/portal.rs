use crate::config::Endpoints;
use crate::error::{PortalError, PortalResult};
use crate::models::{
    DbEnvelope, DisabledResponse, QuestionsResponse, RawGroup, RawLaunch, RawQuestionnaire,
    RawTeacher, VerifyResponse,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Result of asking for a questionnaire's questions.
#[derive(Debug, Clone)]
pub enum QuestionsFetch {
    Loaded(QuestionsResponse),
    /// Evaluations are globally switched off (403 + `evaluacionesHabilitadas: false`).
    Disabled { message: Option<String> },
}

/// What a submit endpoint answered, for the caller to interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitStatus {
    pub status: u16,
    pub body: String,
}

#[derive(Clone)]
pub struct PortalClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    endpoints: Endpoints,
}

impl PortalClient {
    pub fn new(base_url: &str, token: String, endpoints: Endpoints) -> PortalResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            endpoints,
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn build_headers(&self) -> PortalResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| PortalError::Configuration("token is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("portal-eval"));
        Ok(headers)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_text(&self, path: &str) -> PortalResult<(StatusCode, String)> {
        let url = self.url(path);
        tracing::debug!(method = "GET", %url, "sending portal request");
        let response = self
            .client
            .get(&url)
            .headers(self.build_headers()?)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> PortalResult<T> {
        let (status, body) = self.get_text(path).await?;
        if !status.is_success() {
            return Err(PortalError::Status {
                url: self.url(path),
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn list_questionnaires(&self) -> PortalResult<Vec<RawQuestionnaire>> {
        let envelope: DbEnvelope<RawQuestionnaire> =
            self.get(&self.endpoints.questionnaires).await?;
        Ok(envelope.db)
    }

    pub async fn list_launches(&self) -> PortalResult<Vec<RawLaunch>> {
        let envelope: DbEnvelope<RawLaunch> = self.get(&self.endpoints.launches).await?;
        Ok(envelope.db)
    }

    pub async fn fetch_questions(&self, questionnaire_id: &str) -> PortalResult<QuestionsFetch> {
        let path = format!("{}/{}", self.endpoints.questions, questionnaire_id);
        let (status, body) = self.get_text(&path).await?;

        if status == StatusCode::FORBIDDEN {
            if let Ok(disabled) = serde_json::from_str::<DisabledResponse>(&body) {
                if disabled.enabled == Some(false) {
                    return Ok(QuestionsFetch::Disabled {
                        message: disabled.message,
                    });
                }
            }
        }

        if !status.is_success() {
            return Err(PortalError::Status {
                url: self.url(&path),
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        Ok(QuestionsFetch::Loaded(serde_json::from_str(&body)?))
    }

    pub async fn verify_completion(&self, subject_id: &str, launch_id: &str) -> PortalResult<bool> {
        let path = format!("{}/{}/{}", self.endpoints.verify, subject_id, launch_id);
        let response: VerifyResponse = self.get(&path).await?;
        Ok(response.already_done)
    }

    pub async fn list_groups(&self, teacher_id: &str) -> PortalResult<Vec<RawGroup>> {
        let path = format!("{}/{}", self.endpoints.groups, teacher_id);
        let envelope: DbEnvelope<RawGroup> = self.get(&path).await?;
        Ok(envelope.db)
    }

    pub async fn list_faculty_teachers(&self) -> PortalResult<Vec<RawTeacher>> {
        let envelope: DbEnvelope<RawTeacher> = self.get(&self.endpoints.faculty_teachers).await?;
        Ok(envelope.db)
    }

    /// POST a JSON body. Any HTTP status is returned to the caller; only
    /// transport failures are errors here.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> PortalResult<SubmitStatus> {
        let url = self.url(path);
        tracing::debug!(method = "POST", %url, "sending portal request");
        let response = self
            .client
            .post(&url)
            .headers(self.build_headers()?)
            .json(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(SubmitStatus { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use serde_json::json;

    fn client_for(server: &Server) -> PortalClient {
        PortalClient::new(&server.url(), "token-123".to_string(), Endpoints::default()).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_questions_detects_global_disable() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/evaluaciones/preguntas/2")
            .with_status(403)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"evaluacionesHabilitadas": false, "message": "Evaluaciones cerradas"})
                    .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server);
        match client.fetch_questions("2").await.unwrap() {
            QuestionsFetch::Disabled { message } => {
                assert_eq!(message.as_deref(), Some("Evaluaciones cerradas"))
            }
            other => panic!("expected Disabled, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_plain_403_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/evaluaciones/preguntas/2")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.fetch_questions("2").await.unwrap_err();
        assert!(matches!(err, PortalError::Status { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_requests_carry_bearer_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/evaluaciones/verificar/15/8")
            .match_header("authorization", "Bearer token-123")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"yaRealizada": true}).to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        assert!(client.verify_completion("15", "8").await.unwrap());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_returns_non_success_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/evaluaciones/decano/docente")
            .with_status(409)
            .with_body("ya realizada")
            .create_async()
            .await;

        let client = client_for(&server);
        let status = client
            .post_json("/evaluaciones/decano/docente", &json!({"a": 1}))
            .await
            .unwrap();
        assert_eq!(status.status, 409);
        assert_eq!(status.body, "ya realizada");
    }
}
