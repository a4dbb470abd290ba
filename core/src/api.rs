use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::state::{InputType, Reading, Session, SessionTarget, SessionType};
use reqwest::{header, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use url::Url;

/// Thin JSON client for the reading-companion backend.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    auth: AuthContext,
}

#[derive(Debug, Serialize)]
struct MessageBody<'a> {
    message: &'a str,
    input_type: InputType,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, auth: AuthContext) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    pub async fn get_reading(&self, reading_id: &str) -> Result<Reading, ApiError> {
        self.request_json(Method::GET, &format!("/api/readings/{reading_id}"), None::<&()>)
            .await
    }

    pub async fn create_session(
        &self,
        reading_id: &str,
        session_type: SessionType,
    ) -> Result<Session, ApiError> {
        let session: Session = self
            .request_json(
                Method::POST,
                &format!("/api/readings/{reading_id}/sessions"),
                Some(&json!({ "session_type": session_type })),
            )
            .await?;
        tracing::info!(reading_id, session_id = %session.id, "created session");
        Ok(session)
    }

    pub async fn end_session(&self, target: &SessionTarget) -> Result<Session, ApiError> {
        self.request_json(
            Method::POST,
            &format!(
                "/api/readings/{}/sessions/{}/end",
                target.reading_id, target.session_id
            ),
            None::<&()>,
        )
        .await
    }

    /// Open the streamed message endpoint. The caller consumes the body as
    /// server-sent events.
    pub async fn post_message_stream(
        &self,
        target: &SessionTarget,
        text: &str,
        input_type: InputType,
    ) -> Result<Response, ApiError> {
        let path = format!(
            "/api/readings/{}/sessions/{}/messages",
            target.reading_id, target.session_id
        );
        let request = self
            .authorized(Method::POST, &path)
            .await?
            .header(header::ACCEPT, "text/event-stream")
            .json(&MessageBody {
                message: text,
                input_type,
            });
        let response = request.send().await?;
        Self::check_status(response).await
    }

    /// Turn an API path into the matching `ws://` or `wss://` URL.
    pub fn ws_url(&self, path: &str) -> Result<Url, ApiError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|err| ApiError::InvalidUrl(format!("{}{path}: {err}", self.base_url)))?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| ApiError::InvalidUrl(url.to_string()))?;
        Ok(url)
    }

    async fn request_json<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut request = self.authorized(method, path).await?;
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = Self::check_status(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn authorized(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let mut request = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = self.auth.bearer().await? {
            request = request.bearer_auth(token);
        }
        Ok(request)
    }

    async fn check_status(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), "backend rejected request");
        Err(ApiError::from_body(status.as_u16(), &body))
    }
}
