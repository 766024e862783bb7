use std::sync::Arc;

use quadrant_api::Error;
use quadrant_api::ListId;
use quadrant_api::RemoteTask;
use quadrant_api::Result;
use quadrant_api::TaskId;
use quadrant_api::TaskList;
use quadrant_api::TaskPayload;
use quadrant_api::TasksBackend;
use quadrant_api::TokenSource;
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use reqwest::header::USER_AGENT;
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Gateway to the Google Tasks REST API. One HTTP request per operation,
/// bearer authorization, JSON bodies. The bearer token is looked up per
/// request through the [`TokenSource`] when one is attached, so a refreshed
/// session is picked up without rebuilding the client.
#[derive(Clone)]
pub struct HttpClient {
    base_url: String,
    http: reqwest::Client,
    bearer_token: Option<String>,
    token_source: Option<Arc<dyn TokenSource>>,
    user_agent: Option<HeaderValue>,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let mut base_url = base_url.into();
        // Trim trailing slashes for consistent URL building.
        while base_url.ends_with('/') {
            base_url.pop();
        }
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            base_url,
            http,
            bearer_token: None,
            token_source: None,
            user_agent: None,
        })
    }

    /// Fixed token, mainly for scripts and tests. A [`TokenSource`] set via
    /// [`Self::with_token_source`] takes precedence.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn with_token_source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.token_source = Some(source);
        self
    }

    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        if let Ok(hv) = HeaderValue::from_str(&ua.into()) {
            self.user_agent = Some(hv);
        }
        self
    }

    fn headers(&self) -> HeaderMap {
        let mut h = HeaderMap::new();
        if let Some(ua) = &self.user_agent {
            h.insert(USER_AGENT, ua.clone());
        } else {
            h.insert(USER_AGENT, HeaderValue::from_static("quadrant-cli"));
        }
        let token = self
            .token_source
            .as_ref()
            .and_then(|s| s.access_token())
            .or_else(|| self.bearer_token.clone());
        if let Some(token) = token {
            let value = format!("Bearer {token}");
            if let Ok(hv) = HeaderValue::from_str(&value) {
                h.insert(AUTHORIZATION, hv);
            }
        }
        h
    }
}

/// Lists come wrapped in an `items` envelope; the field is absent entirely
/// when there is nothing to return.
#[derive(Deserialize)]
struct TaskListsResponse {
    #[serde(default)]
    items: Vec<TaskList>,
}

#[derive(Deserialize)]
struct TasksResponse {
    #[serde(default)]
    items: Vec<RemoteTask>,
}

/// Pull the human-readable message out of a Google error body
/// (`{"error": {"message": "..."}}`).
fn provider_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(|s| s.to_string())
}

fn error_for_status(method: &str, url: &str, status: StatusCode, body: String) -> Error {
    let message = provider_message(&body).unwrap_or_else(|| {
        if body.trim().is_empty() {
            status.to_string()
        } else {
            body
        }
    });
    if status == StatusCode::UNAUTHORIZED {
        Error::Auth(message)
    } else {
        Error::Status {
            status: status.as_u16(),
            message: format!("{method} {url} failed: {message}"),
        }
    }
}

/// Check the status and drain the body. A 204 yields an empty string.
async fn read_success(method: &str, url: &str, res: reqwest::Response) -> Result<String> {
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(error_for_status(method, url, status, body));
    }
    Ok(body)
}

fn decode_json<T: DeserializeOwned>(method: &str, url: &str, body: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| Error::Http(format!("decode error for {method} {url}: {e}; body={body}")))
}

#[async_trait::async_trait]
impl TasksBackend for HttpClient {
    async fn list_task_lists(&self) -> Result<Vec<TaskList>> {
        let url = format!("{}/users/@me/lists", self.base_url);
        let res = self
            .http
            .get(&url)
            .headers(self.headers())
            .send()
            .await
            .map_err(|e| Error::Http(format!("GET {url} failed: {e}")))?;
        let body = read_success("GET", &url, res).await?;
        let parsed: TaskListsResponse = decode_json("GET", &url, &body)?;
        tracing::debug!("list_task_lists: {} lists", parsed.items.len());
        Ok(parsed.items)
    }

    async fn create_task_list(&self, title: &str) -> Result<TaskList> {
        let url = format!("{}/users/@me/lists", self.base_url);
        let res = self
            .http
            .post(&url)
            .headers(self.headers())
            .json(&serde_json::json!({ "title": title }))
            .send()
            .await
            .map_err(|e| Error::Http(format!("POST {url} failed: {e}")))?;
        let body = read_success("POST", &url, res).await?;
        decode_json("POST", &url, &body)
    }

    async fn rename_task_list(&self, list: &ListId, title: &str) -> Result<TaskList> {
        let url = format!("{}/users/@me/lists/{}", self.base_url, list.0);
        let res = self
            .http
            .put(&url)
            .headers(self.headers())
            .json(&serde_json::json!({ "id": list.0, "title": title }))
            .send()
            .await
            .map_err(|e| Error::Http(format!("PUT {url} failed: {e}")))?;
        let body = read_success("PUT", &url, res).await?;
        decode_json("PUT", &url, &body)
    }

    async fn delete_task_list(&self, list: &ListId) -> Result<()> {
        let url = format!("{}/users/@me/lists/{}", self.base_url, list.0);
        let res = self
            .http
            .delete(&url)
            .headers(self.headers())
            .send()
            .await
            .map_err(|e| Error::Http(format!("DELETE {url} failed: {e}")))?;
        read_success("DELETE", &url, res).await?;
        Ok(())
    }

    async fn list_tasks(&self, list: &ListId) -> Result<Vec<RemoteTask>> {
        let url = format!("{}/lists/{}/tasks", self.base_url, list.0);
        let res = self
            .http
            .get(&url)
            .headers(self.headers())
            .query(&[
                ("showCompleted", "true"),
                ("showHidden", "true"),
                ("maxResults", "100"),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(format!("GET {url} failed: {e}")))?;
        let body = read_success("GET", &url, res).await?;
        let parsed: TasksResponse = decode_json("GET", &url, &body)?;
        tracing::debug!("list_tasks: list={} items={}", list.0, parsed.items.len());
        Ok(parsed.items)
    }

    async fn create_task(&self, list: &ListId, payload: &TaskPayload) -> Result<RemoteTask> {
        let url = format!("{}/lists/{}/tasks", self.base_url, list.0);
        let res = self
            .http
            .post(&url)
            .headers(self.headers())
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Http(format!("POST {url} failed: {e}")))?;
        let body = read_success("POST", &url, res).await?;
        decode_json("POST", &url, &body)
    }

    async fn patch_task(
        &self,
        list: &ListId,
        task: &TaskId,
        payload: &TaskPayload,
    ) -> Result<RemoteTask> {
        let url = format!("{}/lists/{}/tasks/{}", self.base_url, list.0, task.0);
        let res = self
            .http
            .patch(&url)
            .headers(self.headers())
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Http(format!("PATCH {url} failed: {e}")))?;
        let body = read_success("PATCH", &url, res).await?;
        decode_json("PATCH", &url, &body)
    }

    async fn delete_task(&self, list: &ListId, task: &TaskId) -> Result<()> {
        let url = format!("{}/lists/{}/tasks/{}", self.base_url, list.0, task.0);
        let res = self
            .http
            .delete(&url)
            .headers(self.headers())
            .send()
            .await
            .map_err(|e| Error::Http(format!("DELETE {url} failed: {e}")))?;
        read_success("DELETE", &url, res).await?;
        Ok(())
    }

    async fn move_task(&self, from: &ListId, to: &ListId, task: &RemoteTask) -> Result<RemoteTask> {
        let payload = TaskPayload {
            title: Some(task.title.clone()),
            notes: task.notes.clone(),
            due: task.due,
            status: Some(task.status),
        };
        let created = self.create_task(to, &payload).await?;
        // Delete failure leaves the task in both lists; surface it so the
        // caller knows the source copy may still exist.
        self.delete_task(from, &task.id).await?;
        Ok(created)
    }
}
