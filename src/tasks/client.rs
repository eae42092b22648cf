use crate::config::ApiConfig;
use crate::tasks::api_types::{ApiCreateTask, ApiTask, ApiTaskListPage, ApiUpdateTask};
use crate::tasks::error::ApiError;
use crate::tasks::types::{Task, TaskDraft, TaskListPage, TaskPatch};
use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Operations offered by the task service.
///
/// Every call is exactly one round-trip. Retry policy belongs to callers.
#[async_trait]
pub trait TaskApi: Send + Sync {
  async fn list(&self, limit: u64, skip: u64) -> Result<TaskListPage, ApiError>;
  async fn get(&self, id: u64) -> Result<Task, ApiError>;
  async fn list_by_owner(&self, owner_id: u64) -> Result<TaskListPage, ApiError>;
  async fn create(&self, draft: &TaskDraft) -> Result<Task, ApiError>;
  async fn update(&self, id: u64, patch: &TaskPatch) -> Result<Task, ApiError>;
  async fn delete(&self, id: u64) -> Result<Task, ApiError>;
  async fn random(&self) -> Result<Task, ApiError>;
}

/// HTTP client for the task service
#[derive(Clone)]
pub struct TaskClient {
  http: reqwest::Client,
  base: Url,
}

impl TaskClient {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let mut base = Url::parse(&config.url)
      .map_err(|e| eyre!("Invalid task service url {}: {}", config.url, e))?;
    if !matches!(base.scheme(), "http" | "https") {
      return Err(eyre!(
        "Task service url must be http or https, got {}",
        base.scheme()
      ));
    }
    // Url::join replaces the last segment unless the path ends in a slash
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base })
  }

  fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
    self
      .base
      .join(path)
      .map_err(|e| ApiError::Network(format!("invalid endpoint {}: {}", path, e)))
  }

  /// Send a request and decode a 2xx JSON body into `A`, then into `T`.
  async fn send<T, A>(
    &self,
    request: reqwest::RequestBuilder,
    context: &'static str,
  ) -> Result<T, ApiError>
  where
    A: DeserializeOwned,
    T: From<A>,
  {
    let response = request.send().await?;

    let status = response.status();
    debug!(status = status.as_u16(), url = %response.url(), "task service responded");
    if !status.is_success() {
      return Err(ApiError::from_status(status));
    }

    let body = response.bytes().await?;

    let api: A = serde_json::from_slice(&body).map_err(|e| ApiError::Decode {
      context,
      message: e.to_string(),
    })?;

    Ok(T::from(api))
  }
}

#[async_trait]
impl TaskApi for TaskClient {
  async fn list(&self, limit: u64, skip: u64) -> Result<TaskListPage, ApiError> {
    let url = self.endpoint("tasks")?;
    let request = self
      .http
      .get(url)
      .query(&[("limit", limit), ("skip", skip)]);
    self
      .send::<TaskListPage, ApiTaskListPage>(request, "task list")
      .await
  }

  async fn get(&self, id: u64) -> Result<Task, ApiError> {
    let url = self.endpoint(&format!("tasks/{}", id))?;
    self.send::<Task, ApiTask>(self.http.get(url), "task").await
  }

  async fn list_by_owner(&self, owner_id: u64) -> Result<TaskListPage, ApiError> {
    let url = self.endpoint(&format!("tasks/owner/{}", owner_id))?;
    self
      .send::<TaskListPage, ApiTaskListPage>(self.http.get(url), "owner task list")
      .await
  }

  async fn create(&self, draft: &TaskDraft) -> Result<Task, ApiError> {
    let url = self.endpoint("tasks")?;
    let request = self.http.post(url).json(&ApiCreateTask::from(draft));
    self.send::<Task, ApiTask>(request, "created task").await
  }

  async fn update(&self, id: u64, patch: &TaskPatch) -> Result<Task, ApiError> {
    let url = self.endpoint(&format!("tasks/{}", id))?;
    let request = self.http.put(url).json(&ApiUpdateTask::from(patch));
    self.send::<Task, ApiTask>(request, "updated task").await
  }

  async fn delete(&self, id: u64) -> Result<Task, ApiError> {
    let url = self.endpoint(&format!("tasks/{}", id))?;
    self
      .send::<Task, ApiTask>(self.http.delete(url), "deleted task")
      .await
  }

  async fn random(&self) -> Result<Task, ApiError> {
    let url = self.endpoint("tasks/random")?;
    self.send::<Task, ApiTask>(self.http.get(url), "random task").await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use wiremock::matchers::{body_json, method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn client_for(url: &str) -> TaskClient {
    TaskClient::new(&ApiConfig {
      url: url.to_string(),
      timeout_secs: 5,
    })
    .unwrap()
  }

  fn task_json(id: u64, text: &str, completed: bool, owner: u64) -> serde_json::Value {
    json!({ "id": id, "text": text, "completed": completed, "ownerId": owner })
  }

  #[tokio::test]
  async fn test_list_sends_limit_and_skip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/tasks"))
      .and(query_param("limit", "10"))
      .and(query_param("skip", "20"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "tasks": [task_json(21, "a", false, 1), task_json(22, "b", true, 2)],
        "total": 25, "skip": 20, "limit": 10
      })))
      .expect(1)
      .mount(&server)
      .await;

    let page = client_for(&server.uri()).list(10, 20).await.unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total, 25);
    assert_eq!(page.skip, 20);
    assert_eq!(page.items[1].id, 22);
    assert!(page.items[1].completed);
  }

  #[tokio::test]
  async fn test_base_path_is_preserved() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/v1/tasks/3"))
      .respond_with(ResponseTemplate::new(200).set_body_json(task_json(3, "x", false, 1)))
      .expect(1)
      .mount(&server)
      .await;

    let client = client_for(&format!("{}/api/v1", server.uri()));
    assert_eq!(client.get(3).await.unwrap().id, 3);
  }

  #[tokio::test]
  async fn test_non_success_status_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/tasks/999"))
      .respond_with(ResponseTemplate::new(404).set_body_string("<html>nope</html>"))
      .expect(1)
      .mount(&server)
      .await;

    let err = client_for(&server.uri()).get(999).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
  }

  #[tokio::test]
  async fn test_malformed_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/tasks/random"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "seven" })))
      .mount(&server)
      .await;

    let err = client_for(&server.uri()).random().await.unwrap_err();
    assert!(matches!(err, ApiError::Decode { context: "random task", .. }));
  }

  #[tokio::test]
  async fn test_create_posts_draft() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/tasks"))
      .and(body_json(json!({ "text": "feed cat", "completed": false, "ownerId": 4 })))
      .respond_with(ResponseTemplate::new(201).set_body_json(task_json(255, "feed cat", false, 4)))
      .expect(1)
      .mount(&server)
      .await;

    let draft = TaskDraft::new("feed cat", 4).unwrap();
    let task = client_for(&server.uri()).create(&draft).await.unwrap();
    assert_eq!(task.id, 255);
    assert_eq!(task.owner_id, 4);
  }

  #[tokio::test]
  async fn test_update_puts_partial_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
      .and(path("/tasks/8"))
      .and(body_json(json!({ "completed": true })))
      .respond_with(ResponseTemplate::new(200).set_body_json(task_json(8, "x", true, 1)))
      .expect(1)
      .mount(&server)
      .await;

    let task = client_for(&server.uri())
      .update(8, &TaskPatch::completed(true))
      .await
      .unwrap();
    assert!(task.completed);
  }

  #[tokio::test]
  async fn test_delete_returns_deleted_record() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
      .and(path("/tasks/8"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "id": 8, "text": "x", "completed": false, "ownerId": 1,
        "isDeleted": true, "deletedOn": "2024-01-01T00:00:00Z"
      })))
      .expect(1)
      .mount(&server)
      .await;

    let task = client_for(&server.uri()).delete(8).await.unwrap();
    assert_eq!(task.id, 8);
  }

  #[tokio::test]
  async fn test_server_error_is_not_retried_here() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/tasks/owner/2"))
      .respond_with(ResponseTemplate::new(503))
      .expect(1)
      .mount(&server)
      .await;

    let err = client_for(&server.uri()).list_by_owner(2).await.unwrap_err();
    assert_eq!(err.status(), Some(503));
  }

  #[tokio::test]
  async fn test_unreachable_host_is_network_error() {
    let client = TaskClient::new(&ApiConfig {
      url: "http://127.0.0.1:9".to_string(),
      timeout_secs: 2,
    })
    .unwrap();

    let err = client.get(1).await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)));
  }

  #[test]
  fn test_rejects_non_http_scheme() {
    let result = TaskClient::new(&ApiConfig {
      url: "ftp://example.com".to_string(),
      timeout_secs: 5,
    });
    assert!(result.is_err());
  }
}
