use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::api_types::{AppConfig, DiscoverRequest, DiscoverResponse, ResetResponse};
use super::{AuthApi, ConfigApi, EntityApi, RepoApi};
use crate::config::ApiConfig;
use crate::entity::RepoEntity;
use crate::error::{ApiError, ApiResult};
use crate::types::{LlmConfig, RepoConfig, User};

/// Longest error body kept in an error message.
const MAX_ERROR_BODY: usize = 200;

/// PromptRepo REST API client
#[derive(Debug, Clone)]
pub struct HttpClient {
  client: reqwest::Client,
  base_url: Url,
  token: Option<String>,
}

impl HttpClient {
  pub fn new(config: &ApiConfig, token: Option<String>) -> ApiResult<Self> {
    let base_url = Url::parse(&config.url).map_err(|e| ApiError::Network {
      message: format!("invalid API url '{}': {}", config.url, e),
    })?;

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .user_agent(concat!("promptrepo/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| ApiError::Network {
        message: format!("failed to create HTTP client: {}", e),
      })?;

    Ok(Self {
      client,
      base_url,
      token,
    })
  }

  /// Build an endpoint URL. Each segment is percent-encoded on its own, so a
  /// file path containing `/` stays a single segment.
  fn url(&self, segments: &[&str]) -> ApiResult<Url> {
    let mut url = self.base_url.clone();
    url
      .path_segments_mut()
      .map_err(|_| ApiError::Network {
        message: format!("API url '{}' cannot be a base", self.base_url),
      })?
      .pop_if_empty()
      .extend(["api", "v0"])
      .extend(segments);
    Ok(url)
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    let builder = self.client.request(method, url);
    match &self.token {
      Some(token) => builder.bearer_auth(token),
      None => builder,
    }
  }

  async fn execute(&self, builder: RequestBuilder, what: &str) -> ApiResult<reqwest::Response> {
    let response = builder.send().await.map_err(|e| ApiError::Network {
      message: format!("{}: {}", what, e),
    })?;

    let status = response.status();
    debug!(what, status = status.as_u16(), "api response");

    if status == StatusCode::NOT_FOUND {
      return Err(ApiError::NotFound {
        what: what.to_string(),
      });
    }

    if !status.is_success() {
      let mut body = response.text().await.unwrap_or_default();
      if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
          cut -= 1;
        }
        body.truncate(cut);
      }
      return Err(ApiError::Status {
        status: status.as_u16(),
        message: if body.is_empty() {
          what.to_string()
        } else {
          format!("{}: {}", what, body)
        },
      });
    }

    Ok(response)
  }

  async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> ApiResult<T> {
    let response = self.execute(builder, what).await?;
    response.json::<T>().await.map_err(|e| ApiError::Decode {
      message: format!("{}: {}", what, e),
    })
  }
}

#[async_trait]
impl<E: RepoEntity> EntityApi<E> for HttpClient {
  async fn discover(&self, repo_names: &[String]) -> ApiResult<Vec<E>> {
    let url = self.url(&[E::COLLECTION, "discover"])?;
    let body = DiscoverRequest { repo_names };
    let response: DiscoverResponse<E> = self
      .send_json(
        self.request(Method::POST, url).json(&body),
        &format!("discover {}", E::COLLECTION),
      )
      .await?;
    Ok(response.items)
  }

  async fn get(&self, repo_name: &str, file_path: &str) -> ApiResult<E> {
    let url = self.url(&["repos", repo_name, E::COLLECTION, file_path])?;
    self
      .send_json(
        self.request(Method::GET, url),
        &format!("{} {}:{}", E::KIND, repo_name, file_path),
      )
      .await
  }

  async fn save(&self, repo_name: &str, file_path: &str, entity: &E) -> ApiResult<E> {
    let url = self.url(&["repos", repo_name, E::COLLECTION, file_path])?;
    self
      .send_json(
        self.request(Method::PUT, url).json(entity),
        &format!("save {} {}:{}", E::KIND, repo_name, file_path),
      )
      .await
  }

  async fn delete(&self, repo_name: &str, file_path: &str) -> ApiResult<()> {
    let url = self.url(&["repos", repo_name, E::COLLECTION, file_path])?;
    self
      .execute(
        self.request(Method::DELETE, url),
        &format!("delete {} {}:{}", E::KIND, repo_name, file_path),
      )
      .await?;
    Ok(())
  }
}

#[async_trait]
impl RepoApi for HttpClient {
  async fn reset_to_base_branch(&self, repo_name: &str) -> ApiResult<ResetResponse> {
    let url = self.url(&["repos", repo_name, "reset"])?;
    self
      .send_json(
        self.request(Method::POST, url),
        &format!("reset {} to base branch", repo_name),
      )
      .await
  }
}

#[async_trait]
impl ConfigApi for HttpClient {
  async fn get_config(&self) -> ApiResult<AppConfig> {
    let url = self.url(&["config"])?;
    self
      .send_json(self.request(Method::GET, url), "get config")
      .await
  }

  async fn save_repo_config(&self, config: &RepoConfig) -> ApiResult<RepoConfig> {
    let url = self.url(&["config", "repos", &config.repo_name])?;
    self
      .send_json(
        self.request(Method::PUT, url).json(config),
        &format!("save repo config {}", config.repo_name),
      )
      .await
  }

  async fn delete_repo_config(&self, repo_name: &str) -> ApiResult<()> {
    let url = self.url(&["config", "repos", repo_name])?;
    self
      .execute(
        self.request(Method::DELETE, url),
        &format!("delete repo config {}", repo_name),
      )
      .await?;
    Ok(())
  }

  async fn save_llm_config(&self, config: &LlmConfig) -> ApiResult<LlmConfig> {
    let url = self.url(&["config", "llms", &config.id])?;
    self
      .send_json(
        self.request(Method::PUT, url).json(config),
        &format!("save llm config {}", config.id),
      )
      .await
  }
}

#[async_trait]
impl AuthApi for HttpClient {
  async fn current_user(&self) -> ApiResult<User> {
    let url = self.url(&["auth", "me"])?;
    self
      .send_json(self.request(Method::GET, url), "current user")
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::Prompt;
  use wiremock::matchers::{body_json, header, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn client_for(server: &MockServer) -> HttpClient {
    let config = ApiConfig {
      url: server.uri(),
      timeout_secs: 5,
    };
    HttpClient::new(&config, Some("test-token".to_string())).unwrap()
  }

  fn prompt_json(repo: &str, path: &str) -> serde_json::Value {
    serde_json::json!({ "repo_name": repo, "file_path": path, "name": "Greeting" })
  }

  #[tokio::test]
  async fn test_discover_posts_repo_names() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/v0/prompts/discover"))
      .and(header("authorization", "Bearer test-token"))
      .and(body_json(serde_json::json!({ "repo_names": ["acme/prompts"] })))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_json(serde_json::json!({ "items": [prompt_json("acme/prompts", "prompts/a.yaml")] })),
      )
      .expect(1)
      .mount(&server)
      .await;

    let client = client_for(&server);
    let prompts: Vec<Prompt> =
      EntityApi::<Prompt>::discover(&client, &["acme/prompts".to_string()])
        .await
        .unwrap();

    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].file_path, "prompts/a.yaml");
  }

  #[tokio::test]
  async fn test_file_path_is_one_encoded_segment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/v0/repos/main-repo/prompts/prompts%2Fa.yaml"))
      .respond_with(ResponseTemplate::new(200).set_body_json(prompt_json("main-repo", "prompts/a.yaml")))
      .mount(&server)
      .await;

    let client = client_for(&server);
    let prompt: Prompt = EntityApi::<Prompt>::get(&client, "main-repo", "prompts/a.yaml")
      .await
      .unwrap();
    assert_eq!(prompt.repo_name, "main-repo");
  }

  #[tokio::test]
  async fn test_not_found_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(404))
      .mount(&server)
      .await;

    let client = client_for(&server);
    let result: ApiResult<Prompt> = EntityApi::<Prompt>::get(&client, "r", "missing.yaml").await;
    assert!(matches!(result, Err(ApiError::NotFound { .. })));
  }

  #[tokio::test]
  async fn test_server_error_maps_to_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/v0/config"))
      .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
      .mount(&server)
      .await;

    let client = client_for(&server);
    match client.get_config().await {
      Err(ApiError::Status { status, message }) => {
        assert_eq!(status, 500);
        assert!(message.contains("boom"));
      }
      other => panic!("unexpected result: {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_reset_returns_embedded_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/v0/repos/r/reset"))
      .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "status": "success",
        "data": { "success": false, "message": "conflict" }
      })))
      .mount(&server)
      .await;

    let client = client_for(&server);
    let response = client.reset_to_base_branch("r").await.unwrap();
    assert!(matches!(
      response.into_result(),
      Err(ApiError::SoftFailure { .. })
    ));
  }
}
