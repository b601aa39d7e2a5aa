use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder};
use url::{form_urlencoded, Url};

use crate::auth::Token;
use crate::error::{ActionError, CiWatchError, ConnectivityError, PollError, Result};
use crate::providers::http;

use super::types::{GitLabJob, GitLabPipeline};

/// GitLab REST v4 client scoped to one project.
pub struct GitLabClient {
    client: Client,
    project_url: Url,
}

impl GitLabClient {
    pub fn new(base_url: &str, project_path: &str, token: Option<&Token>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(token.as_str())
                .map_err(|e| CiWatchError::Config(format!("Invalid GitLab token: {e}")))?;
            value.set_sensitive(true);
            headers.insert("PRIVATE-TOKEN", value);
        }

        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }

        // The project path is one URL segment, so its slashes must be encoded.
        let encoded: String = form_urlencoded::byte_serialize(project_path.as_bytes()).collect();

        let project_url = Url::parse(&base)
            .map_err(|e| CiWatchError::Config(format!("Invalid base URL: {e}")))?
            .join(&format!("api/v4/projects/{encoded}/"))
            .map_err(|e| CiWatchError::Config(format!("Invalid project URL: {e}")))?;

        Ok(Self {
            client: http::build_client(headers)?,
            project_url,
        })
    }

    fn get(&self, path: &str) -> std::result::Result<RequestBuilder, url::ParseError> {
        Ok(self.client.get(self.project_url.join(path)?))
    }

    fn post(&self, path: &str) -> std::result::Result<RequestBuilder, url::ParseError> {
        Ok(self.client.post(self.project_url.join(path)?))
    }

    pub async fn list_pipelines(&self, per_page: usize) -> std::result::Result<Vec<GitLabPipeline>, PollError> {
        let request = self
            .get(&format!("pipelines?per_page={per_page}"))
            .map_err(|e| PollError::Backend(e.to_string()))?;
        http::fetch_json(request).await
    }

    pub async fn pipeline_jobs(&self, pipeline_id: u64) -> std::result::Result<Vec<GitLabJob>, PollError> {
        let request = self
            .get(&format!("pipelines/{pipeline_id}/jobs"))
            .map_err(|e| PollError::Backend(e.to_string()))?;
        http::fetch_json(request).await
    }

    pub async fn ping(&self) -> std::result::Result<(), ConnectivityError> {
        http::probe(self.client.get(self.project_url.clone())).await
    }

    /// POSTs to a project-relative action endpoint.
    pub async fn act(&self, path: &str) -> std::result::Result<(), ActionError> {
        let request = self
            .post(path)
            .map_err(|e| ActionError::Backend(e.to_string()))?;
        http::fire(request).await
    }

    pub async fn job_trace(&self, job_id: &str) -> std::result::Result<String, ActionError> {
        let request = self
            .get(&format!("jobs/{job_id}/trace"))
            .map_err(|e| ActionError::Backend(e.to_string()))?;
        http::fetch_text(request).await
    }
}
