//! Blocking HTTP implementation of the remote service traits.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use taskdeck_core::SyncError;
use taskdeck_core::config::ClientConfig;
use taskdeck_core::model::{
    AccessToken, Task, TaskDraft, TaskId, TaskPatch, TaskWithWorkspace, User, UserId, Workspace,
    WorkspaceId, WorkspaceMember,
};
use taskdeck_core::remote::{AuthService, RemoteService};
use tracing::debug;

/// Talks to the task service under `api_base`, with the bearer token when
/// one is set.
pub struct HttpRemote {
    agent: ureq::Agent,
    base: String,
    token: Option<String>,
}

impl HttpRemote {
    pub fn new(config: &ClientConfig, token: Option<String>) -> Self {
        Self::with_base(config.api_base(), config.request_timeout(), token)
    }

    fn with_base(base: String, timeout: Duration, token: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("td/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent, base, token }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let url = self.url(path);
        debug!(method, url = %url, "request");
        let request = self.agent.request(method, &url).set("Accept", "application/json");
        match &self.token {
            Some(token) => request.set("Authorization", &format!("Bearer {token}")),
            None => request,
        }
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SyncError> {
        decode(self.request("GET", path).call())
    }

    fn send<B: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        body: &B,
    ) -> Result<T, SyncError> {
        let body = serde_json::to_value(body)?;
        decode(self.request(method, path).send_json(body))
    }

    fn delete(&self, path: &str) -> Result<(), SyncError> {
        self.request("DELETE", path)
            .call()
            .map(|_| ())
            .map_err(map_ureq_error)
    }
}

fn decode<T: DeserializeOwned>(result: Result<ureq::Response, ureq::Error>) -> Result<T, SyncError> {
    let response = result.map_err(map_ureq_error)?;
    response
        .into_json::<T>()
        .map_err(|err| SyncError::Decode(err.to_string()))
}

fn map_ureq_error(err: ureq::Error) -> SyncError {
    match err {
        ureq::Error::Status(status, response) => SyncError::from_status(status, error_detail(response)),
        ureq::Error::Transport(transport) => SyncError::Network(transport.to_string()),
    }
}

/// The service reports failures as `{"detail": ...}` where detail is a
/// string or a list of field errors. Fall back to the raw body.
fn error_detail(response: ureq::Response) -> String {
    let status_text = response.status_text().to_string();
    let Ok(body) = response.into_string() else {
        return status_text;
    };
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(value) => match value.get("detail") {
            Some(serde_json::Value::String(detail)) => detail.clone(),
            Some(other) => other.to_string(),
            None => body,
        },
        Err(_) if body.trim().is_empty() => status_text,
        Err(_) => body,
    }
}

impl RemoteService for HttpRemote {
    fn list_workspaces(&self) -> Result<Vec<Workspace>, SyncError> {
        self.get("workspaces")
    }

    fn create_workspace(&self, name: &str) -> Result<Workspace, SyncError> {
        self.send("POST", "workspaces", &serde_json::json!({ "name": name }))
    }

    fn list_tasks(&self, workspace_id: WorkspaceId) -> Result<Vec<Task>, SyncError> {
        self.get(&format!("workspaces/{workspace_id}/tasks"))
    }

    fn create_task(&self, workspace_id: WorkspaceId, draft: &TaskDraft) -> Result<Task, SyncError> {
        self.send("POST", &format!("workspaces/{workspace_id}/tasks"), draft)
    }

    fn update_task(&self, task_id: TaskId, patch: &TaskPatch) -> Result<Task, SyncError> {
        self.send("PATCH", &format!("tasks/{task_id}"), patch)
    }

    fn delete_task(&self, task_id: TaskId) -> Result<(), SyncError> {
        self.delete(&format!("tasks/{task_id}"))
    }

    fn my_tasks(&self) -> Result<Vec<TaskWithWorkspace>, SyncError> {
        self.get("tasks/me")
    }

    fn list_members(&self, workspace_id: WorkspaceId) -> Result<Vec<WorkspaceMember>, SyncError> {
        self.get(&format!("workspaces/{workspace_id}/members"))
    }

    fn invite_member(
        &self,
        workspace_id: WorkspaceId,
        email: &str,
    ) -> Result<WorkspaceMember, SyncError> {
        self.send(
            "POST",
            &format!("workspaces/{workspace_id}/members"),
            &serde_json::json!({ "email": email }),
        )
    }

    fn remove_member(&self, workspace_id: WorkspaceId, user_id: UserId) -> Result<(), SyncError> {
        self.delete(&format!("workspaces/{workspace_id}/members/{user_id}"))
    }
}

impl AuthService for HttpRemote {
    fn login(&self, email: &str, password: &str) -> Result<AccessToken, SyncError> {
        decode(
            self.request("POST", "auth/login")
                .send_form(&[("username", email), ("password", password)]),
        )
    }

    fn register(&self, email: &str, password: &str) -> Result<User, SyncError> {
        self.send(
            "POST",
            "auth/register",
            &serde_json::json!({ "email": email, "password": password }),
        )
    }

    fn current_user(&self) -> Result<User, SyncError> {
        self.get("auth/me")
    }
}
