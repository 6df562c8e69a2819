//! Handlers for the `/exec` resource.
//!
//! All four endpoints build an [`ExecutionRequest`] and hand it to the
//! orchestrator. Inline and dynamic scripts share one code path; the dynamic
//! form only adds an explicit `language`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use aiops_core::error::CoreError;
use aiops_core::scripting::executor::{ExecutionRequest, ExecutionResult};
use aiops_core::scripting::language::Language;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::extract::ApiJson;
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireExecute;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Fields shared by every execution endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExecOptions {
    /// Local account to run as.
    pub user: Option<String>,
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables for the child.
    pub env: Option<HashMap<String, String>>,
    /// Timeout in seconds, clamped to the configured ceiling.
    pub timeout: Option<u64>,
}

impl ExecOptions {
    fn apply(self, request: ExecutionRequest) -> ExecutionRequest {
        let mut env: Vec<(String, String)> = self.env.unwrap_or_default().into_iter().collect();
        env.sort();
        request
            .with_user(self.user)
            .with_working_dir(self.working_dir)
            .with_timeout(self.timeout.map(Duration::from_secs))
            .with_env(env)
    }
}

/// Request body for `POST /exec/command`.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(flatten)]
    pub options: ExecOptions,
}

/// Request body for `POST /exec/script/content`.
#[derive(Debug, Deserialize)]
pub struct ScriptContentRequest {
    pub script: String,
    #[serde(flatten)]
    pub options: ExecOptions,
}

/// Request body for `POST /exec/script/file`.
#[derive(Debug, Deserialize)]
pub struct ScriptFileRequest {
    pub script_path: PathBuf,
    #[serde(flatten)]
    pub options: ExecOptions,
}

/// Request body for `POST /exec/script/dynamic`.
#[derive(Debug, Deserialize)]
pub struct DynamicScriptRequest {
    #[serde(alias = "code")]
    pub script: String,
    /// Overrides language detection (`shell`, `python`, `powershell`, `batch`).
    #[serde(default)]
    pub language: Option<String>,
    #[serde(flatten)]
    pub options: ExecOptions,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /exec/command
pub async fn run_command(
    State(state): State<AppState>,
    RequireExecute(user): RequireExecute,
    ApiJson(input): ApiJson<CommandRequest>,
) -> AppResult<Json<ExecutionResult>> {
    let request = input.options.apply(ExecutionRequest::command(input.command));
    execute(&state, &user, request).await
}

/// POST /exec/script/content
pub async fn run_script_content(
    State(state): State<AppState>,
    RequireExecute(user): RequireExecute,
    ApiJson(input): ApiJson<ScriptContentRequest>,
) -> AppResult<Json<ExecutionResult>> {
    let request = input.options.apply(ExecutionRequest::script(input.script, None));
    execute(&state, &user, request).await
}

/// POST /exec/script/file
pub async fn run_script_file(
    State(state): State<AppState>,
    RequireExecute(user): RequireExecute,
    ApiJson(input): ApiJson<ScriptFileRequest>,
) -> AppResult<Json<ExecutionResult>> {
    let request = input
        .options
        .apply(ExecutionRequest::script_file(input.script_path));
    execute(&state, &user, request).await
}

/// POST /exec/script/dynamic
pub async fn run_script_dynamic(
    State(state): State<AppState>,
    RequireExecute(user): RequireExecute,
    ApiJson(input): ApiJson<DynamicScriptRequest>,
) -> AppResult<Json<ExecutionResult>> {
    let language = input
        .language
        .as_deref()
        .map(str::parse::<Language>)
        .transpose()
        .map_err(|e| AppError::Core(CoreError::Validation(e.to_string())))?;

    let request = input
        .options
        .apply(ExecutionRequest::script(input.script, language));
    execute(&state, &user, request).await
}

async fn execute(
    state: &AppState,
    caller: &AuthUser,
    request: ExecutionRequest,
) -> AppResult<Json<ExecutionResult>> {
    let result = state.orchestrator.execute(request).await?;
    tracing::info!(
        subject = %caller.subject,
        return_code = result.return_code,
        success = result.success,
        timed_out = result.timed_out,
        duration_ms = result.duration_ms,
        "Execution finished"
    );
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use aiops_core::scripting::executor::Payload;

    use super::*;

    #[test]
    fn options_flatten_into_command_request() {
        let input: CommandRequest = serde_json::from_value(serde_json::json!({
            "command": "echo hi",
            "user": "deploy",
            "timeout": 5,
            "env": {"B": "2", "A": "1"}
        }))
        .expect("deserialize");

        let request = input.options.apply(ExecutionRequest::command(input.command));
        assert_eq!(request.payload, Payload::Command("echo hi".into()));
        assert_eq!(request.user.as_deref(), Some("deploy"));
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
        assert_eq!(
            request.env,
            vec![("A".to_string(), "1".to_string()), ("B".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn dynamic_request_accepts_code_alias() {
        let input: DynamicScriptRequest = serde_json::from_value(serde_json::json!({
            "code": "print('hi')",
            "language": "python"
        }))
        .expect("deserialize");
        assert_eq!(input.script, "print('hi')");
        assert_eq!(input.language.as_deref(), Some("python"));
        assert!(input.options.user.is_none());
    }

    #[test]
    fn command_is_required() {
        let result: Result<CommandRequest, _> =
            serde_json::from_value(serde_json::json!({"user": "root"}));
        assert!(result.is_err());
    }
}
