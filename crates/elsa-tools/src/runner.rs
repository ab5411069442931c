// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use elsa_config::{AskLevel, FunctionSpec};
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::{
    confirm_execution, render_command, render_prose, OperatorIo, RenderInputs,
};

/// Environment variable exporting the active model to function children so
/// nested invocations inherit it.
pub const MODEL_ENV_VAR: &str = "ELSA_MODEL";

/// Result of one shell-function invocation.
///
/// A denial is not an error: `approved` is false and `output` carries the
/// operator's message, which the caller records as the tool result.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub approved: bool,
    /// The rendered command as shown to the operator.
    pub command: String,
    /// Data piped to the child's stdin, empty when none was configured.
    pub stdin: String,
    pub output: String,
}

/// Validates arguments, renders templates, gates execution through the
/// confirmation policy and runs the command in a subshell under a
/// cancellable deadline.
pub struct FunctionRunner {
    io: Arc<dyn OperatorIo>,
    /// Exported as [`MODEL_ENV_VAR`] on every function child.
    model: String,
}

impl FunctionRunner {
    pub fn new(io: Arc<dyn OperatorIo>, model: impl Into<String>) -> Self {
        Self {
            io,
            model: model.into(),
        }
    }

    /// Execute `spec` with the model-supplied JSON argument string.
    ///
    /// Hard errors (malformed arguments, missing required parameters,
    /// spawn failures, timeouts, non-zero exits) are returned as `Err`;
    /// the caller reports them into the conversation and continues.
    pub async fn execute(
        &self,
        ask: AskLevel,
        spec: &FunctionSpec,
        raw_args: &str,
    ) -> anyhow::Result<RunOutcome> {
        let args = parse_arguments(raw_args)?;
        let args = apply_defaults(spec, args);
        check_required(spec, &args)?;

        let inputs = RenderInputs {
            params: &spec.parameters,
            args: &args,
        };

        let command = render_command(&spec.command, inputs, self.io.as_ref()).await;
        let command = expand_leading_tilde(&command);

        let decision = confirm_execution(
            ask,
            spec.safe,
            &format!("Run '{}':\n  {}", spec.name, command),
            self.io.as_ref(),
        )
        .await;
        if !decision.approved {
            return Ok(RunOutcome {
                approved: false,
                command,
                stdin: String::new(),
                output: format!("Message from user: {}", decision.message),
            });
        }

        if let Some(banner) = &spec.banner {
            let text = render_prose(banner, inputs, self.io.as_ref()).await;
            self.io.show(&text);
        }

        let workdir = match &spec.pwd {
            Some(tpl) => {
                let rendered = render_prose(tpl, inputs, self.io.as_ref()).await;
                let expanded = shellexpand::full(&rendered)
                    .with_context(|| format!("expanding working directory '{rendered}'"))?;
                Some(expanded.into_owned())
            }
            None => None,
        };

        let stdin_data = match &spec.stdin {
            Some(tpl) => Some(render_prose(tpl, inputs, self.io.as_ref()).await),
            None => None,
        };

        let timeout = spec.timeout_secs();
        debug!(function = %spec.name, %command, timeout, "executing shell function");

        let output = self
            .run_shell(&command, workdir.as_deref(), stdin_data.as_deref(), timeout)
            .await?;

        Ok(RunOutcome {
            approved: true,
            command,
            stdin: stdin_data.unwrap_or_default(),
            output,
        })
    }

    /// Launch via `sh -c` under a deadline, capturing combined output.
    async fn run_shell(
        &self,
        command: &str,
        workdir: Option<&str>,
        stdin_data: Option<&str>,
        timeout_secs: u64,
    ) -> anyhow::Result<String> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd.env(MODEL_ENV_VAR, &self.model);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // When no stdin template is configured the child inherits the
        // process stdin, so piped invocations of the binary still work.
        cmd.stdin(if stdin_data.is_some() {
            Stdio::piped()
        } else {
            Stdio::inherit()
        });
        // When the deadline fires the output future is dropped; SIGKILL is
        // sent before the handle is released so no orphan keeps running.
        cmd.kill_on_drop(true);
        if let Some(dir) = workdir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning command: {command}"))?;

        if let Some(data) = stdin_data {
            let mut stdin = child.stdin.take().context("child stdin unavailable")?;
            stdin
                .write_all(data.as_bytes())
                .await
                .context("writing to child stdin")?;
            drop(stdin);
        }

        let result =
            tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
                .await;

        match result {
            Ok(Ok(output)) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                if output.status.success() {
                    Ok(combined.trim_end().to_string())
                } else {
                    let code = output.status.code().unwrap_or(-1);
                    bail!(
                        "command failed with exit status {code}: {command}\n{}",
                        combined.trim_end()
                    );
                }
            }
            Ok(Err(e)) => Err(e).with_context(|| format!("waiting for command: {command}")),
            Err(_) => bail!("command timed out after {timeout_secs} seconds: {command}"),
        }
    }
}

/// Parse the model's argument string.  Empty input is the empty object;
/// anything that is not a JSON object is a hard error.
fn parse_arguments(raw: &str) -> anyhow::Result<Map<String, Value>> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    let value: Value =
        serde_json::from_str(raw).with_context(|| format!("invalid JSON arguments: {raw}"))?;
    match value {
        Value::Object(map) => Ok(map),
        other => bail!("arguments must be a JSON object, got: {other}"),
    }
}

/// Inject declared defaults for optional parameters the model omitted.
fn apply_defaults(spec: &FunctionSpec, mut args: Map<String, Value>) -> Map<String, Value> {
    for p in &spec.parameters {
        if let Some(default) = &p.default {
            args.entry(p.name.clone()).or_insert_with(|| default.clone());
        }
    }
    args
}

/// Every required parameter must be present and non-null before any
/// template rendering is attempted.
fn check_required(spec: &FunctionSpec, args: &Map<String, Value>) -> anyhow::Result<()> {
    let missing: Vec<&str> = spec
        .parameters
        .iter()
        .filter(|p| p.required)
        .filter(|p| matches!(args.get(&p.name), None | Some(Value::Null)))
        .map(|p| p.name.as_str())
        .collect();
    if !missing.is_empty() {
        bail!("missing required parameters: {}", missing.join(", "));
    }
    Ok(())
}

/// Expand a leading `~` to the operator's home directory.
fn expand_leading_tilde(command: &str) -> String {
    if let Some(rest) = command.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}/{}", home.display(), rest);
        }
    }
    command.to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use elsa_config::ParameterSpec;
    use serde_json::json;

    use super::*;
    use crate::Confirmation;

    /// Scripted operator: fixed confirmation answer, collects banners.
    struct ScriptedIo {
        answer: Confirmation,
        banners: Mutex<Vec<String>>,
    }

    impl ScriptedIo {
        fn approving() -> Arc<Self> {
            Arc::new(Self {
                answer: Confirmation::approved(),
                banners: Mutex::new(Vec::new()),
            })
        }
        fn denying(msg: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: Confirmation::denied(msg),
                banners: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl OperatorIo for ScriptedIo {
        async fn confirm(&self, _prompt: &str) -> Confirmation {
            self.answer.clone()
        }
        async fn read_block(&self, _prompt: &str) -> String {
            String::new()
        }
        fn show(&self, text: &str) {
            self.banners.lock().unwrap().push(text.to_string());
        }
    }

    fn runner(io: Arc<ScriptedIo>) -> FunctionRunner {
        FunctionRunner::new(io, "mock/model")
    }

    fn spec(command: &str) -> FunctionSpec {
        FunctionSpec {
            name: "f".into(),
            command: command.into(),
            safe: true,
            ..FunctionSpec::default()
        }
    }

    // ── Happy path ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn executes_and_trims_output() {
        let r = runner(ScriptedIo::approving());
        let out = r
            .execute(AskLevel::None, &spec("echo hello"), "{}")
            .await
            .unwrap();
        assert!(out.approved);
        assert_eq!(out.command, "echo hello");
        assert_eq!(out.output, "hello");
    }

    #[tokio::test]
    async fn empty_arguments_string_is_empty_object() {
        let r = runner(ScriptedIo::approving());
        let out = r.execute(AskLevel::None, &spec("echo ok"), "").await.unwrap();
        assert_eq!(out.output, "ok");
    }

    #[tokio::test]
    async fn empty_stdout_is_a_valid_success() {
        let r = runner(ScriptedIo::approving());
        let out = r.execute(AskLevel::None, &spec("true"), "{}").await.unwrap();
        assert_eq!(out.output, "");
    }

    #[tokio::test]
    async fn model_env_var_is_exported_to_children() {
        let r = runner(ScriptedIo::approving());
        let out = r
            .execute(AskLevel::None, &spec("printf %s \"$ELSA_MODEL\""), "{}")
            .await
            .unwrap();
        assert_eq!(out.output, "mock/model");
    }

    #[tokio::test]
    async fn parameters_render_into_command() {
        let r = runner(ScriptedIo::approving());
        let f = FunctionSpec {
            parameters: vec![ParameterSpec {
                name: "word".into(),
                required: true,
                ..ParameterSpec::default()
            }],
            ..spec("echo {{word}}")
        };
        let out = r
            .execute(AskLevel::None, &f, r#"{"word":"bird"}"#)
            .await
            .unwrap();
        assert_eq!(out.command, "echo bird");
        assert_eq!(out.output, "bird");
    }

    #[tokio::test]
    async fn optional_default_is_injected_when_omitted() {
        let r = runner(ScriptedIo::approving());
        let f = FunctionSpec {
            parameters: vec![ParameterSpec {
                name: "greeting".into(),
                default: Some(json!("hej")),
                ..ParameterSpec::default()
            }],
            ..spec("echo {{greeting}}")
        };
        let out = r.execute(AskLevel::None, &f, "{}").await.unwrap();
        assert_eq!(out.output, "hej");
    }

    #[tokio::test]
    async fn stdin_template_is_piped_to_the_command() {
        let r = runner(ScriptedIo::approving());
        let f = FunctionSpec {
            stdin: Some("from {{who}}".into()),
            parameters: vec![ParameterSpec {
                name: "who".into(),
                ..ParameterSpec::default()
            }],
            ..spec("cat")
        };
        let out = r
            .execute(AskLevel::None, &f, r#"{"who":"stdin"}"#)
            .await
            .unwrap();
        assert_eq!(out.output, "from stdin");
        assert_eq!(out.stdin, "from stdin");
    }

    #[tokio::test]
    async fn pwd_template_sets_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let canonical = dir.path().canonicalize().unwrap();
        let r = runner(ScriptedIo::approving());
        let f = FunctionSpec {
            pwd: Some(canonical.to_string_lossy().into_owned()),
            ..spec("pwd")
        };
        let out = r.execute(AskLevel::None, &f, "{}").await.unwrap();
        assert_eq!(out.output, canonical.to_string_lossy());
    }

    #[tokio::test]
    async fn pwd_template_expands_env_vars() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("ELSA_TEST_WORKDIR", dir.path().canonicalize().unwrap());
        let r = runner(ScriptedIo::approving());
        let f = FunctionSpec {
            pwd: Some("$ELSA_TEST_WORKDIR".into()),
            ..spec("pwd")
        };
        let out = r.execute(AskLevel::None, &f, "{}").await.unwrap();
        assert_eq!(
            out.output,
            dir.path().canonicalize().unwrap().to_string_lossy()
        );
    }

    #[tokio::test]
    async fn banner_is_shown_before_execution_with_params_resolved() {
        let io = ScriptedIo::approving();
        let r = runner(io.clone());
        let f = FunctionSpec {
            banner: Some("about to greet {{who}}".into()),
            parameters: vec![ParameterSpec {
                name: "who".into(),
                ..ParameterSpec::default()
            }],
            ..spec("echo hi")
        };
        r.execute(AskLevel::None, &f, r#"{"who":"world"}"#)
            .await
            .unwrap();
        let banners = io.banners.lock().unwrap();
        assert_eq!(banners.as_slice(), ["about to greet world"]);
    }

    // ── Validation errors ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn malformed_json_arguments_is_hard_error() {
        let r = runner(ScriptedIo::approving());
        let err = r
            .execute(AskLevel::None, &spec("echo hi"), "{not json")
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("invalid JSON arguments"));
    }

    #[tokio::test]
    async fn non_object_arguments_is_hard_error() {
        let r = runner(ScriptedIo::approving());
        let err = r
            .execute(AskLevel::None, &spec("echo hi"), "[1,2]")
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("must be a JSON object"));
    }

    #[tokio::test]
    async fn missing_required_parameters_are_listed() {
        let r = runner(ScriptedIo::approving());
        let f = FunctionSpec {
            parameters: vec![
                ParameterSpec {
                    name: "a".into(),
                    required: true,
                    ..ParameterSpec::default()
                },
                ParameterSpec {
                    name: "b".into(),
                    required: true,
                    ..ParameterSpec::default()
                },
            ],
            ..spec("echo {{a}} {{b}}")
        };
        let err = r.execute(AskLevel::None, &f, "{}").await.unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("missing required parameters"));
        assert!(msg.contains("a, b"));
    }

    #[tokio::test]
    async fn null_required_parameter_counts_as_missing() {
        let r = runner(ScriptedIo::approving());
        let f = FunctionSpec {
            parameters: vec![ParameterSpec {
                name: "a".into(),
                required: true,
                ..ParameterSpec::default()
            }],
            ..spec("echo {{a}}")
        };
        let err = r
            .execute(AskLevel::None, &f, r#"{"a":null}"#)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("missing required parameters: a"));
    }

    // ── Execution errors ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn timeout_kills_and_reports_with_command() {
        let r = runner(ScriptedIo::approving());
        let f = FunctionSpec {
            timeout: 1,
            ..spec("sleep 5")
        };
        let err = r.execute(AskLevel::None, &f, "{}").await.unwrap_err();
        assert_eq!(
            format!("{err}"),
            "command timed out after 1 seconds: sleep 5"
        );
    }

    #[tokio::test]
    async fn nonzero_exit_error_includes_command_and_output() {
        let r = runner(ScriptedIo::approving());
        let err = r
            .execute(AskLevel::None, &spec("echo broken; exit 2"), "{}")
            .await
            .unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("exit status 2"));
        assert!(msg.contains("echo broken; exit 2"));
        assert!(msg.contains("broken"));
    }

    // ── Safety gate ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn denial_returns_message_without_executing() {
        let marker = tempfile::tempdir().unwrap();
        let touched = marker.path().join("ran");
        let io = ScriptedIo::denying("not now");
        let r = runner(io);
        let f = FunctionSpec {
            safe: false,
            ..spec(&format!("touch {}", touched.display()))
        };
        let out = r.execute(AskLevel::Unsafe, &f, "{}").await.unwrap();
        assert!(!out.approved);
        assert_eq!(out.output, "Message from user: not now");
        assert!(!touched.exists(), "denied command must not run");
    }

    #[tokio::test]
    async fn safe_function_skips_prompt_at_unsafe_level() {
        // A denying IO that is never consulted cannot deny.
        let io = ScriptedIo::denying("should not be asked");
        let r = runner(io);
        let out = r
            .execute(AskLevel::Unsafe, &spec("echo quiet"), "{}")
            .await
            .unwrap();
        assert!(out.approved);
        assert_eq!(out.output, "quiet");
    }
}
