// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Template engine for command, stdin, working-directory, banner and
//! system-prompt strings.
//!
//! Three block kinds, all delimited by `{{` and `}}`:
//!
//! - `{{name}}`    — parameter substitution from the JSON argument map
//! - `{{$cmd}}`    — `cmd` runs under `sh -c` at render time; combined
//!                   output, trailing whitespace trimmed, is substituted
//! - `{{#prompt}}` — `prompt` is shown to the operator; the multi-line
//!                   answer (terminated by a blank line) is substituted
//!
//! Ordering differs per template kind: command templates run shell blocks
//! first and parameters second (shell output may itself contain parameter
//! blocks); banner and stdin templates run parameters first so they can
//! reflect already-resolved values.  A shell failure substitutes an inline
//! `Error: …` string and never aborts the render.

use elsa_config::ParameterSpec;
use serde_json::{Map, Value};
use tracing::debug;

use crate::OperatorIo;

/// Parameter declarations plus the JSON argument map for one render.
#[derive(Clone, Copy)]
pub struct RenderInputs<'a> {
    pub params: &'a [ParameterSpec],
    pub args: &'a Map<String, Value>,
}

/// Render a command template: shell and prompt blocks first, parameters
/// second, then whitespace runs left by elided parameters collapse to
/// single spaces.
pub async fn render_command(
    template: &str,
    inputs: RenderInputs<'_>,
    io: &dyn OperatorIo,
) -> String {
    let s = expand_effect_blocks(template, io).await;
    let s = expand_param_blocks(&s, inputs);
    collapse_spaces(&s)
}

/// Render a prose template (banner, stdin, working directory, system
/// prompt): parameters first, shell and prompt blocks second.
pub async fn render_prose(
    template: &str,
    inputs: RenderInputs<'_>,
    io: &dyn OperatorIo,
) -> String {
    let s = expand_param_blocks(template, inputs);
    expand_effect_blocks(&s, io).await
}

// ─── Block scanning ───────────────────────────────────────────────────────────

enum Seg<'a> {
    Literal(&'a str),
    Block(&'a str),
}

/// Split `s` into literal runs and `{{…}}` block interiors.  An unclosed
/// `{{` is treated as literal text.
fn split_blocks(s: &str) -> Vec<Seg<'_>> {
    let mut segs = Vec::new();
    let mut rest = s;
    while let Some(start) = rest.find("{{") {
        match rest[start + 2..].find("}}") {
            Some(len) => {
                segs.push(Seg::Literal(&rest[..start]));
                segs.push(Seg::Block(&rest[start + 2..start + 2 + len]));
                rest = &rest[start + 2 + len + 2..];
            }
            None => break,
        }
    }
    segs.push(Seg::Literal(rest));
    segs
}

/// Resolve shell (`$`) and prompt (`#`) blocks; parameter blocks pass
/// through untouched.
async fn expand_effect_blocks(s: &str, io: &dyn OperatorIo) -> String {
    let mut out = String::with_capacity(s.len());
    for seg in split_blocks(s) {
        match seg {
            Seg::Literal(text) => out.push_str(text),
            Seg::Block(inner) => {
                if let Some(cmd) = inner.strip_prefix('$') {
                    out.push_str(&run_shell_block(cmd).await);
                } else if let Some(prompt) = inner.strip_prefix('#') {
                    out.push_str(&io.read_block(prompt).await);
                } else {
                    out.push_str("{{");
                    out.push_str(inner);
                    out.push_str("}}");
                }
            }
        }
    }
    out
}

/// Resolve parameter blocks; shell and prompt blocks pass through
/// untouched.  Unknown names substitute to empty so no `{{…}}` artefacts
/// survive a full render.
fn expand_param_blocks(s: &str, inputs: RenderInputs<'_>) -> String {
    let mut out = String::with_capacity(s.len());
    for seg in split_blocks(s) {
        match seg {
            Seg::Literal(text) => out.push_str(text),
            Seg::Block(inner) => {
                if inner.starts_with('$') || inner.starts_with('#') {
                    out.push_str("{{");
                    out.push_str(inner);
                    out.push_str("}}");
                    continue;
                }
                let name = inner.trim();
                let spec = inputs.params.iter().find(|p| p.name == name);
                let value = inputs.args.get(name);
                out.push_str(&render_value(
                    spec.and_then(|p| p.format.as_deref()),
                    value,
                ));
            }
        }
    }
    out
}

/// Run one embedded shell block.  Never fails the render: errors become an
/// inline `Error: …` substitution.
async fn run_shell_block(cmd: &str) -> String {
    debug!(cmd, "running template shell block");
    match tokio::process::Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .output()
        .await
    {
        Ok(out) if out.status.success() => {
            let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&out.stderr));
            text.trim_end().to_string()
        }
        Ok(out) => format!("Error: exit status {}", out.status.code().unwrap_or(-1)),
        Err(e) => format!("Error: {e}"),
    }
}

// ─── Value rendering ──────────────────────────────────────────────────────────

/// Render one parameter value according to its declared format.
///
/// - no format           → default string coercion
/// - format with a `%`   → printf-style single-argument formatting
/// - any other format    → boolean-like toggle: truthy value yields the
///   literal format string, falsy yields empty
///
/// A missing or null value always renders empty.
fn render_value(format: Option<&str>, value: Option<&Value>) -> String {
    let value = match value {
        Some(v) if !v.is_null() => v,
        _ => return String::new(),
    };
    match format {
        Some(f) if !f.is_empty() => {
            if f.contains('%') {
                percent_format(f, value)
            } else if truthy(value) {
                f.to_string()
            } else {
                String::new()
            }
        }
        _ => coerce(value),
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn coerce(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Apply a printf-style format containing a single `%` directive.
fn percent_format(fmt: &str, v: &Value) -> String {
    let pos = match fmt.find('%') {
        Some(p) => p,
        None => return coerce(v),
    };
    let directive = fmt[pos + 1..].chars().next();
    let rendered = match directive {
        Some('d') | Some('i') => v
            .as_i64()
            .or_else(|| v.as_f64().map(|f| f as i64))
            .map(|n| n.to_string())
            .unwrap_or_else(|| coerce(v)),
        Some('f') => v
            .as_f64()
            .map(|f| f.to_string())
            .unwrap_or_else(|| coerce(v)),
        _ => coerce(v),
    };
    let tail_start = pos + 1 + directive.map(|c| c.len_utf8()).unwrap_or(0);
    format!("{}{}{}", &fmt[..pos], rendered, &fmt[tail_start..])
}

/// Collapse runs of spaces and tabs to a single space and trim the ends.
/// Newlines survive so multi-line stdin payloads keep their shape.
fn collapse_spaces(s: &str) -> String {
    let re = regex::Regex::new(r"[ \t]{2,}").unwrap();
    re.replace_all(s, " ").trim().to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use elsa_config::ParamType;
    use serde_json::json;

    use super::*;
    use crate::Confirmation;

    /// OperatorIo whose prompt blocks answer with a fixed string.
    struct FixedIo(&'static str);

    #[async_trait]
    impl OperatorIo for FixedIo {
        async fn confirm(&self, _prompt: &str) -> Confirmation {
            Confirmation::approved()
        }
        async fn read_block(&self, _prompt: &str) -> String {
            self.0.to_string()
        }
        fn show(&self, _text: &str) {}
    }

    fn param(name: &str, format: Option<&str>) -> ParameterSpec {
        ParameterSpec {
            name: name.into(),
            param_type: ParamType::String,
            format: format.map(str::to_string),
            ..ParameterSpec::default()
        }
    }

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    async fn cmd(template: &str, params: &[ParameterSpec], a: &Map<String, Value>) -> String {
        render_command(template, RenderInputs { params, args: a }, &FixedIo("")).await
    }

    // ── Parameter blocks ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn substitutes_string_parameter() {
        let p = [param("pat", None)];
        let a = args(json!({"pat": "foo"}));
        assert_eq!(cmd("grep {{pat}} .", &p, &a).await, "grep foo .");
    }

    #[tokio::test]
    async fn missing_optional_renders_empty_and_collapses() {
        let p = [param("recursive", Some("-r")), param("pat", None)];
        let a = args(json!({"pat": "foo"}));
        let rendered = cmd("grep {{recursive}} {{pat}} .", &p, &a).await;
        assert_eq!(rendered, "grep foo .");
        assert!(!rendered.contains("{{"), "no artefacts may survive");
    }

    #[tokio::test]
    async fn boolean_toggle_true_yields_format_string() {
        let p = [param("recursive", Some("-r")), param("pat", None)];
        let a = args(json!({"recursive": true, "pat": "foo"}));
        assert_eq!(
            cmd("grep -r {{recursive}} {{pat}} .", &p, &a).await,
            "grep -r -r foo ."
        );
    }

    #[tokio::test]
    async fn boolean_toggle_false_yields_empty() {
        let p = [param("recursive", Some("-r")), param("pat", None)];
        let a = args(json!({"recursive": false, "pat": "foo"}));
        assert_eq!(
            cmd("grep -r {{recursive}} {{pat}} .", &p, &a).await,
            "grep -r foo ."
        );
    }

    #[tokio::test]
    async fn literal_boolean_format_follows_toggle_rule() {
        let p = [param("flag", Some("boolean"))];
        let a_true = args(json!({"flag": true}));
        let a_false = args(json!({"flag": false}));
        assert_eq!(cmd("x {{flag}}", &p, &a_true).await, "x boolean");
        assert_eq!(cmd("x {{flag}}", &p, &a_false).await, "x");
    }

    #[tokio::test]
    async fn percent_d_formats_integer() {
        let p = [param("depth", Some("--depth=%d"))];
        let a = args(json!({"depth": 3}));
        assert_eq!(cmd("find . {{depth}}", &p, &a).await, "find . --depth=3");
    }

    #[tokio::test]
    async fn percent_s_formats_string() {
        let p = [param("branch", Some("--branch=%s"))];
        let a = args(json!({"branch": "main"}));
        assert_eq!(cmd("git clone {{branch}}", &p, &a).await, "git clone --branch=main");
    }

    #[tokio::test]
    async fn default_coercion_of_number_and_bool() {
        let p = [param("n", None), param("b", None)];
        let a = args(json!({"n": 42, "b": true}));
        assert_eq!(cmd("x {{n}} {{b}}", &p, &a).await, "x 42 true");
    }

    #[tokio::test]
    async fn undeclared_block_name_renders_empty() {
        let a = args(json!({}));
        assert_eq!(cmd("echo {{mystery}} done", &[], &a).await, "echo done");
    }

    #[tokio::test]
    async fn null_value_renders_empty() {
        let p = [param("opt", None)];
        let a = args(json!({"opt": null}));
        assert_eq!(cmd("run {{opt}} now", &p, &a).await, "run now");
    }

    #[tokio::test]
    async fn unclosed_block_is_literal_text() {
        let a = args(json!({}));
        assert_eq!(cmd("echo {{oops", &[], &a).await, "echo {{oops");
    }

    // ── Shell blocks ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn shell_block_substitutes_trimmed_output() {
        let a = args(json!({}));
        assert_eq!(cmd("say {{$echo hi}} now", &[], &a).await, "say hi now");
    }

    #[tokio::test]
    async fn failing_shell_block_renders_inline_error() {
        let a = args(json!({}));
        let rendered = cmd("x {{$exit 3}} y", &[], &a).await;
        assert_eq!(rendered, "x Error: exit status 3 y");
    }

    #[tokio::test]
    async fn shell_block_captures_stderr_too() {
        let a = args(json!({}));
        let rendered = cmd("{{$echo oops >&2}}", &[], &a).await;
        assert_eq!(rendered, "oops");
    }

    #[tokio::test]
    async fn command_ordering_shell_output_may_contain_param_blocks() {
        // Shell runs first; its output is then subject to parameter
        // substitution (nested substitution).
        let p = [param("pat", None)];
        let a = args(json!({"pat": "foo"}));
        let rendered = cmd("grep {{$printf '{'; printf '{pat}'; printf '}'}} .", &p, &a).await;
        assert_eq!(rendered, "grep foo .");
    }

    #[tokio::test]
    async fn prose_ordering_params_resolve_before_shell() {
        // Banner ordering: the parameter is resolved first, the shell block
        // second, so the banner reflects the resolved value.
        let p = [param("pat", None)];
        let a = args(json!({"pat": "foo"}));
        let io = FixedIo("");
        let rendered = render_prose(
            "searching {{pat}} at {{$printf when}}",
            RenderInputs { params: &p, args: &a },
            &io,
        )
        .await;
        assert_eq!(rendered, "searching foo at when");
    }

    #[tokio::test]
    async fn prose_does_not_collapse_whitespace() {
        let a = args(json!({}));
        let io = FixedIo("");
        let rendered = render_prose(
            "line one\n\nline  two",
            RenderInputs { params: &[], args: &a },
            &io,
        )
        .await;
        assert_eq!(rendered, "line one\n\nline  two");
    }

    // ── Prompt blocks ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn prompt_block_substitutes_operator_input() {
        let a = args(json!({}));
        let io = FixedIo("typed answer");
        let rendered = render_command(
            "use {{#what value?}} here",
            RenderInputs { params: &[], args: &a },
            &io,
        )
        .await;
        assert_eq!(rendered, "use typed answer here");
    }

    // ── Value helpers ─────────────────────────────────────────────────────────

    #[test]
    fn truthy_rules() {
        assert!(truthy(&json!(true)));
        assert!(!truthy(&json!(false)));
        assert!(!truthy(&json!(0)));
        assert!(truthy(&json!(1)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!("false")));
        assert!(truthy(&json!("yes")));
        assert!(!truthy(&json!([])));
        assert!(truthy(&json!(["x"])));
    }

    #[test]
    fn coerce_array_is_compact_json() {
        assert_eq!(coerce(&json!(["a", "b"])), r#"["a","b"]"#);
    }

    #[test]
    fn collapse_preserves_newlines() {
        assert_eq!(collapse_spaces("a  b\nc   d"), "a b\nc d");
    }
}
