//! Executor handoff: request text, child environment, result display.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use minijinja::{Environment as Templates, context};
use serde::Serialize;
use serde_json::Value;

use crate::core::document::ConfigurationDocument;
use crate::core::types::RunEnvironment;
use crate::io::config::LlmSettings;
use crate::io::env_store::Environment;

const REQUEST_TEMPLATE: &str = include_str!("prompts/request.md");

/// List items shown in full up to this length.
const LIST_SHOW_ALL: usize = 5;
/// Items shown for longer lists.
const LIST_PREVIEW: usize = 3;

#[derive(Debug, Serialize)]
struct ProviderContext {
    name: String,
    params: Vec<ParamContext>,
}

#[derive(Debug, Serialize)]
struct ParamContext {
    name: String,
    value: String,
}

/// Template engine wrapper around minijinja.
struct RequestEngine {
    templates: Templates<'static>,
}

impl RequestEngine {
    fn new() -> Self {
        let mut templates = Templates::new();
        templates
            .add_template("request", REQUEST_TEMPLATE)
            .expect("request template should be valid");
        Self { templates }
    }

    fn render(&self, document: &ConfigurationDocument) -> Result<String> {
        let providers: Vec<ProviderContext> = document
            .runtime
            .iter()
            .map(|(name, params)| ProviderContext {
                name: name.clone(),
                params: params
                    .iter()
                    .map(|(key, value)| ParamContext {
                        name: key.clone(),
                        value: scalar_text(value),
                    })
                    .collect(),
            })
            .collect();
        let template = self.templates.get_template("request")?;
        let mut rendered = template.render(context! {
            task => document.task.natural_language.trim(),
            providers => providers,
        })?;
        rendered.push('\n');
        Ok(rendered)
    }
}

/// Request text for a validated document: task plus its runtime parameters.
pub fn render_request(document: &ConfigurationDocument) -> Result<String> {
    RequestEngine::new().render(document)
}

/// Request text for a bare task description.
pub fn raw_request(text: &str) -> String {
    let mut request = text.trim().to_string();
    request.push('\n');
    request
}

/// Complete child environment for the executor.
///
/// Starts from the live environment and adds the backend location, the run
/// environment and, when the document was saved, its path.
pub fn handoff_env(
    env: &Environment,
    llm: &LlmSettings,
    environment: RunEnvironment,
    config_path: Option<&Path>,
) -> BTreeMap<String, String> {
    let mut vars = env.vars().clone();
    let base_url = env.value("OLLAMA_BASE_URL").unwrap_or(&llm.base_url).to_string();
    let model = env.value("OLLAMA_MODEL").unwrap_or(&llm.model).to_string();
    vars.insert("OLLAMA_BASE_URL".to_string(), base_url);
    vars.insert("OLLAMA_MODEL".to_string(), model);
    vars.insert("DUNE_ENVIRONMENT".to_string(), environment.to_string());
    if let Some(path) = config_path {
        vars.insert("DUNE_CONFIG".to_string(), path.display().to_string());
    }
    vars
}

/// Display lines for executor stdout.
///
/// A JSON object is summarized per key (lists as a count plus a preview);
/// anything else is shown as is.
pub fn summarize_output(stdout: &str) -> Vec<String> {
    let object = match serde_json::from_str::<Value>(stdout.trim()) {
        Ok(Value::Object(object)) => object,
        _ => return stdout.trim_end().lines().map(str::to_string).collect(),
    };

    let mut lines = Vec::new();
    for (key, value) in &object {
        match value {
            Value::Array(items) => {
                lines.push(format!("{key}: {} items", items.len()));
                let shown = if items.len() <= LIST_SHOW_ALL {
                    items.len()
                } else {
                    LIST_PREVIEW
                };
                lines.extend(items[..shown].iter().map(|item| format!("  - {}", scalar_text(item))));
                if shown < items.len() {
                    lines.push(format!("  ... and {} more", items.len() - shown));
                }
            }
            other => lines.push(format!("{key}: {}", scalar_text(other))),
        }
    }
    lines
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::imap_document;

    #[test]
    fn request_lists_runtime_parameters() {
        let doc = imap_document("weekly-report");
        let rendered = render_request(&doc).expect("render");
        assert_eq!(
            rendered,
            "Pobierz wszystkie wiadomości email ze skrzynki IMAP\n\nConfigured capabilities:\n- imap_fetcher\n  - mailbox: INBOX\n"
        );
    }

    #[test]
    fn request_without_runtime_is_the_task_alone() {
        let mut doc = imap_document("weekly-report");
        doc.runtime.clear();
        assert_eq!(
            render_request(&doc).expect("render"),
            "Pobierz wszystkie wiadomości email ze skrzynki IMAP\n"
        );
    }

    #[test]
    fn handoff_env_prefers_environment_over_settings() {
        let env = Environment::from_vars([("OLLAMA_MODEL", "llama3"), ("DUNE_MAILBOX", "INBOX")]);
        let vars = handoff_env(
            &env,
            &LlmSettings::default(),
            RunEnvironment::Testing,
            Some(Path::new("configs/weekly-report.yaml")),
        );
        assert_eq!(vars["OLLAMA_MODEL"], "llama3");
        assert_eq!(vars["OLLAMA_BASE_URL"], "http://localhost:11434");
        assert_eq!(vars["DUNE_ENVIRONMENT"], "testing");
        assert_eq!(vars["DUNE_CONFIG"], "configs/weekly-report.yaml");
        assert_eq!(vars["DUNE_MAILBOX"], "INBOX");
    }

    #[test]
    fn summary_previews_long_lists() {
        let lines = summarize_output(r#"{"files": [1, 2, 3, 4, 5, 6], "status": "ok"}"#);
        assert_eq!(
            lines,
            vec![
                "files: 6 items",
                "  - 1",
                "  - 2",
                "  - 3",
                "  ... and 3 more",
                "status: ok",
            ]
        );
    }

    #[test]
    fn summary_passes_plain_text_through() {
        assert_eq!(summarize_output("saved 12 messages\n"), vec!["saved 12 messages"]);
    }
}
