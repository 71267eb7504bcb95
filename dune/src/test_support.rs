//! Test-only fixtures: a small catalog, documents, scripted operators and a
//! recording executor.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fs;

use anyhow::Result;
use serde_json::Value;

use crate::core::catalog::{Catalog, CapabilityProvider, ParamCheck, ParameterSpec};
use crate::core::document::ConfigurationDocument;
use crate::io::config::SETTINGS_FILE;
use crate::io::executor::{ExecutionReport, ExecutionRequest, Executor};
use crate::io::prompt::Prompter;

/// Plain parameter with prompt `"<name>?"`.
pub fn param(name: &str, default: Option<&str>) -> ParameterSpec {
    ParameterSpec {
        name: name.to_string(),
        prompt: format!("{name}?"),
        default: default.map(str::to_string),
        check: None,
        secret: false,
    }
}

pub fn secret_param(name: &str) -> ParameterSpec {
    ParameterSpec {
        secret: true,
        ..param(name, None)
    }
}

pub fn provider(
    name: &str,
    keywords: &[(&str, u32)],
    required: Vec<ParameterSpec>,
    optional: Vec<ParameterSpec>,
) -> CapabilityProvider {
    CapabilityProvider {
        name: name.to_string(),
        package: format!("dune_providers.{name}"),
        description: format!("{name} test provider"),
        keywords: keywords
            .iter()
            .map(|(keyword, weight)| (keyword.to_string(), *weight))
            .collect(),
        required_params: required,
        optional_params: optional,
        outputs: Vec::new(),
    }
}

/// Three providers: `imap_fetcher`, `csv_processor`, `pdf_extractor`.
pub fn test_catalog() -> Catalog {
    let mut imap = provider(
        "imap_fetcher",
        &[
            ("imap", 3),
            ("email", 2),
            ("wiadomo", 2),
            ("skrzyn", 2),
            ("poczt", 2),
        ],
        vec![param("mailbox", None), secret_param("password")],
        vec![param("imap_server", Some("imap.example.com"))],
    );
    imap.outputs = vec!["${DUNE_OUTPUT_DIR}/mail".to_string()];

    let mut delimiter = param("delimiter", Some(","));
    delimiter.check = Some(ParamCheck::OneOf(vec![",".to_string(), ";".to_string()]));
    let csv = provider(
        "csv_processor",
        &[("csv", 3), ("raport", 2), ("tabel", 2)],
        vec![param("input_file", None)],
        vec![delimiter],
    );

    let pdf = provider(
        "pdf_extractor",
        &[("pdf", 3), ("faktur", 2)],
        vec![param("input_dir", None)],
        Vec::new(),
    );

    Catalog::new(vec![imap, csv, pdf]).expect("test catalog should be valid")
}

/// Saved-shape document for the mail task with `mailbox = INBOX`.
pub fn imap_document(name: &str) -> ConfigurationDocument {
    let mut document = ConfigurationDocument::new(
        name,
        "Pobierz wszystkie wiadomości email ze skrzynki IMAP",
    );
    document.merge_runtime(
        "imap_fetcher",
        BTreeMap::from([("mailbox".to_string(), Value::String("INBOX".to_string()))]),
    );
    document
}

/// Temp working directory, with `settings` written to `dune.toml` when given.
pub fn temp_workspace(settings: Option<&str>) -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    if let Some(settings) = settings {
        fs::write(temp.path().join(SETTINGS_FILE), settings).expect("write settings");
    }
    temp
}

/// Prompter answering from a script; end of input once the script runs out.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    asked: Vec<String>,
    said: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn asked(&self) -> &[String] {
        &self.asked
    }

    pub fn said(&self) -> &[String] {
        &self.said
    }

    /// True when some shown message contains `needle`.
    pub fn said_containing(&self, needle: &str) -> bool {
        self.said.iter().any(|line| line.contains(needle))
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&mut self, question: &str) -> Result<Option<String>> {
        self.asked.push(question.to_string());
        Ok(self.answers.pop_front())
    }

    fn say(&mut self, message: &str) -> Result<()> {
        self.said.push(message.to_string());
        Ok(())
    }
}

/// Executor that records requests and replies with a fixed report.
#[derive(Debug)]
pub struct RecordingExecutor {
    report: ExecutionReport,
    requests: RefCell<Vec<ExecutionRequest>>,
}

impl RecordingExecutor {
    /// Successful run printing `stdout`.
    pub fn succeeding(stdout: &str) -> Self {
        Self::with_report(ExecutionReport {
            exit_code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
            timed_out: false,
        })
    }

    pub fn failing(exit_code: i32, stderr: &str) -> Self {
        Self::with_report(ExecutionReport {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.to_string(),
            timed_out: false,
        })
    }

    pub fn with_report(report: ExecutionReport) -> Self {
        Self {
            report,
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ExecutionRequest> {
        self.requests.borrow().clone()
    }
}

impl Executor for RecordingExecutor {
    fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionReport> {
        self.requests.borrow_mut().push(request.clone());
        Ok(self.report.clone())
    }
}
