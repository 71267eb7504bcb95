//! End-to-end pipeline runs over a temp working directory with a scripted
//! operator and a recording executor.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use dune::builder::ConfigurationBuilder;
use dune::core::types::{IssueKind, RunEnvironment};
use dune::error::DuneError;
use dune::io::config::DuneSettings;
use dune::io::env_store::{EnvStore, Environment};
use dune::mapper::CapabilityMapper;
use dune::pipeline::{LEGACY_TASK, Mode, PipelineOptions, RunOutcome, Session};
use dune::repair::RepairCoordinator;
use dune::resolver::{AutoDetector, EnvironmentResolver};
use dune::test_support::{
    RecordingExecutor, ScriptedPrompter, imap_document, temp_workspace, test_catalog,
};
use dune::validate::ConfigurationValidator;

const MAIL_TASK: &str = "Pobierz wszystkie wiadomości email ze skrzynki IMAP";

fn environment(root: &Path, vars: &[(&str, &str)]) -> Environment {
    Environment::from_vars(vars.iter().copied()).with_store(EnvStore::new(root.join(".env")))
}

fn session<'a>(
    root: &Path,
    env: Environment,
    options: PipelineOptions,
    prompter: &'a mut ScriptedPrompter,
    executor: &'a RecordingExecutor,
) -> Session<'a> {
    Session::new(
        root.to_path_buf(),
        DuneSettings::default(),
        test_catalog(),
        env,
        options,
        prompter,
    )
    .with_executor(Box::new(executor))
}

fn save_mail_document(root: &Path) -> std::path::PathBuf {
    let path = root.join("configs").join("weekly-report.yaml");
    ConfigurationBuilder::new(RunEnvironment::Development)
        .save(&imap_document("weekly-report"), &path)
        .expect("save");
    path
}

#[test]
fn scenario_a_empty_store_reports_both_missing_variables() {
    let temp = temp_workspace(None);
    let catalog = test_catalog();
    let validator = ConfigurationValidator::new(&catalog, temp.path());
    let env = environment(temp.path(), &[]);

    let verdict = validator.validate_pre_execution(&imap_document("weekly-report"), &env);

    assert!(!verdict.passed);
    let messages: Vec<&str> = verdict.errors.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(
        messages,
        vec![
            "missing environment variable: DUNE_MAILBOX",
            "missing environment variable: DUNE_PASSWORD",
        ]
    );
    assert!(verdict.errors.iter().all(|e| e.kind == IssueKind::MissingEnvironmentDependency));
    assert_eq!(
        validator.validate_pre_execution(&imap_document("weekly-report"), &env),
        verdict
    );
}

#[test]
fn scenario_b_repair_fixes_alternate_name_and_leaves_password() {
    let temp = temp_workspace(None);
    let catalog = test_catalog();
    let validator = ConfigurationValidator::new(&catalog, temp.path());
    let document = imap_document("weekly-report");
    let mut env = environment(temp.path(), &[("IMAP_MAILBOX", "INBOX")]);
    let before = validator.validate_pre_execution(&document, &env);
    let mut resolver = EnvironmentResolver::new(AutoDetector::new(temp.path(), BTreeMap::new()), 3);

    let outcome = RepairCoordinator::new(&mut resolver).repair(&before, &document, &mut env, None);

    assert!(outcome.any_fixed());
    assert_eq!(outcome.fixed.len(), 1);
    let after = validator.validate_pre_execution(&document, &env);
    assert_eq!(after.missing_dependencies(), vec!["DUNE_PASSWORD"]);
    assert!(after.errors.len() < before.errors.len());
    let stored = EnvStore::new(temp.path().join(".env")).load().expect("load");
    assert_eq!(stored.get("DUNE_MAILBOX").map(String::as_str), Some("INBOX"));
}

#[test]
fn scenario_c_mail_task_maps_to_imap_fetcher_with_credentials() {
    let catalog = test_catalog();
    let matches = CapabilityMapper::new(&catalog)
        .match_task("Pobierz wszystkie wiadomości email ze skrzynki i zapisz w folderach");

    assert_eq!(matches[0].provider.name, "imap_fetcher");
    let required: Vec<&str> = matches[0]
        .provider
        .required_params
        .iter()
        .map(|p| p.name.as_str())
        .collect();
    assert!(required.contains(&"mailbox"));
    assert!(required.contains(&"password"));
}

#[test]
fn scenario_d_second_save_differs_only_in_changed_fields() {
    let temp = temp_workspace(None);
    let path = save_mail_document(temp.path());
    let first = fs::read_to_string(&path).expect("read");

    let builder = ConfigurationBuilder::new(RunEnvironment::Development);
    let mut document = builder.load(&path).expect("load");
    builder.save(&document, &path).expect("save again");
    assert_eq!(fs::read_to_string(&path).expect("read"), first);

    document.runtime.get_mut("imap_fetcher").expect("provider").insert(
        "mailbox".to_string(),
        serde_json::Value::String("Archive".to_string()),
    );
    builder.save(&document, &path).expect("save changed");
    let second = fs::read_to_string(&path).expect("read");
    let changed: Vec<(&str, &str)> = first
        .lines()
        .zip(second.lines())
        .filter(|(a, b)| a != b)
        .collect();
    assert_eq!(changed.len(), 1);
    assert!(changed[0].1.contains("Archive"));
}

#[test]
fn interactive_run_configures_saves_and_executes() {
    let temp = temp_workspace(None);
    let executor = RecordingExecutor::succeeding(r#"{"messages": [1, 2], "status": "ok"}"#);
    let mut prompter = ScriptedPrompter::new([MAIL_TASK, "t", "INBOX", "", "t", "t"]);

    let outcome = {
        let env = environment(temp.path(), &[("IMAP_PASSWORD", "s3cret")]);
        let mut session = session(
            temp.path(),
            env,
            PipelineOptions::default(),
            &mut prompter,
            &executor,
        );
        session.run(Mode::Interactive).expect("run")
    };

    assert!(matches!(outcome, RunOutcome::Executed { .. }));
    assert_eq!(prompter.remaining(), 0);
    assert!(prompter.said_containing("1. imap_fetcher"));
    assert!(prompter.said_containing("messages: 2 items"));

    let stored = EnvStore::new(temp.path().join(".env")).load().expect("load");
    assert_eq!(stored["DUNE_MAILBOX"], "INBOX");
    assert_eq!(stored["DUNE_PASSWORD"], "s3cret");

    let requests = executor.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert!(request.request_text.starts_with(MAIL_TASK));
    assert!(request.request_text.contains("  - mailbox: INBOX"));
    assert_eq!(request.env["DUNE_ENVIRONMENT"], "development");
    assert_eq!(request.env["DUNE_PASSWORD"], "s3cret");

    let config_path = Path::new(&request.env["DUNE_CONFIG"]).to_path_buf();
    let saved = ConfigurationBuilder::new(RunEnvironment::Development)
        .load(&config_path)
        .expect("load saved");
    assert_eq!(saved.task.natural_language, MAIL_TASK);
    assert_eq!(
        saved.runtime["imap_fetcher"]["mailbox"],
        serde_json::json!("INBOX")
    );
    assert!(config_path.starts_with(temp.path().join("configs")));
}

#[test]
fn interactive_run_without_match_generates_nothing() {
    let temp = temp_workspace(None);
    let executor = RecordingExecutor::succeeding("");
    let mut prompter = ScriptedPrompter::new(["zrób mi kawę"]);

    let outcome = session(
        temp.path(),
        environment(temp.path(), &[]),
        PipelineOptions::default(),
        &mut prompter,
        &executor,
    )
    .run(Mode::Interactive)
    .expect("run");

    assert_eq!(outcome, RunOutcome::NoMatch);
    assert!(!temp.path().join("configs").exists());
    assert!(executor.requests().is_empty());
}

#[test]
fn declined_repair_reports_itemized_errors() {
    let temp = temp_workspace(None);
    let path = save_mail_document(temp.path());
    let executor = RecordingExecutor::succeeding("");
    let mut prompter = ScriptedPrompter::new(["n"]);

    let outcome = session(
        temp.path(),
        environment(temp.path(), &[]),
        PipelineOptions::default(),
        &mut prompter,
        &executor,
    )
    .run(Mode::Config(path))
    .expect("run");

    let RunOutcome::ValidationFailed { verdict } = outcome else {
        panic!("expected validation failure, got {outcome:?}");
    };
    assert_eq!(verdict.errors.len(), 2);
    assert!(prompter.said_containing("error: missing environment variable: DUNE_MAILBOX"));
    assert!(prompter.said_containing("error: missing environment variable: DUNE_PASSWORD"));
    assert!(prompter.asked()[0].starts_with("Try to repair"));
    assert!(executor.requests().is_empty());
}

#[test]
fn accepted_repair_prompts_and_then_executes() {
    let temp = temp_workspace(None);
    let path = save_mail_document(temp.path());
    let executor = RecordingExecutor::succeeding("done");
    let mut prompter = ScriptedPrompter::new(["t", "s3cret"]);

    let outcome = session(
        temp.path(),
        environment(temp.path(), &[("IMAP_MAILBOX", "INBOX")]),
        PipelineOptions::default(),
        &mut prompter,
        &executor,
    )
    .run(Mode::Config(path))
    .expect("run");

    assert!(matches!(outcome, RunOutcome::Executed { .. }));
    assert_eq!(prompter.asked()[1], "DUNE_PASSWORD (required): ");
    assert_eq!(executor.requests()[0].env["DUNE_PASSWORD"], "s3cret");
}

#[test]
fn auto_configure_repairs_without_asking_and_stops_when_stuck() {
    let temp = temp_workspace(None);
    let path = save_mail_document(temp.path());
    let executor = RecordingExecutor::succeeding("");
    let mut prompter = ScriptedPrompter::new(Vec::<String>::new());
    let options = PipelineOptions {
        auto_configure: true,
        ..PipelineOptions::default()
    };

    let outcome = session(
        temp.path(),
        environment(temp.path(), &[("IMAP_FOLDER", "Work")]),
        options,
        &mut prompter,
        &executor,
    )
    .run(Mode::Config(path))
    .expect("run");

    let RunOutcome::ValidationFailed { verdict } = outcome else {
        panic!("expected validation failure, got {outcome:?}");
    };
    assert_eq!(verdict.missing_dependencies(), vec!["DUNE_PASSWORD"]);
    assert!(prompter.asked().is_empty());
    let stored = EnvStore::new(temp.path().join(".env")).load().expect("load");
    assert_eq!(stored["DUNE_MAILBOX"], "Work");
}

#[test]
fn validate_only_never_executes_and_records_verdict() {
    let temp = temp_workspace(None);
    let path = save_mail_document(temp.path());
    let target = temp.path().join("checked.yaml");
    let executor = RecordingExecutor::succeeding("");
    let mut prompter = ScriptedPrompter::new(Vec::<String>::new());
    let options = PipelineOptions {
        validate_only: true,
        save_config: Some(target.clone()),
        ..PipelineOptions::default()
    };

    let outcome = session(
        temp.path(),
        environment(
            temp.path(),
            &[("DUNE_MAILBOX", "INBOX"), ("DUNE_PASSWORD", "s3cret")],
        ),
        options,
        &mut prompter,
        &executor,
    )
    .run(Mode::Config(path))
    .expect("run");

    assert!(matches!(outcome, RunOutcome::Validated { .. }));
    assert!(executor.requests().is_empty());
    let saved = ConfigurationBuilder::new(RunEnvironment::Development)
        .load(&target)
        .expect("load");
    assert_eq!(saved.name(), "checked");
    let verdict = saved
        .validation
        .and_then(|section| section.last_verdict)
        .expect("last verdict");
    assert!(verdict.passed);
}

#[test]
fn malformed_configuration_is_an_error() {
    let temp = temp_workspace(None);
    let path = temp.path().join("broken.yaml");
    fs::write(&path, "metadata:\n  name: broken\ntask:\n  natural_language: ''\n").expect("write");
    let executor = RecordingExecutor::succeeding("");
    let mut prompter = ScriptedPrompter::new(Vec::<String>::new());

    let err = session(
        temp.path(),
        environment(temp.path(), &[]),
        PipelineOptions::default(),
        &mut prompter,
        &executor,
    )
    .run(Mode::Config(path))
    .unwrap_err();

    assert!(DuneError::malformed_problems(&err).is_some());
    assert!(!DuneError::is_interrupted(&err));
}

#[test]
fn executor_failure_is_an_error() {
    let temp = temp_workspace(None);
    let executor = RecordingExecutor::failing(2, "backend unreachable");
    let mut prompter = ScriptedPrompter::new(Vec::<String>::new());

    let err = session(
        temp.path(),
        environment(temp.path(), &[]),
        PipelineOptions::default(),
        &mut prompter,
        &executor,
    )
    .run(Mode::Quick("wyślij raport".to_string()))
    .unwrap_err();

    assert!(format!("{err:#}").contains("exit code Some(2)"));
    assert!(prompter.said_containing("backend unreachable"));
}

#[test]
fn quick_auto_configure_persists_detected_defaults() {
    let temp = temp_workspace(None);
    let executor = RecordingExecutor::succeeding("plain output");
    let mut prompter = ScriptedPrompter::new(Vec::<String>::new());
    let options = PipelineOptions {
        auto_configure: true,
        ..PipelineOptions::default()
    };

    let outcome = session(
        temp.path(),
        environment(temp.path(), &[("DUNE_LOG_LEVEL", "DEBUG")]),
        options,
        &mut prompter,
        &executor,
    )
    .run(Mode::Quick("  przetwórz pliki csv  ".to_string()))
    .expect("run");

    assert!(matches!(outcome, RunOutcome::Executed { .. }));
    let stored = EnvStore::new(temp.path().join(".env")).load().expect("load");
    assert_eq!(
        stored,
        BTreeMap::from([("DUNE_OUTPUT_DIR".to_string(), "./output".to_string())])
    );
    let request = &executor.requests()[0];
    assert_eq!(request.request_text, "przetwórz pliki csv\n");
    assert!(!request.env.contains_key("DUNE_CONFIG"));
    assert!(prompter.said_containing("plain output"));
}

#[test]
fn exhausted_repair_prompt_is_shown_to_operator() {
    let temp = temp_workspace(None);
    let path = save_mail_document(temp.path());
    let executor = RecordingExecutor::succeeding("");
    let mut prompter = ScriptedPrompter::new(["t", "", "", ""]);

    let outcome = session(
        temp.path(),
        environment(temp.path(), &[]),
        PipelineOptions::default(),
        &mut prompter,
        &executor,
    )
    .run(Mode::Config(path))
    .expect("run");

    assert!(matches!(outcome, RunOutcome::ValidationFailed { .. }));
    assert!(prompter.said_containing("Repaired 0 problem(s)."));
    assert!(prompter.said_containing("warning: DUNE_MAILBOX left unresolved after 3 attempt(s)"));
    assert!(executor.requests().is_empty());
}

#[test]
fn quick_run_without_match_saves_and_validates_nothing() {
    let temp = temp_workspace(None);
    let target = temp.path().join("coffee.yaml");
    let executor = RecordingExecutor::succeeding("");
    let mut prompter = ScriptedPrompter::new(Vec::<String>::new());
    let options = PipelineOptions {
        validate_only: true,
        save_config: Some(target.clone()),
        ..PipelineOptions::default()
    };

    let outcome = session(
        temp.path(),
        environment(temp.path(), &[]),
        options,
        &mut prompter,
        &executor,
    )
    .run(Mode::Quick("zrób mi kawę".to_string()))
    .expect("run");

    assert_eq!(outcome, RunOutcome::NoMatch);
    assert!(!target.exists());
    assert!(prompter.said_containing("No matching capability providers"));
    assert!(!prompter.said_containing("Environment is configured correctly."));
    assert!(executor.requests().is_empty());
}

#[test]
fn quick_run_without_match_still_hands_off_raw_text() {
    let temp = temp_workspace(None);
    let executor = RecordingExecutor::succeeding("");
    let mut prompter = ScriptedPrompter::new(Vec::<String>::new());

    let outcome = session(
        temp.path(),
        environment(temp.path(), &[]),
        PipelineOptions::default(),
        &mut prompter,
        &executor,
    )
    .run(Mode::Quick("zrób mi kawę".to_string()))
    .expect("run");

    assert!(matches!(outcome, RunOutcome::Executed { .. }));
    assert!(prompter.said_containing("No matching capability providers"));
    assert_eq!(executor.requests()[0].request_text, "zrób mi kawę\n");
}

#[test]
fn menu_retries_invalid_choice_then_runs_legacy() {
    let temp = temp_workspace(None);
    let executor = RecordingExecutor::succeeding("");
    let mut prompter = ScriptedPrompter::new(["9", "4"]);

    let outcome = session(
        temp.path(),
        environment(temp.path(), &[]),
        PipelineOptions::default(),
        &mut prompter,
        &executor,
    )
    .run(Mode::Menu)
    .expect("run");

    assert!(matches!(outcome, RunOutcome::Executed { .. }));
    assert!(prompter.said_containing("Invalid choice."));
    assert!(executor.requests()[0].request_text.starts_with(LEGACY_TASK));
}

#[test]
fn end_of_input_at_menu_is_an_interrupt() {
    let temp = temp_workspace(None);
    let executor = RecordingExecutor::succeeding("");
    let mut prompter = ScriptedPrompter::new(["2", "missing.yaml"]);

    let err = session(
        temp.path(),
        environment(temp.path(), &[]),
        PipelineOptions::default(),
        &mut prompter,
        &executor,
    )
    .run(Mode::Menu)
    .unwrap_err();

    assert!(DuneError::is_interrupted(&err));
    assert!(prompter.said_containing("File does not exist."));
}
