//! Run modes wiring mapper, resolver, builder, validator and repair together.
//!
//! A [`Session`] owns the per-run state (settings, catalog, environment,
//! resolver) and talks to the operator through a [`Prompter`]. Every mode
//! ends in a [`RunOutcome`]; errors are reserved for unhandled failures and
//! for [`DuneError::Interrupted`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument, warn};

use crate::builder::ConfigurationBuilder;
use crate::core::catalog::{Catalog, CapabilityProvider, collect_dependencies};
use crate::core::document::ConfigurationDocument;
use crate::core::types::{RunEnvironment, ValidationVerdict};
use crate::error::DuneError;
use crate::io::catalog_store::load_catalog;
use crate::io::config::{DuneSettings, SETTINGS_FILE, load_settings};
use crate::io::env_store::{EnvStore, Environment};
use crate::io::executor::{CommandExecutor, ExecutionReport, ExecutionRequest, Executor};
use crate::io::handoff::{handoff_env, raw_request, render_request, summarize_output};
use crate::io::init::{DunePaths, bootstrap};
use crate::io::prompt::{Prompter, ask_yes_no};
use crate::io::sources::{AutoDetectSource, Fallback, InteractiveSource, StaticDefaults};
use crate::mapper::{CapabilityMapper, ParameterCollection, ProviderMatch};
use crate::repair::RepairCoordinator;
use crate::resolver::{AutoDetector, EnvironmentResolver};
use crate::validate::ConfigurationValidator;

/// Task run by the legacy menu entry.
pub const LEGACY_TASK: &str = "Pobierz wszystkie wiadomości email ze skrzynki IMAP i zapisz je \
w folderach uporządkowanych według roku i miesiąca w formacie skrzynka/rok.miesiąc/*.eml. \
Dane logowania do skrzynki znajdziesz w pliku .env.";

const OUTPUT_DIR_VARIABLE: &str = "DUNE_OUTPUT_DIR";

/// Variables auto-configured in quick mode.
const QUICK_MODE_VARIABLES: [&str; 2] = [OUTPUT_DIR_VARIABLE, "DUNE_LOG_LEVEL"];

const RULE: &str = "============================================================";

/// Flags shared by every mode.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Stop after validation; never hand off to the executor.
    pub validate_only: bool,
    /// Resolve and repair without asking.
    pub auto_configure: bool,
    /// Save the document here (its stem becomes the document name).
    pub save_config: Option<PathBuf>,
    pub environment: RunEnvironment,
}

/// Which mode to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Interactive,
    Config(PathBuf),
    Quick(String),
    Legacy,
    /// Numbered menu choosing one of the others.
    Menu,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The operator gave no task.
    NoTask,
    /// No provider reached the match threshold; nothing was generated.
    NoMatch,
    /// Document saved; the operator chose not to run it.
    Saved { path: PathBuf },
    /// Validation passed and execution was not requested.
    Validated { verdict: ValidationVerdict },
    /// Validation still fails after the repair rounds.
    ValidationFailed { verdict: ValidationVerdict },
    /// The executor finished successfully.
    Executed {
        report: ExecutionReport,
        /// `None` when the document declares no post-conditions.
        outputs_present: Option<bool>,
    },
}

/// Per-run pipeline state.
pub struct Session<'a> {
    root: PathBuf,
    settings: DuneSettings,
    paths: DunePaths,
    catalog: Catalog,
    env: Environment,
    resolver: EnvironmentResolver,
    options: PipelineOptions,
    prompter: &'a mut dyn Prompter,
    executor: Box<dyn Executor + 'a>,
}

impl<'a> Session<'a> {
    /// Session over `root`: settings, catalog and `.env` are read from there
    /// and the working directories are created.
    #[instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub fn open(
        root: impl AsRef<Path>,
        options: PipelineOptions,
        prompter: &'a mut dyn Prompter,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let settings = load_settings(&root.join(SETTINGS_FILE))?;
        let catalog_path = settings.catalog_path.as_ref().map(|path| root.join(path));
        let catalog = load_catalog(catalog_path.as_deref())?;
        let env_path = DunePaths::new(&root, &settings).env_path;
        let env = Environment::capture(EnvStore::new(&env_path))?;
        let executor = CommandExecutor::from_settings(&settings.executor)?;
        let session = Self::new(root, settings, catalog, env, options, prompter)
            .with_executor(Box::new(executor));
        bootstrap(&session.paths)?;
        Ok(session)
    }

    /// Session from parts. The executor is unset until
    /// [`Self::with_executor`]; the output directory follows
    /// `DUNE_OUTPUT_DIR` as detected from `env`.
    pub fn new(
        root: PathBuf,
        settings: DuneSettings,
        catalog: Catalog,
        env: Environment,
        options: PipelineOptions,
        prompter: &'a mut dyn Prompter,
    ) -> Self {
        let detector = AutoDetector::new(&root, settings.aliases.clone());
        let mut paths = DunePaths::new(&root, &settings);
        if let Some(dir) = detector.detect(OUTPUT_DIR_VARIABLE, &env) {
            paths = paths.with_output_dir(&env.expand(&dir));
        }
        let resolver = EnvironmentResolver::new(detector, settings.max_prompt_attempts);
        let executor: Box<dyn Executor + 'a> = Box::new(UnconfiguredExecutor);
        Self {
            root,
            settings,
            paths,
            catalog,
            env,
            resolver,
            options,
            prompter,
            executor,
        }
    }

    pub fn with_executor(mut self, executor: Box<dyn Executor + 'a>) -> Self {
        self.executor = executor;
        self
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn paths(&self) -> &DunePaths {
        &self.paths
    }

    pub fn run(&mut self, mode: Mode) -> Result<RunOutcome> {
        info!(environment = %self.options.environment, ?mode, "starting run");
        match mode {
            Mode::Interactive => self.run_interactive(),
            Mode::Config(path) => self.run_config(&path),
            Mode::Quick(text) => self.run_quick(&text),
            Mode::Legacy => self.run_legacy(),
            Mode::Menu => self.run_menu(),
        }
    }

    /// Ask for a task, map it, collect parameters and environment, save the
    /// document, then validate and optionally run it.
    #[instrument(skip_all)]
    pub fn run_interactive(&mut self) -> Result<RunOutcome> {
        self.say(RULE)?;
        self.say("DUNE - interactive mode")?;
        self.say("Maps the task to capability providers and configures the environment.")?;
        self.say(RULE)?;

        let text = ask_required(&mut *self.prompter, "Describe the task in natural language: ")?;
        let text = text.trim().to_string();
        if text.is_empty() {
            self.say("No task given.")?;
            return Ok(RunOutcome::NoTask);
        }

        let mapper =
            CapabilityMapper::new(&self.catalog).with_threshold(self.settings.match_threshold);
        let Some(matches) = matched_or_report(mapper.require_match(&text), &mut *self.prompter)?
        else {
            return Ok(RunOutcome::NoMatch);
        };
        self.prompter
            .say(&format!("Matched providers ({}):", matches.len()))?;
        for (index, candidate) in matches.iter().enumerate() {
            self.prompter.say(&format!(
                "  {}. {} ({}) score {}",
                index + 1,
                candidate.provider.name,
                candidate.provider.package,
                candidate.score
            ))?;
        }
        let providers: Vec<&CapabilityProvider> =
            matches.iter().map(|candidate| candidate.provider).collect();

        let mut collections = Vec::new();
        for provider in &providers {
            let question = format!("Configure {}?", provider.name);
            let collection = if ask_yes_no(&mut *self.prompter, &question, Some(true))? {
                let mut source = InteractiveSource::new(&mut *self.prompter);
                mapper.collect_parameters(provider, &mut source)?
            } else {
                mapper.collect_parameters(provider, &mut StaticDefaults)?
            };
            for warning in &collection.warnings {
                self.prompter.say(&format!("  warning: {warning}"))?;
            }
            collections.push(collection);
        }

        let interactive = !self.options.auto_configure;
        let mut dependencies = collect_dependencies(providers.iter().copied());
        if !dependencies.is_empty() {
            self.prompter.say("Configuring environment variables...")?;
            // Values typed during parameter collection count as answers.
            let mut candidate = self.env.clone();
            let seeded = seed_from_collections(&self.env, &collections);
            for (name, value) in &seeded {
                candidate.set(name.clone(), value.clone());
            }
            let prompter: Option<&mut dyn Prompter> = if interactive {
                Some(&mut *self.prompter)
            } else {
                None
            };
            let resolution = self.resolver.resolve(&mut dependencies, &candidate, prompter)?;
            let mut values = seeded;
            values.extend(resolution.values);
            for name in &resolution.unresolved {
                self.prompter.say(&format!("  unresolved: {name}"))?;
            }
            for issue in &resolution.issues {
                self.prompter.say(&format!("  warning: {issue}"))?;
            }
            if !values.is_empty() {
                let save = !interactive
                    || ask_yes_no(&mut *self.prompter, "Save variables to .env?", Some(true))?;
                if save {
                    self.resolver.persist(&values, &mut self.env)?;
                } else {
                    for (name, value) in values {
                        self.env.set(name, value);
                    }
                }
            }
        }

        let builder = ConfigurationBuilder::new(self.options.environment);
        let mut document = builder.from_natural_language(&text);
        builder.apply_providers(&mut document, &providers, &collections);
        builder.record_mapping(&mut document, &providers, &collections);
        let path = self.document_target(&builder, &mut document)?;
        builder.save(&document, &path)?;
        self.prompter
            .say(&format!("Configuration saved to {}", path.display()))?;

        if !self.options.validate_only
            && !ask_yes_no(&mut *self.prompter, "Run the task now?", Some(true))?
        {
            return Ok(RunOutcome::Saved { path });
        }

        let verdict = self.ensure_environment(&document)?;
        if !verdict.passed {
            return Ok(RunOutcome::ValidationFailed { verdict });
        }
        if self.options.validate_only {
            self.say("Validation passed.")?;
            return Ok(RunOutcome::Validated { verdict });
        }
        self.execute_document(&document, Some(&path))
    }

    /// Load a saved document, validate (with repair offers) and run it.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn run_config(&mut self, path: &Path) -> Result<RunOutcome> {
        info!("loading configuration");
        let builder = ConfigurationBuilder::new(self.options.environment);
        let mut document = builder.load(path)?;
        self.prompter
            .say(&format!("Loaded configuration: {}", document.name()))?;

        let verdict = self.ensure_environment(&document)?;
        if let Some(target) = self.options.save_config.clone() {
            let stem = file_stem(&target)?;
            builder.rename(&mut document, &stem)?;
            document.validation.get_or_insert_with(Default::default).last_verdict =
                Some(verdict.clone());
            builder.save(&document, &target)?;
            self.prompter
                .say(&format!("Configuration saved to {}", target.display()))?;
        }

        if !verdict.passed {
            return Ok(RunOutcome::ValidationFailed { verdict });
        }
        if self.options.validate_only {
            self.say("Validation passed.")?;
            return Ok(RunOutcome::Validated { verdict });
        }
        self.execute_document(&document, Some(path))
    }

    /// Run a task text without questions.
    #[instrument(skip_all)]
    pub fn run_quick(&mut self, text: &str) -> Result<RunOutcome> {
        let text = text.trim();
        if text.is_empty() {
            self.say("No task given.")?;
            return Ok(RunOutcome::NoTask);
        }
        info!(task = text, "quick run");

        if self.options.auto_configure {
            let missing: Vec<&str> = QUICK_MODE_VARIABLES
                .into_iter()
                .filter(|name| self.env.value(name).is_none())
                .collect();
            let detected = self.resolver.auto_detect(missing, &self.env);
            self.resolver.persist(&detected, &mut self.env)?;
        }

        let mapper =
            CapabilityMapper::new(&self.catalog).with_threshold(self.settings.match_threshold);
        let Some(matches) = matched_or_report(mapper.require_match(text), &mut *self.prompter)?
        else {
            // Nothing to save or validate; a plain run still gets the raw text.
            if self.options.validate_only || self.options.save_config.is_some() {
                return Ok(RunOutcome::NoMatch);
            }
            return self.execute_request(&raw_request(text), None, None);
        };
        let providers: Vec<&CapabilityProvider> =
            matches.iter().map(|candidate| candidate.provider).collect();
        let builder = ConfigurationBuilder::new(self.options.environment);
        let mut document = builder.from_natural_language(text);
        let mut collections: Vec<ParameterCollection> = Vec::new();
        for provider in &providers {
            let mut source = Fallback::new(
                AutoDetectSource::new(self.resolver.detector(), &self.env),
                StaticDefaults,
            );
            collections.push(mapper.collect_parameters(provider, &mut source)?);
        }
        builder.apply_providers(&mut document, &providers, &collections);

        let saved = match self.options.save_config.clone() {
            Some(target) => {
                builder.rename(&mut document, &file_stem(&target)?)?;
                builder.save(&document, &target)?;
                self.prompter
                    .say(&format!("Configuration saved to {}", target.display()))?;
                Some(target)
            }
            None => None,
        };

        if self.options.validate_only {
            let validator = ConfigurationValidator::new(&self.catalog, &self.root);
            let verdict = validator.validate_pre_execution(&document, &self.env);
            report_verdict(&mut *self.prompter, &verdict)?;
            return Ok(if verdict.passed {
                RunOutcome::Validated { verdict }
            } else {
                RunOutcome::ValidationFailed { verdict }
            });
        }
        self.execute_request(&raw_request(text), None, saved.as_deref())
    }

    /// Run the built-in e-mail archive task.
    pub fn run_legacy(&mut self) -> Result<RunOutcome> {
        info!("legacy mode: e-mail archive task");
        self.execute_request(&raw_request(LEGACY_TASK), None, None)
    }

    /// Numbered mode menu. End of input is an interrupt.
    pub fn run_menu(&mut self) -> Result<RunOutcome> {
        self.say(RULE)?;
        self.say("DUNE - task pipeline")?;
        self.say("Choose a mode:")?;
        self.say("  1. Interactive (provider mapping)")?;
        self.say("  2. From a YAML configuration")?;
        self.say("  3. Quick (type a task)")?;
        self.say("  4. Legacy (no configuration)")?;
        self.say(RULE)?;

        loop {
            let choice = ask_required(&mut *self.prompter, "Choose an option [1-4]: ")?;
            match choice.trim() {
                "1" => return self.run_interactive(),
                "2" => {
                    let answer = ask_required(&mut *self.prompter, "Configuration file path: ")?;
                    let path = PathBuf::from(answer.trim());
                    if !answer.trim().is_empty() && path.is_file() {
                        return self.run_config(&path);
                    }
                    self.say("File does not exist.")?;
                }
                "3" => {
                    let task = ask_required(&mut *self.prompter, "Describe the task: ")?;
                    if !task.trim().is_empty() {
                        return self.run_quick(&task);
                    }
                    self.say("No task given.")?;
                }
                "4" => return self.run_legacy(),
                _ => self.say("Invalid choice.")?,
            }
        }
    }

    /// Validate `document`, offering up to `max_repair_rounds` repair passes
    /// while repairable errors remain.
    pub fn ensure_environment(
        &mut self,
        document: &ConfigurationDocument,
    ) -> Result<ValidationVerdict> {
        let validator = ConfigurationValidator::new(&self.catalog, &self.root);
        let mut verdict = validator.validate_pre_execution(document, &self.env);
        report_verdict(&mut *self.prompter, &verdict)?;

        let mut rounds = 0;
        while !verdict.passed
            && verdict.has_repairable_errors()
            && rounds < self.settings.max_repair_rounds
        {
            rounds += 1;
            let proceed = self.options.auto_configure
                || ask_yes_no(
                    &mut *self.prompter,
                    "Try to repair environment errors?",
                    None,
                )?;
            if !proceed {
                break;
            }

            let prompter: Option<&mut dyn Prompter> = if self.options.auto_configure {
                None
            } else {
                Some(&mut *self.prompter)
            };
            let outcome = RepairCoordinator::new(&mut self.resolver).repair(
                &verdict,
                document,
                &mut self.env,
                prompter,
            );
            self.prompter
                .say(&format!("Repaired {} problem(s).", outcome.fixed.len()))?;
            for note in &outcome.notes {
                self.prompter.say(&format!("  warning: {note}"))?;
            }

            verdict = validator.validate_pre_execution(document, &self.env);
            report_verdict(&mut *self.prompter, &verdict)?;
            if !outcome.any_fixed() {
                break;
            }
        }
        Ok(verdict)
    }

    fn execute_document(
        &mut self,
        document: &ConfigurationDocument,
        config_path: Option<&Path>,
    ) -> Result<RunOutcome> {
        let request = render_request(document).context("render executor request")?;
        self.execute_request(&request, Some(document), config_path)
    }

    #[instrument(skip_all)]
    fn execute_request(
        &mut self,
        request_text: &str,
        document: Option<&ConfigurationDocument>,
        config_path: Option<&Path>,
    ) -> Result<RunOutcome> {
        self.say("Starting task execution...")?;
        let request = ExecutionRequest {
            workdir: self.root.clone(),
            request_text: request_text.to_string(),
            env: handoff_env(
                &self.env,
                &self.settings.llm,
                self.options.environment,
                config_path,
            ),
            timeout: Duration::from_secs(self.settings.executor.timeout_secs),
            output_limit_bytes: self.settings.executor.output_limit_bytes,
        };
        let report = self.executor.execute(&request)?;
        if !report.succeeded() {
            for line in report.stderr.lines() {
                self.prompter.say(&format!("  {line}"))?;
            }
            return Err(if report.timed_out {
                anyhow!(
                    "executor timed out after {}s",
                    self.settings.executor.timeout_secs
                )
            } else {
                anyhow!("executor failed with exit code {:?}", report.exit_code)
            });
        }

        let outputs_present = document.and_then(|document| {
            document.validation.as_ref().map(|_| {
                ConfigurationValidator::new(&self.catalog, &self.root)
                    .validate_post_execution(document, &self.env)
            })
        });
        match outputs_present {
            Some(true) => self.say("Post-execution check passed.")?,
            Some(false) => {
                warn!("expected outputs missing after execution");
                self.say("Post-execution check failed: expected outputs are missing.")?;
            }
            None => {}
        }

        self.say(RULE)?;
        self.say("Task finished.")?;
        for line in summarize_output(&report.stdout) {
            self.prompter.say(&line)?;
        }
        self.say(RULE)?;
        Ok(RunOutcome::Executed {
            report,
            outputs_present,
        })
    }

    /// Save path for `document`: `--save-config` (renaming the document to
    /// its stem) or `<configs_dir>/<name>.yaml`.
    fn document_target(
        &self,
        builder: &ConfigurationBuilder,
        document: &mut ConfigurationDocument,
    ) -> Result<PathBuf> {
        match &self.options.save_config {
            Some(target) => {
                builder.rename(document, &file_stem(target)?)?;
                Ok(target.clone())
            }
            None => Ok(self.paths.document_path(document.name())),
        }
    }

    fn say(&mut self, message: &str) -> Result<()> {
        self.prompter.say(message)
    }
}

/// Stand-in until a real executor is attached.
struct UnconfiguredExecutor;

impl Executor for UnconfiguredExecutor {
    fn execute(&self, _request: &ExecutionRequest) -> Result<ExecutionReport> {
        Err(anyhow!("no executor configured"))
    }
}

/// Matches from [`CapabilityMapper::require_match`], or `None` once the
/// operator has been told nothing matched.
fn matched_or_report<'c>(
    result: Result<Vec<ProviderMatch<'c>>>,
    prompter: &mut dyn Prompter,
) -> Result<Option<Vec<ProviderMatch<'c>>>> {
    match result {
        Ok(matches) => Ok(Some(matches)),
        Err(err) if DuneError::is_no_match(&err) => {
            warn!(err = %err, "task matched no provider");
            prompter.say(&format!("No matching capability providers: {err}."))?;
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn ask_required(prompter: &mut dyn Prompter, question: &str) -> Result<String> {
    prompter
        .ask(question)?
        .ok_or_else(|| DuneError::Interrupted.into())
}

fn file_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("cannot derive a document name from {}", path.display()))
}

/// Dependency values implied by collected parameters the environment lacks.
fn seed_from_collections(
    env: &Environment,
    collections: &[ParameterCollection],
) -> BTreeMap<String, String> {
    let mut seeded = BTreeMap::new();
    for collection in collections {
        for param in &collection.values {
            let name = param.spec.dependency_name();
            if let Some(value) = &param.value
                && env.value(&name).is_none()
            {
                seeded.entry(name).or_insert_with(|| value.clone());
            }
        }
    }
    seeded
}

fn report_verdict(prompter: &mut dyn Prompter, verdict: &ValidationVerdict) -> Result<()> {
    if verdict.passed {
        prompter.say("Environment is configured correctly.")?;
    } else {
        prompter.say("Environment validation failed:")?;
    }
    for error in &verdict.errors {
        prompter.say(&format!("  error: {error}"))?;
    }
    for warning in &verdict.warnings {
        prompter.say(&format!("  warning: {warning}"))?;
    }
    Ok(())
}
