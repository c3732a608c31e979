//! An in-memory `Executor`/`ExecutorProvider`/`ScriptGenerator`/`Trace`
//! test double whose behavior is programmed ahead of time: exact call
//! counts, ordering and outcomes can be asserted without a mocking
//! framework.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use runner_core::error::CancellationCause;
use runner_core::executor::{
    Executor, ExecutorFeatures, ExecutorProvider, PrepareOptions, RunCommand, ScriptGenerator,
    ScriptOutcome, ShellScriptInfo, Trace,
};
use runner_core::{Error, Result};

/// One programmed outcome for a `prepare` or `run` call.
#[derive(Clone)]
pub enum Outcome {
    Ok,
    Err(Error),
    /// Succeeds, but only after sleeping — used to simulate a slow stage
    /// for deadline/cancellation tests.
    SleepThenOk(Duration),
}

impl Outcome {
    async fn resolve(self) -> Result<()> {
        match self {
            Outcome::Ok => Ok(()),
            Outcome::Err(e) => Err(e),
            Outcome::SleepThenOk(d) => {
                tokio::time::sleep(d).await;
                Ok(())
            }
        }
    }
}

#[derive(Default)]
struct Script {
    /// One entry consumed per `prepare` call, across every executor this
    /// provider creates (so a test can script "fails twice, then
    /// succeeds" across the prepare-retry loop's fresh executors).
    prepare: VecDeque<Outcome>,
    /// One entry consumed per `run` call for a given stage name.
    run: HashMap<String, VecDeque<Outcome>>,
}

#[derive(Debug, Default)]
struct CallLog {
    creates: u32,
    cleanups: u32,
    finishes: u32,
    finish_outcomes: Vec<Option<Error>>,
    run_calls: Vec<String>,
}

/// A point-in-time copy of a `ScriptedProvider`'s observed call counts.
#[derive(Debug, Clone, Default)]
pub struct CallLogSnapshot {
    pub creates: u32,
    pub cleanups: u32,
    pub finishes: u32,
    pub finish_outcomes: Vec<Option<Error>>,
    pub run_calls: Vec<String>,
}

/// An `ExecutorProvider` whose `create()` calls each hand back a fresh
/// [`ScriptedExecutor`] sharing this provider's programmed script and call
/// log, so tests can assert totals across the prepare-retry loop's
/// multiple `Create`/`Cleanup` cycles.
#[derive(Clone)]
pub struct ScriptedProvider {
    script: Arc<Mutex<Script>>,
    log: Arc<Mutex<CallLog>>,
    default_shell: &'static str,
    features: ExecutorFeatures,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            log: Arc::new(Mutex::new(CallLog::default())),
            default_shell: "bash",
            features: ExecutorFeatures::default(),
        }
    }

    pub fn with_features(mut self, features: ExecutorFeatures) -> Self {
        self.features = features;
        self
    }

    /// Queues one outcome to be consumed by the next `prepare` call.
    pub fn push_prepare(&self, outcome: Outcome) {
        self.script.lock().unwrap().prepare.push_back(outcome);
    }

    /// Queues one outcome to be consumed by the next `run` call for
    /// `stage`.
    pub fn push_run(&self, stage: impl Into<String>, outcome: Outcome) {
        self.script
            .lock()
            .unwrap()
            .run
            .entry(stage.into())
            .or_default()
            .push_back(outcome);
    }

    pub fn snapshot(&self) -> CallLogSnapshot {
        let log = self.log.lock().unwrap();
        CallLogSnapshot {
            creates: log.creates,
            cleanups: log.cleanups,
            finishes: log.finishes,
            finish_outcomes: log.finish_outcomes.clone(),
            run_calls: log.run_calls.clone(),
        }
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorProvider for ScriptedProvider {
    fn can_create(&self) -> bool {
        true
    }

    fn default_shell(&self) -> &'static str {
        self.default_shell
    }

    fn get_features(&self, out: &mut ExecutorFeatures) -> Result<()> {
        *out = self.features;
        Ok(())
    }

    fn create(&self) -> Arc<dyn Executor> {
        self.log.lock().unwrap().creates += 1;
        Arc::new(ScriptedExecutor {
            script: self.script.clone(),
            log: self.log.clone(),
        })
    }
}

/// The `Executor` half of the test double. Never constructed directly —
/// obtained from [`ScriptedProvider::create`].
pub struct ScriptedExecutor {
    script: Arc<Mutex<Script>>,
    log: Arc<Mutex<CallLog>>,
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn shell(&self) -> Result<ShellScriptInfo> {
        Ok(ShellScriptInfo {
            shell_name: "bash".to_string(),
            build_dir: "/builds/ns/repo".to_string(),
            cache_dir: "/cache".to_string(),
        })
    }

    async fn prepare(&self, _options: PrepareOptions, _trace: Arc<dyn Trace>) -> Result<()> {
        let outcome = {
            let mut script = self.script.lock().unwrap();
            script.prepare.pop_front().unwrap_or(Outcome::Ok)
        };
        outcome.resolve().await
    }

    async fn run(&self, cmd: RunCommand) -> Result<()> {
        self.log.lock().unwrap().run_calls.push(cmd.stage.clone());
        let outcome = {
            let mut script = self.script.lock().unwrap();
            script
                .run
                .get_mut(&cmd.stage)
                .and_then(|q| q.pop_front())
                .unwrap_or(Outcome::Ok)
        };
        outcome.resolve().await
    }

    async fn cleanup(&self) {
        self.log.lock().unwrap().cleanups += 1;
    }

    async fn finish(&self, outcome: Option<Error>) {
        let mut log = self.log.lock().unwrap();
        log.finishes += 1;
        log.finish_outcomes.push(outcome);
    }
}

/// A `ScriptGenerator` that renders a one-line placeholder script for
/// every stage except the ones marked `skip`, which return the
/// `SkipBuildStage` sentinel.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGenerator {
    skip_stages: HashSet<String>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip(mut self, stage: impl Into<String>) -> Self {
        self.skip_stages.insert(stage.into());
        self
    }
}

impl ScriptGenerator for ScriptedGenerator {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn generate_script(&self, stage: &str, _info: &ShellScriptInfo) -> Result<ScriptOutcome> {
        if self.skip_stages.contains(stage) {
            Ok(ScriptOutcome::Skip)
        } else {
            Ok(ScriptOutcome::Script(format!("# {stage}")))
        }
    }
}

/// A `Trace` that discards everything written to it; `set_cancel_func`
/// still stashes the callback so tests that want to drive `UserCancel`
/// can invoke it.
#[derive(Default)]
pub struct NullTrace {
    cancel: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl NullTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invokes the cancel function registered via `set_cancel_func`, if
    /// any — lets a test drive the `UserCancel` cancellation source.
    pub fn trigger_user_cancel(&self) {
        if let Some(cancel) = self.cancel.lock().unwrap().as_ref() {
            cancel();
        }
    }
}

impl Trace for NullTrace {
    fn write(&self, _data: &[u8]) {}

    fn is_stdout(&self) -> bool {
        false
    }

    fn set_cancel_func(&self, cancel: Box<dyn Fn() + Send + Sync>) {
        *self.cancel.lock().unwrap() = Some(cancel);
    }

    fn set_masked(&self, _patterns: Vec<String>) {}

    fn fail(&self, _err: Error, _cause: Option<CancellationCause>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prepare_consumes_scripted_outcomes_in_order() {
        let provider = ScriptedProvider::new();
        provider.push_prepare(Outcome::Err(Error::PrepareRetryable("boom".into())));
        provider.push_prepare(Outcome::Ok);

        let exec1 = provider.create();
        let trace: Arc<dyn Trace> = Arc::new(NullTrace::new());
        let opts = PrepareOptions {
            variables: vec![],
            image: String::new(),
            build_dir: "/builds/ns/repo".into(),
            cache_dir: "/cache".into(),
        };
        assert!(exec1.prepare(opts.clone(), trace.clone()).await.is_err());

        let exec2 = provider.create();
        assert!(exec2.prepare(opts, trace).await.is_ok());

        let snap = provider.snapshot();
        assert_eq!(snap.creates, 2);
    }

    #[tokio::test]
    async fn run_calls_are_logged_per_stage() {
        let provider = ScriptedProvider::new();
        provider.push_run("step_script", Outcome::Err(Error::StageRetryable("flaky".into())));
        provider.push_run("step_script", Outcome::Ok);

        let exec = provider.create();
        let cmd = |stage: &str| RunCommand {
            stage: stage.to_string(),
            script: "#!/bin/sh".into(),
            predefined: false,
        };
        assert!(exec.run(cmd("step_script")).await.is_err());
        assert!(exec.run(cmd("step_script")).await.is_ok());

        let snap = provider.snapshot();
        assert_eq!(snap.run_calls, vec!["step_script", "step_script"]);
    }

    #[tokio::test]
    async fn cleanup_and_finish_increment_shared_log() {
        let provider = ScriptedProvider::new();
        let exec = provider.create();
        exec.cleanup().await;
        exec.finish(None).await;

        let snap = provider.snapshot();
        assert_eq!(snap.cleanups, 1);
        assert_eq!(snap.finishes, 1);
        assert_eq!(snap.finish_outcomes, vec![None]);
    }

    #[test]
    fn scripted_generator_skips_marked_stages() {
        let gen = ScriptedGenerator::new().skip("archive_cache");
        let info = ShellScriptInfo {
            shell_name: "bash".into(),
            build_dir: "/builds".into(),
            cache_dir: "/cache".into(),
        };
        assert!(matches!(
            gen.generate_script("archive_cache", &info).unwrap(),
            ScriptOutcome::Skip
        ));
        assert!(matches!(
            gen.generate_script("step_script", &info).unwrap(),
            ScriptOutcome::Script(_)
        ));
    }
}
