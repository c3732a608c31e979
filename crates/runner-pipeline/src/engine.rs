//! The Pipeline Engine: obtains an `Executor` from the `Provider`
//! (retrying `Prepare` with a fresh executor each attempt), dispatches
//! every `StagePlan` stage in order, classifies the outcome into the
//! matching epilogue branch, and guarantees `Cleanup`/`Finish` on every
//! exit path.
//!
//! State machine, summarized: `Created -> Preparing -> Running ->
//! {EpilogueSuccess, EpilogueFailure, Cancelled} -> Finished`. This
//! module doesn't carry an explicit state enum — the states map 1:1
//! onto the phases of `run`'s control flow below, and `tracing` spans
//! mark each transition for anyone debugging a stuck job.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use runner_config::BuildContext;
use runner_core::error::{CancellationCause, FailureReason};
use runner_core::executor::{
    Executor, ExecutorProvider, PrepareOptions, RunCommand, ScriptGenerator, ScriptOutcome,
    ShellScriptInfo, Trace,
};
use runner_core::{Error, Result};

use crate::cancellation::CancellationHub;
use crate::retry::{self, PreparePolicy};
use crate::stage_plan::{PlannedStage, StagePlan};

/// A `FF_*` name gating whether a `SkipBuildStage`-sentinel stage still
/// invokes `Executor::run`.
pub const SKIP_NOOP_BUILD_STAGES_FLAG: &str = "FF_SKIP_NOOP_BUILD_STAGES";

/// Everything the engine needs beyond `BuildContext`/`StagePlan`: the
/// pluggable collaborators defined as external contracts.
pub struct EngineDeps {
    pub provider: Arc<dyn ExecutorProvider>,
    pub generator: Arc<dyn ScriptGenerator>,
    pub trace: Arc<dyn Trace>,
    pub hub: Arc<CancellationHub>,
    pub prepare_policy: PreparePolicy,
}

/// Drives one job's `StagePlan` to completion. Returns the terminal error
/// (`None` on success) — the same value passed to the final `Finish`
/// call and, for a non-nil result, to `Trace::fail` alongside any
/// recorded cancellation cause.
pub async fn run(ctx: &BuildContext, plan: &StagePlan, deps: EngineDeps) -> Option<Error> {
    let EngineDeps {
        provider,
        generator,
        trace,
        hub,
        prepare_policy,
    } = deps;
    let cancel = hub.token();

    trace.set_masked(
        ctx.variables
            .masked_values()
            .into_iter()
            .map(str::to_string)
            .collect(),
    );
    hub.watch_user_cancel(&trace);

    if !provider.can_create() {
        let err = Error::build(
            "executor provider cannot create an executor",
            FailureReason::RunnerSystemFailure,
        );
        trace.fail(err.clone(), hub.cause());
        return Some(err);
    }

    if let Some(message) = ctx.debug_trace_disabled_message() {
        trace.write(message.as_bytes());
    }

    // --- Created -> Preparing: Create/Prepare, recreating the executor
    // on every retryable Prepare failure. The retry loop itself lives in
    // `retry::run_prepare`; this closure supplies the engine-specific
    // part of the policy, swapping in a fresh executor whenever another
    // attempt is coming. ---
    let prepare_options = PrepareOptions {
        variables: ctx.variables.string_list(),
        image: ctx.job.image.clone(),
        build_dir: ctx.dirs.build_dir.clone(),
        cache_dir: ctx.dirs.cache_dir.clone(),
    };

    let executor_cell = Mutex::new(provider.create());
    let prepare_result = retry::run_prepare(prepare_policy, &cancel, |attempt_no| {
        let trace = trace.clone();
        let prepare_options = prepare_options.clone();
        async {
            let executor = executor_cell.lock().unwrap().clone();
            let result = executor.prepare(prepare_options, trace).await;
            if let Err(err) = &result {
                if err.is_retryable() && attempt_no < prepare_policy.max_attempts && !cancel.is_cancelled() {
                    tracing::warn!(attempt = attempt_no, error = %err, "prepare failed, recreating executor");
                    executor.cleanup().await;
                    *executor_cell.lock().unwrap() = provider.create();
                }
            }
            result
        }
    })
    .await;
    // `run_prepare` reports any cancellation as a generic `JobCanceled`
    // token error since it doesn't know about the hub; swap in the
    // actual recorded cause.
    let prepare_result = match prepare_result {
        Err(Error::Cancelled(_)) => Err(cancelled(&hub)),
        other => other,
    };
    let executor = executor_cell.into_inner().unwrap();

    // --- Preparing -> Running: Shell() once, then the stage sequence. ---
    let terminal_err = match prepare_result {
        Ok(()) => match executor.shell().await {
            Ok(shell_info) => run_job(ctx, plan, &*executor, &*generator, &shell_info, &cancel, &hub).await,
            Err(err) => Some(err),
        },
        Err(err) => Some(err),
    };

    // --- Every exit path: Cleanup then Finish. ---
    executor.cleanup().await;
    executor.finish(terminal_err.clone()).await;

    if let Some(err) = &terminal_err {
        trace.fail(err.clone(), hub.cause());
    }

    terminal_err
}

/// Runs the prologue + user stages, classifies the outcome, then runs the
/// matching epilogue branch. Returns the terminal error: the main
/// sequence's error (if any) is authoritative; an epilogue failure only
/// becomes the terminal error when the main sequence succeeded outright.
async fn run_job(
    ctx: &BuildContext,
    plan: &StagePlan,
    executor: &dyn Executor,
    generator: &dyn ScriptGenerator,
    shell_info: &ShellScriptInfo,
    cancel: &CancellationToken,
    hub: &CancellationHub,
) -> Option<Error> {
    let skip_noop = ctx.is_feature_flag_on(SKIP_NOOP_BUILD_STAGES_FLAG);

    let main_stages: Vec<&PlannedStage> = plan.prologue.iter().chain(plan.user.iter()).collect();
    let primary_error = run_stage_sequence(
        &main_stages,
        executor,
        generator,
        shell_info,
        cancel,
        hub,
        skip_noop,
        /* stop_on_error */ true,
    )
    .await;

    let succeeded = primary_error.is_none();
    let epilogue_stages = plan.epilogue_for(succeeded);
    let epilogue_error = run_stage_sequence(
        &epilogue_stages,
        executor,
        generator,
        shell_info,
        cancel,
        hub,
        skip_noop,
        /* stop_on_error */ false,
    )
    .await;

    primary_error.or(epilogue_error)
}

/// Runs `stages` in order against `executor`, stopping early on
/// cancellation always, and on an ordinary stage error only when
/// `stop_on_error` is set (the main sequence stops; the epilogue keeps
/// going so e.g. a failing `AfterScript` doesn't suppress an artifact
/// upload). Returns the first error observed, if any.
#[allow(clippy::too_many_arguments)]
async fn run_stage_sequence(
    stages: &[&PlannedStage],
    executor: &dyn Executor,
    generator: &dyn ScriptGenerator,
    shell_info: &ShellScriptInfo,
    cancel: &CancellationToken,
    hub: &CancellationHub,
    skip_noop: bool,
    stop_on_error: bool,
) -> Option<Error> {
    let mut first_error = None;

    for stage in stages {
        if cancel.is_cancelled() {
            first_error.get_or_insert(cancelled(hub));
            break;
        }

        let stage_name = stage.id.as_str();
        let outcome = match generator.generate_script(stage_name, shell_info) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(stage = stage_name, error = %err, "script generation failed");
                first_error.get_or_insert(err);
                if stop_on_error {
                    break;
                }
                continue;
            }
        };

        let script = match outcome {
            ScriptOutcome::Skip if skip_noop => {
                tracing::debug!(stage = stage_name, "skipping no-op stage");
                continue;
            }
            ScriptOutcome::Skip => String::new(),
            ScriptOutcome::Script(script) => script,
        };

        let predefined = stage.id.is_predefined();
        let stage_name_owned = stage_name.to_string();

        tracing::info!(stage = stage_name, "stage starting");
        let result = retry::run_stage(stage.attempts, stage_name, cancel, |_| {
            cancellable(
                cancel,
                hub,
                executor.run(RunCommand {
                    stage: stage_name_owned.clone(),
                    script: script.clone(),
                    predefined,
                }),
            )
        })
        .await;
        tracing::info!(stage = stage_name, ok = result.is_ok(), "stage finished");

        if let Err(err) = result {
            first_error.get_or_insert(err);
            if stop_on_error {
                break;
            }
        }
    }

    first_error
}

/// Races a single executor call against the shared cancellation token, so
/// a stage in flight when cancellation arrives is dropped rather than
/// awaited to completion.
async fn cancellable(
    cancel: &CancellationToken,
    hub: &CancellationHub,
    fut: impl Future<Output = Result<()>>,
) -> Result<()> {
    tokio::select! {
        res = fut => res,
        _ = cancel.cancelled() => Err(cancelled(hub)),
    }
}

fn cancelled(hub: &CancellationHub) -> Error {
    Error::Cancelled(hub.cause().unwrap_or(CancellationCause::JobCanceled))
}
