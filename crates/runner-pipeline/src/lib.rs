//! Stage planning, bounded retry, cancellation multiplexing and the
//! Pipeline Engine itself — the orchestration layer that drives one job's
//! `Executor` lifecycle from `Create` through `Finish`.

pub mod cancellation;
pub mod engine;
pub mod retry;
pub mod stage_plan;
pub mod terminal;

pub use cancellation::{effective_deadline, CancellationHub};
pub use engine::{EngineDeps, SKIP_NOOP_BUILD_STAGES_FLAG};
pub use retry::PreparePolicy;
pub use stage_plan::{PlannedStage, StageId, StagePlan};
pub use terminal::wait_for_terminal;
