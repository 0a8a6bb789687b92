//! The build engine: staleness checks, the bounded compile batch, linking and
//! the watch loop.

mod batch;
mod compile;
mod error;
mod link;
mod orchestrator;
mod stale;
mod unit;
mod watcher;

pub use batch::{Batch, batch};
pub use compile::{CompileOutcome, CompileStage};
pub use error::BuildError;
pub use link::{LinkStage, executable_name};
pub use orchestrator::{BuildOrchestrator, BuildReport, LinkStatus, UnitReport};
pub use stale::is_stale;
pub use unit::{BuildTarget, Language, OBJECT_SUFFIX, TranslationUnit, discover_sources, glob_to_regex};
pub use watcher::{Debouncer, WatchFilter, WatchState, run_loop, watch};
