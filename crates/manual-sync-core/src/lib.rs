pub mod classify;
pub mod diff;
pub mod engine;
pub mod error;
pub mod figures;
pub mod fs;
pub mod locator;
pub mod materialize;
pub mod numbering;
pub mod patcher;
pub mod report;
pub mod validate;

pub use classify::{render_outline, Classifier, ElementKind};
pub use engine::{load_source, run_sync, SyncOptions, SyncOutcome, SyncRequest};
pub use error::{ExitCode, SkipReason, SyncError, SyncResult};
pub use locator::{Anchor, AnchorMode};
pub use report::{Renumbered, RunState, SkippedBlock, SyncReport};
