mod error;
mod extract;
mod locate;
mod merge;
mod pipeline;
mod report;
mod retry;
mod scratch;

pub use {error::*, extract::*, locate::*, pipeline::*, report::*, retry::*};
pub use merge::{merge_tree, replace_file, MergeOutcome};
pub use scratch::{scratch_root, SCRATCH_ROOT};
