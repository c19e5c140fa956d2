use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

/// Lifecycle of one extract, merge and cleanup unit. Stages only move forward.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default, strum::Display)]
pub enum Stage {
    #[default]
    Created,
    Extracting,
    Merging,
    CleaningUp,
    Done,
}

/// A file that never made it into the output tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abandoned {
    /// Relative path, the same below the scratch directory and the output root
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct UnitReport {
    pub archive: PathBuf,
    pub scratch: PathBuf,
    pub stage: Stage,
    pub exit_status: Option<ExitStatus>,
    pub spawn_error: Option<String>,
    /// Relative paths now present in the output tree
    pub moved: Vec<PathBuf>,
    /// Subset of `moved` that needed more than one attempt
    pub retried: Vec<PathBuf>,
    pub abandoned: Vec<Abandoned>,
    pub cleanup_error: Option<String>,
    /// Panic message if the unit did not run to completion
    pub panicked: Option<String>,
}

impl UnitReport {
    pub fn new(archive: PathBuf, scratch: PathBuf) -> Self {
        Self {
            archive,
            scratch,
            ..Default::default()
        }
    }

    /// Advance to `stage`, never backwards.
    pub(crate) fn enter(&mut self, stage: Stage) {
        debug_assert!(stage > self.stage, "{} -> {}", self.stage, stage);
        log::trace!("{}: {} -> {}", self.archive.display(), self.stage, stage);
        self.stage = stage;
    }

    pub fn is_clean(&self) -> bool {
        self.abandoned.is_empty() && self.cleanup_error.is_none() && self.panicked.is_none()
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    /// One report per archive, in the order the archives were given
    pub units: Vec<UnitReport>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn archives(&self) -> usize {
        self.units.len()
    }

    pub fn files_moved(&self) -> usize {
        self.units.iter().map(|u| u.moved.len()).sum()
    }

    pub fn files_abandoned(&self) -> usize {
        self.units.iter().map(|u| u.abandoned.len()).sum()
    }

    pub fn failed_units(&self) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(|u| !u.is_clean())
    }

    pub fn is_clean(&self) -> bool {
        self.units.iter().all(UnitReport::is_clean)
    }
}
