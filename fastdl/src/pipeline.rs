use std::any::Any;
use std::fs;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;

use glob::Pattern;
use rayon::prelude::*;

use crate::extract::{Extractor, Gmad};
use crate::locate::{locate_archives, DEFAULT_PATTERN};
use crate::report::{RunReport, Stage, UnitReport};
use crate::retry::RetryPolicy;
use crate::{merge, scratch, Error};

pub struct PipelineBuilder {
    extractor: Option<Box<dyn Extractor>>,
    jobs: Option<usize>,
    retry: RetryPolicy,
    pattern: String,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            extractor: None,
            jobs: None,
            retry: RetryPolicy::default(),
            pattern: DEFAULT_PATTERN.to_owned(),
        }
    }
    /// Defaults to `gmad` next to the running executable
    pub fn extractor(mut self, extractor: impl Extractor + 'static) -> Self {
        self.extractor = Some(Box::new(extractor));
        self
    }
    /// Maximum number of units running at once. Defaults to the logical processor count
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
    /// File name glob used to discover archives
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }
    pub fn build(self) -> Result<Pipeline, Error> {
        let jobs = self.jobs.unwrap_or_else(default_jobs);
        if jobs == 0 {
            return Err(Error::NoJobs);
        }
        if self.retry.attempts == 0 {
            return Err(Error::NoAttempts);
        }
        let pattern = Pattern::new(&self.pattern)?;
        let extractor = match self.extractor {
            Some(extractor) => extractor,
            None => Box::new(Gmad::beside_current_exe()?),
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .thread_name(|i| format!("fastdl-unit-{i}"))
            .build()?;
        Ok(Pipeline {
            extractor,
            pool,
            jobs,
            retry: self.retry,
            pattern,
        })
    }
}

pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Extracts archives and merges them into one output tree.
///
/// Every archive becomes a unit (extract, merge, clean up) that runs on its own worker of a
/// dedicated pool, so at most `jobs` units are ever in flight. A unit holds its worker until it
/// is done, including while the extractor runs and while a failed move waits to be retried.
pub struct Pipeline {
    extractor: Box<dyn Extractor>,
    pool: rayon::ThreadPool,
    jobs: usize,
    retry: RetryPolicy,
    pattern: Pattern,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("jobs", &self.jobs)
            .field("retry", &self.retry)
            .field("pattern", &self.pattern.as_str())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Find every archive below `source`.
    pub fn locate(&self, source: &Path) -> Result<Vec<PathBuf>, Error> {
        locate_archives(source, &self.pattern)
    }

    pub fn run(&self, archives: &[PathBuf], output: &Path) -> Result<RunReport, Error> {
        self.run_with(archives, output, |_| {})
    }

    /// Like [`Pipeline::run`], calling `on_unit` as each unit finishes (in completion order).
    ///
    /// Only failing to create `output` is an error. Everything that goes wrong inside a unit is
    /// logged and recorded in its [`UnitReport`].
    pub fn run_with(
        &self,
        archives: &[PathBuf],
        output: &Path,
        on_unit: impl Fn(&UnitReport) + Sync,
    ) -> Result<RunReport, Error> {
        let start = Instant::now();
        fs::create_dir_all(output).map_err(|source| Error::OutputDirectory {
            path: output.display().to_string(),
            source,
        })?;

        let scratch_root = scratch::scratch_root(output);
        let names = scratch::scratch_names(archives);
        let units = self.pool.install(|| {
            archives
                .par_iter()
                .zip(names)
                .with_max_len(1)
                .map(|(archive, name)| {
                    let report = self.run_unit(archive, scratch_root.join(name), output);
                    on_unit(&report);
                    report
                })
                .collect::<Vec<_>>()
        });
        scratch::remove_scratch_root(output);

        Ok(RunReport {
            units,
            elapsed: start.elapsed(),
        })
    }

    fn run_unit(&self, archive: &Path, scratch: PathBuf, output: &Path) -> UnitReport {
        let mut report = UnitReport::new(archive.to_path_buf(), scratch);
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.process(&mut report, output)));
        if let Err(payload) = result {
            let message = panic_message(payload.as_ref());
            log::error!(
                "{}: unit panicked while {}: {message}",
                archive.display(),
                report.stage
            );
            report.panicked = Some(message);
            if let Err(e) = scratch::remove_scratch(&report.scratch) {
                report.cleanup_error = Some(e.to_string());
            }
        }
        report
    }

    fn process(&self, report: &mut UnitReport, output: &Path) {
        let name = report
            .archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        report.enter(Stage::Extracting);
        match fs::create_dir_all(&report.scratch) {
            Ok(()) => {
                let extraction = self.extractor.extract(&report.archive, &report.scratch);
                report.exit_status = extraction.status;
                report.spawn_error = extraction.spawn_error;
            }
            Err(e) => {
                log::error!(
                    "{name}: could not create scratch directory {}: {e}",
                    report.scratch.display()
                );
                report.spawn_error = Some(format!("could not create scratch directory: {e}"));
            }
        }

        report.enter(Stage::Merging);
        let merged = merge::merge_tree(&report.scratch, output, &self.retry);
        report.moved = merged.moved;
        report.retried = merged.retried;
        report.abandoned = merged.abandoned;

        report.enter(Stage::CleaningUp);
        if let Err(e) = scratch::remove_scratch(&report.scratch) {
            log::error!(
                "{name}: error deleting directory {}: {e}",
                report.scratch.display()
            );
            report.cleanup_error = Some(e.to_string());
        }

        report.enter(Stage::Done);
        log::info!(
            "{name}: merged {} files, {} abandoned",
            report.moved.len(),
            report.abandoned.len()
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
