#[derive(thiserror::Error)]
pub enum Error {
    // dependency errors
    #[error("directory walk: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("invalid archive pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    // std errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // crate errors
    #[error("Source is not a directory: \"{0}\"")]
    SourceNotADirectory(String),

    #[error("Extractor not found at \"{0}\"")]
    ExtractorMissing(String),

    #[error("Could not create output directory \"{path}\": {source}")]
    OutputDirectory {
        path: String,
        source: std::io::Error,
    },

    #[error("job count must be at least 1")]
    NoJobs,

    #[error("retry policy must allow at least 1 attempt")]
    NoAttempts,

    #[error("{units} of {archives} archives did not merge cleanly")]
    UnitsFailed { units: usize, archives: usize },
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}
