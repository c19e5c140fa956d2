use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

use crate::Error;

/// Result of running an extractor over one archive. Informational only: whatever landed in the
/// output directory is merged regardless.
#[derive(Debug, Default, Clone)]
pub struct Extraction {
    pub status: Option<ExitStatus>,
    pub spawn_error: Option<String>,
}

impl Extraction {
    pub fn exited(status: ExitStatus) -> Self {
        Self {
            status: Some(status),
            spawn_error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            status: None,
            spawn_error: Some(error.to_string()),
        }
    }
}

/// Unpacks one archive into a directory.
pub trait Extractor: Send + Sync {
    fn extract(&self, archive: &Path, out: &Path) -> Extraction;
}

impl<F> Extractor for F
where
    F: Fn(&Path, &Path) -> Extraction + Send + Sync,
{
    fn extract(&self, archive: &Path, out: &Path) -> Extraction {
        self(archive, out)
    }
}

/// The `gmad` command line tool, invoked as `gmad extract -file <archive> -out <dir>`.
#[derive(Debug, Clone)]
pub struct Gmad {
    path: PathBuf,
}

impl Gmad {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn file_name() -> String {
        format!("gmad{}", std::env::consts::EXE_SUFFIX)
    }

    /// `gmad` in the same directory as the running executable
    pub fn beside_current_exe() -> Result<Self, Error> {
        let exe = std::env::current_exe()?;
        let dir = exe
            .parent()
            .ok_or_else(|| Error::ExtractorMissing(exe.display().to_string()))?;
        Ok(Self::new(dir.join(Self::file_name())))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ensure_exists(&self) -> Result<(), Error> {
        if self.path.is_file() {
            Ok(())
        } else {
            Err(Error::ExtractorMissing(self.path.display().to_string()))
        }
    }
}

impl Extractor for Gmad {
    fn extract(&self, archive: &Path, out: &Path) -> Extraction {
        let label = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| archive.display().to_string());

        let mut child = match Command::new(&self.path)
            .arg("extract")
            .arg("-file")
            .arg(archive)
            .arg("-out")
            .arg(out)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                log::error!("{label}: failed to launch {}: {e}", self.path.display());
                return Extraction::failed(e);
            }
        };

        // both pipes are drained at once so a chatty child never blocks on a full buffer
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let label = label.as_str();
        thread::scope(|s| {
            if let Some(stderr) = stderr {
                s.spawn(move || {
                    for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                        log::info!("{label}: {line}");
                    }
                });
            }
            if let Some(stdout) = stdout {
                for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                    log::debug!("{label}: {line}");
                }
            }
        });

        match child.wait() {
            Ok(status) => {
                if !status.success() {
                    log::warn!("{label}: extractor exited with {status}");
                }
                Extraction::exited(status)
            }
            Err(e) => {
                log::error!("{label}: failed waiting for extractor: {e}");
                Extraction::failed(e)
            }
        }
    }
}
