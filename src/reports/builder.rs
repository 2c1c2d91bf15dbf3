use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::{Destination, ReportDestinations, ReportError, ReportKind, RunResults, CODE_FAILURES};
use crate::config::EffectiveConfig;

/// Source file → sorted executable line numbers
pub type ExecutableStatements = BTreeMap<PathBuf, Vec<u32>>;

/// Renders one text report (issues, TAP, xUnit)
pub trait ReportFormatter {
    fn render(&self, results: &RunResults, update_available: bool) -> Result<String, ReportError>;
}

/// Writes the coverage report under `destination`
pub trait CoverageFormatter {
    fn write(
        &self,
        destination: &Path,
        statements: &ExecutableStatements,
        results: &RunResults,
    ) -> Result<(), ReportError>;
}

/// Formatters supplied by the caller; only the configured kinds need one.
#[derive(Default)]
pub struct Formatters<'a> {
    pub coverage: Option<&'a dyn CoverageFormatter>,
    pub issues: Option<&'a dyn ReportFormatter>,
    pub tap: Option<&'a dyn ReportFormatter>,
    pub xunit: Option<&'a dyn ReportFormatter>,
}

impl<'a> Formatters<'a> {
    fn text(&self, kind: ReportKind) -> Option<&'a dyn ReportFormatter> {
        match kind {
            ReportKind::Issues => self.issues,
            ReportKind::Tap => self.tap,
            ReportKind::Xunit => self.xunit,
            ReportKind::Coverage => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOutcome {
    /// Report that targeted stdout, if any
    pub stdout: Option<String>,
    pub exit_code: i32,
}

pub struct ReportsBuilder {
    project_root: PathBuf,
    destinations: ReportDestinations,
}

impl ReportsBuilder {
    pub fn new(project_root: impl Into<PathBuf>, destinations: ReportDestinations) -> Self {
        Self {
            project_root: project_root.into(),
            destinations,
        }
    }

    pub fn from_config(config: &EffectiveConfig) -> Self {
        Self::new(&config.project_root, config.settings.reports.clone())
    }

    /// Produce every configured report and compute the exit code.
    ///
    /// Coverage is skipped when `statements` is `None`. The destinations are
    /// validated first: two text reports on stdout fail with
    /// [`ReportError::MultipleStdout`] and nothing is written, rather than one
    /// silently replacing the other.
    pub fn run(
        &self,
        results: &RunResults,
        statements: Option<&ExecutableStatements>,
        formatters: &Formatters<'_>,
        update_available: bool,
    ) -> Result<ReportOutcome, ReportError> {
        self.destinations.validate()?;

        if let (Some(Destination::Path(path)), Some(statements)) =
            (&self.destinations.coverage, statements)
        {
            let formatter = formatters
                .coverage
                .ok_or(ReportError::MissingFormatter(ReportKind::Coverage))?;
            let target = self.resolve(path);
            tracing::debug!(path = %target.display(), "writing coverage report");
            formatter.write(&target, statements, results)?;
        }

        let mut stdout = None;
        for kind in [ReportKind::Issues, ReportKind::Tap, ReportKind::Xunit] {
            let Some(destination) = self.destinations.get(kind) else {
                continue;
            };
            let formatter = formatters
                .text(kind)
                .ok_or(ReportError::MissingFormatter(kind))?;
            let output = formatter.render(results, update_available)?;

            match destination {
                Destination::Stdout => stdout = Some(output),
                Destination::Path(path) => {
                    let target = self.resolve(path);
                    tracing::debug!(report = %kind, path = %target.display(), "writing report");
                    write_report(&target, &output)?;
                }
            }
        }

        let exit_code = if results.is_successful() {
            0
        } else {
            CODE_FAILURES
        };
        Ok(ReportOutcome { stdout, exit_code })
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

fn write_report(path: &Path, contents: &str) -> Result<(), ReportError> {
    let io_err = |source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, contents).map_err(io_err)
}
