// Sweep controller: enumerates threads x lines x directives, drives the
// mutator and the measurement cycle for each configuration and collects
// the results in enumeration order.
//
// Only one mutated variant is ever on disk at a time and every variant is
// restored before the next one is written, so the loop stays sequential.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use serde::Serialize;

use crate::cycle::{self, Bench};
use crate::error::{ConfigError, Error, Result};
use crate::mutator::SourceSnapshot;
use crate::report::Reporter;

/// One point of the configuration space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Configuration {
    pub threads: usize,
    pub line: usize,
    pub directive: String,
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "directive \"{}\" with {} threads in line {}",
            self.directive, self.threads, self.line
        )
    }
}

/// Empty, whitespace-only and bare line-break directives are never swept.
pub fn is_blank_directive(directive: &str) -> bool {
    directive.trim().is_empty()
}

fn dedup_stable<T: Eq + Hash + Clone>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// The three axes of the sweep, deduplicated with first occurrence kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Axes {
    threads: Vec<usize>,
    lines: Vec<usize>,
    directives: Vec<String>,
}

impl Axes {
    pub fn new<S: Into<String>>(
        threads: impl IntoIterator<Item = usize>,
        lines: impl IntoIterator<Item = usize>,
        directives: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            threads: dedup_stable(threads),
            lines: dedup_stable(lines),
            directives: dedup_stable(
                directives
                    .into_iter()
                    .map(Into::into)
                    .filter(|d: &String| !is_blank_directive(d)),
            ),
        }
    }

    pub fn threads(&self) -> &[usize] {
        &self.threads
    }

    pub fn lines(&self) -> &[usize] {
        &self.lines
    }

    pub fn directives(&self) -> &[String] {
        &self.directives
    }

    /// (threads, lines, directives)
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.threads.len(), self.lines.len(), self.directives.len())
    }

    pub fn len(&self) -> usize {
        self.threads.len() * self.lines.len() * self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn configuration(&self, thread: usize, line: usize, directive: usize) -> Option<Configuration> {
        Some(Configuration {
            threads: *self.threads.get(thread)?,
            line: *self.lines.get(line)?,
            directive: self.directives.get(directive)?.clone(),
        })
    }

    /// Threads outermost, directives innermost.
    pub fn configurations(&self) -> impl Iterator<Item = Configuration> + '_ {
        self.threads.iter().flat_map(move |&threads| {
            self.lines.iter().flat_map(move |&line| {
                self.directives.iter().map(move |directive| Configuration {
                    threads,
                    line,
                    directive: directive.clone(),
                })
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    #[serde(flatten)]
    pub configuration: Configuration,
    pub runtime: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Skipped {
    #[serde(flatten)]
    pub configuration: Configuration,
    pub reason: String,
}

/// Measurements keyed by configuration, kept in the order they were taken.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSpace {
    entries: Vec<Entry>,
    skipped: Vec<Skipped>,
}

impl ResultSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a [thread][line][directive] grid laid out like `axes`.
    pub fn from_grid(axes: &Axes, grid: &[Vec<Vec<u64>>]) -> Result<Self, ConfigError> {
        let (nt, nl, nd) = axes.shape();
        let ragged = |axis, expected, found| ConfigError::RaggedGrid {
            axis,
            expected,
            found,
        };
        if grid.len() != nt {
            return Err(ragged("thread", nt, grid.len()));
        }
        let mut space = Self::new();
        for (t, plane) in grid.iter().enumerate() {
            if plane.len() != nl {
                return Err(ragged("line", nl, plane.len()));
            }
            for (l, row) in plane.iter().enumerate() {
                if row.len() != nd {
                    return Err(ragged("directive", nd, row.len()));
                }
                for (d, &runtime) in row.iter().enumerate() {
                    if let Some(configuration) = axes.configuration(t, l, d) {
                        space.record(configuration, runtime);
                    }
                }
            }
        }
        Ok(space)
    }

    pub fn record(&mut self, configuration: Configuration, runtime: u64) {
        self.entries.push(Entry {
            configuration,
            runtime,
        });
    }

    pub fn skip(&mut self, configuration: Configuration, reason: String) {
        self.skipped.push(Skipped {
            configuration,
            reason,
        });
    }

    pub fn get(&self, configuration: &Configuration) -> Option<u64> {
        self.entries
            .iter()
            .find(|e| &e.configuration == configuration)
            .map(|e| e.runtime)
    }

    /// Runtime at grid coordinates of `axes`.
    pub fn at(&self, axes: &Axes, thread: usize, line: usize, directive: usize) -> Option<u64> {
        self.get(&axes.configuration(thread, line, directive)?)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn skipped(&self) -> &[Skipped] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What the controller does when a configuration cannot be measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    #[default]
    Abort,
    Skip,
    /// Re-measure up to this many extra times, then abort.
    Retry(u32),
}

/// Everything about the file under test that stays fixed for a run.
#[derive(Debug, Clone)]
pub struct Target {
    pub source: PathBuf,
    pub executable: PathBuf,
    pub thread_define: String,
    pub working_dir: Option<PathBuf>,
    pub repeat: NonZeroUsize,
    pub policy: FailurePolicy,
}

/// Checks that need the snapshot: every line must exist and the file must
/// carry a thread declaration to rewrite.
pub fn validate(snapshot: &SourceSnapshot, axes: &Axes, thread_define: &str) -> Result<(), ConfigError> {
    if let Some(&line) = axes.lines().iter().find(|&&l| l > snapshot.len()) {
        return Err(ConfigError::LineOutOfRange {
            line,
            len: snapshot.len(),
        });
    }
    if !snapshot.has_declaration(thread_define) {
        return Err(ConfigError::MissingThreadDeclaration(thread_define.to_string()));
    }
    Ok(())
}

enum Outcome {
    Measured(u64),
    Skipped(String),
}

pub struct Sweep<'a, B: Bench> {
    bench: &'a mut B,
    target: &'a Target,
}

impl<'a, B: Bench> Sweep<'a, B> {
    pub fn new(bench: &'a mut B, target: &'a Target) -> Self {
        Self { bench, target }
    }

    /// Sequential time of the untouched source. Must run before any mutation.
    pub fn run_baseline(&mut self) -> Result<u64> {
        let wd = self.target.working_dir.as_deref();
        Ok(cycle::measure(
            &mut *self.bench,
            &self.target.executable,
            self.target.repeat,
            wd,
        )?)
    }

    /// Measure every configuration of `axes`. The source is back to
    /// `snapshot` when this returns, whether it succeeded or not.
    pub fn run_sweep(
        &mut self,
        snapshot: &SourceSnapshot,
        axes: &Axes,
        reporter: &mut Reporter,
    ) -> Result<ResultSpace> {
        let outcome = self.sweep_all(snapshot, axes, reporter);
        let restored = snapshot.restore(&self.target.source);
        let space = outcome?;
        restored?;
        Ok(space)
    }

    fn sweep_all(
        &mut self,
        snapshot: &SourceSnapshot,
        axes: &Axes,
        reporter: &mut Reporter,
    ) -> Result<ResultSpace> {
        validate(snapshot, axes, &self.target.thread_define)?;

        let mut space = ResultSpace::new();
        for configuration in axes.configurations() {
            match self.measure_configuration(snapshot, &configuration, reporter)? {
                Outcome::Measured(runtime) => {
                    reporter.result(&configuration, runtime)?;
                    space.record(configuration, runtime);
                }
                Outcome::Skipped(reason) => space.skip(configuration, reason),
            }
        }
        Ok(space)
    }

    fn measure_configuration(
        &mut self,
        snapshot: &SourceSnapshot,
        configuration: &Configuration,
        reporter: &mut Reporter,
    ) -> Result<Outcome> {
        let mut attempt = 0;
        loop {
            let target = self.target;
            let bench = &mut *self.bench;
            let result = snapshot.with_configuration(
                &target.source,
                &target.thread_define,
                configuration.threads,
                configuration.line,
                &configuration.directive,
                || {
                    Ok(cycle::measure(
                        bench,
                        &target.executable,
                        target.repeat,
                        target.working_dir.as_deref(),
                    )?)
                },
            );

            match (result, target.policy) {
                (Ok(runtime), _) => return Ok(Outcome::Measured(runtime)),
                (Err(Error::Measurement(e)), FailurePolicy::Skip) => {
                    reporter.note(&format!("skipping {}: {}", configuration, e));
                    return Ok(Outcome::Skipped(e.to_string()));
                }
                (Err(Error::Measurement(e)), FailurePolicy::Retry(limit)) if attempt < limit => {
                    attempt += 1;
                    reporter.note(&format!(
                        "retrying {} ({}/{}): {}",
                        configuration, attempt, limit, e
                    ));
                }
                (Err(e), _) => return Err(e),
            }
        }
    }
}
