// Command-line options and the validated settings built from them once at
// startup. Nothing downstream reads the command line or any global state.

use std::env;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};

use crate::cycle::{CommandLine, Toolchain, DEFAULT_CLEAN_CMD, DEFAULT_COMPILE_CMD, DEFAULT_MARKER};
use crate::error::{ConfigError, Error, Result};
use crate::mutator::DEFAULT_THREAD_DEFINE;
use crate::sweep::{Axes, FailurePolicy, Target};

pub const DEFAULT_N_EXECUTIONS: usize = 5;
pub const DEFAULT_N_THREADS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FailureMode {
    /// Stop the whole run on the first failed configuration
    Abort,
    /// Record the failure and move on to the next configuration
    Skip,
    /// Measure the configuration again, up to --retries times
    Retry,
}

/// Find the fastest OpenMP directive and thread count for a source line.
///
/// Assumes a makefile in the working directory: `make` builds the program
/// and `make clean` removes objects and executables. The program must print
/// a line starting with "Wall time" followed by its runtime.
///
/// Example: parallelizer --source prog.c --lines 5,6,8 --directives directives.txt --num-threads 2,4 --save-results results.txt
#[derive(Debug, Parser)]
#[command(name = "parallelizer", version)]
pub struct Cli {
    /// Path to the parallelizable source file
    #[arg(long, value_name = "PATH")]
    pub source: PathBuf,

    /// Lines where a directive is placed, one at a time. First line is 1
    #[arg(long, value_name = "L1,L2,...", value_delimiter = ',', required = true)]
    pub lines: Vec<usize>,

    /// File with one parallelization directive per line
    #[arg(long, value_name = "PATH")]
    pub directives: PathBuf,

    /// Thread counts written into the thread declaration, each at least 2
    #[arg(long, alias = "num_threads", value_name = "N1,N2,...", value_delimiter = ',', default_values_t = [DEFAULT_N_THREADS])]
    pub num_threads: Vec<usize>,

    /// Runs per variant; their mean is reported
    #[arg(long, alias = "n_executions", value_name = "N", default_value_t = DEFAULT_N_EXECUTIONS)]
    pub n_executions: usize,

    /// Directory to build, run and clean in (defaults to the current one)
    #[arg(long, alias = "working_dir", value_name = "DIR")]
    pub working_dir: Option<PathBuf>,

    /// Also write every reported line to this file
    #[arg(long, alias = "save_results", value_name = "PATH")]
    pub save_results: Option<PathBuf>,

    /// Write a JSON report of the whole sweep to this file
    #[arg(long, value_name = "PATH")]
    pub json: Option<PathBuf>,

    #[arg(long, value_name = "CMD", default_value = DEFAULT_COMPILE_CMD)]
    pub compile_cmd: String,

    #[arg(long, value_name = "CMD", default_value = DEFAULT_CLEAN_CMD)]
    pub clean_cmd: String,

    /// Binary produced by the compile command [default: source without extension]
    #[arg(long, value_name = "PATH")]
    pub executable: Option<PathBuf>,

    /// Prefix of the output line carrying the runtime
    #[arg(long, value_name = "TEXT", default_value = DEFAULT_MARKER)]
    pub marker: String,

    /// Substring identifying the thread-count declaration to rewrite
    #[arg(long, value_name = "TEXT", default_value = DEFAULT_THREAD_DEFINE)]
    pub thread_define: String,

    #[arg(long, value_enum, default_value_t = FailureMode::Abort)]
    pub on_failure: FailureMode,

    /// Extra attempts per configuration with --on-failure retry
    #[arg(long, value_name = "K", default_value_t = 2)]
    pub retries: u32,

    /// Echo external commands and failure handling to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub target: Target,
    pub axes: Axes,
    pub toolchain: Toolchain,
    pub save_results: Option<PathBuf>,
    pub json: Option<PathBuf>,
}

impl Settings {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let source = fs::canonicalize(&cli.source)
            .map_err(|_| ConfigError::MissingSource(cli.source.clone()))?;

        let working_dir = match &cli.working_dir {
            Some(dir) if dir.is_dir() => {
                Some(fs::canonicalize(dir).map_err(|e| Error::io(dir, e))?)
            }
            Some(dir) => return Err(ConfigError::BadWorkingDir(dir.clone()).into()),
            None => None,
        };

        if let Some(&line) = cli.lines.iter().find(|&&l| l == 0) {
            return Err(ConfigError::InvalidLine(line).into());
        }
        if let Some(&n) = cli.num_threads.iter().find(|&&n| n < 2) {
            return Err(ConfigError::InvalidThreadCount(n).into());
        }
        let repeat = NonZeroUsize::new(cli.n_executions).ok_or(ConfigError::InvalidRepeat)?;

        let directives = load_directives(&cli.directives)?;
        let axes = Axes::new(cli.num_threads.iter().copied(), cli.lines.iter().copied(), directives);
        if axes.threads().is_empty() {
            return Err(ConfigError::EmptyAxis("thread count").into());
        }
        if axes.lines().is_empty() {
            return Err(ConfigError::EmptyAxis("line").into());
        }

        let base = match &working_dir {
            Some(dir) => dir.clone(),
            None => env::current_dir().map_err(|e| Error::io(".", e))?,
        };
        let executable = match &cli.executable {
            Some(exe) => base.join(exe),
            None => source.with_extension(""),
        };

        let policy = match cli.on_failure {
            FailureMode::Abort => FailurePolicy::Abort,
            FailureMode::Skip => FailurePolicy::Skip,
            FailureMode::Retry => FailurePolicy::Retry(cli.retries),
        };

        let toolchain = Toolchain {
            compile: CommandLine::parse(&cli.compile_cmd, "compile")?,
            clean: CommandLine::parse(&cli.clean_cmd, "clean")?,
            marker: cli.marker.clone(),
            verbose: cli.verbose,
        };

        Ok(Self {
            target: Target {
                source,
                executable,
                thread_define: cli.thread_define.clone(),
                working_dir,
                repeat,
                policy,
            },
            axes,
            toolchain,
            save_results: cli.save_results.clone(),
            json: cli.json.clone(),
        })
    }
}

/// Result log named on a command line that failed to parse, so the usage
/// error can still be written to it.
pub fn save_results_arg(args: &[String]) -> Option<PathBuf> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        for flag in ["--save-results", "--save_results"] {
            if arg == flag {
                return iter.next().filter(|v| !v.starts_with("--")).map(PathBuf::from);
            }
            if let Some(value) = arg.strip_prefix(flag).and_then(|r| r.strip_prefix('=')) {
                return Some(PathBuf::from(value));
            }
        }
    }
    None
}

/// One directive per line. Blank lines come back as empty strings and are
/// dropped later by the sweep axes.
pub fn load_directives(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::write(dir.path().join("prog.c"), "#define NUM_THREADS 1\nint main() {}\n").unwrap();
            fs::write(
                dir.path().join("directives.txt"),
                "#pragma omp parallel for\n\n#pragma omp single\n",
            )
            .unwrap();
            Self { dir }
        }

        fn parse(&self, extra: &[&str]) -> std::result::Result<Cli, clap::Error> {
            let source = self.dir.path().join("prog.c");
            let directives = self.dir.path().join("directives.txt");
            let mut args = vec![
                "parallelizer".to_string(),
                "--source".into(),
                source.display().to_string(),
                "--directives".into(),
                directives.display().to_string(),
            ];
            args.extend(extra.iter().map(|s| s.to_string()));
            Cli::try_parse_from(args)
        }
    }

    #[test]
    fn test_defaults() {
        let fx = Fixture::new();
        let cli = fx.parse(&["--lines", "5,6,8,6"]).unwrap();
        let settings = Settings::from_cli(&cli).unwrap();

        assert_eq!(settings.axes.lines(), [5, 6, 8]);
        assert_eq!(settings.axes.threads(), [DEFAULT_N_THREADS]);
        assert_eq!(settings.axes.directives(), ["#pragma omp parallel for", "#pragma omp single"]);
        assert_eq!(settings.target.repeat.get(), DEFAULT_N_EXECUTIONS);
        assert_eq!(settings.target.policy, FailurePolicy::Abort);
        assert_eq!(settings.target.executable, settings.target.source.with_extension(""));
        assert!(settings.target.executable.ends_with("prog"));
        assert_eq!(settings.toolchain.compile.to_string(), "make");
        assert_eq!(settings.toolchain.clean.to_string(), "make clean");
    }

    #[test]
    fn test_underscore_aliases() {
        let fx = Fixture::new();
        let out = fx.dir.path().join("out.txt");
        let cli = fx
            .parse(&[
                "--lines",
                "2",
                "--num_threads",
                "2,4,4",
                "--save_results",
                &out.display().to_string(),
            ])
            .unwrap();
        let settings = Settings::from_cli(&cli).unwrap();
        assert_eq!(settings.axes.threads(), [2, 4]);
        assert_eq!(settings.save_results, Some(out));
    }

    #[test]
    fn test_retry_policy() {
        let fx = Fixture::new();
        let cli = fx.parse(&["--lines", "1", "--on-failure", "retry", "--retries", "3"]).unwrap();
        let settings = Settings::from_cli(&cli).unwrap();
        assert_eq!(settings.target.policy, FailurePolicy::Retry(3));
    }

    #[test]
    fn test_lines_required() {
        let fx = Fixture::new();
        assert!(fx.parse(&[]).is_err());
        assert!(fx.parse(&["--lines", "3,x"]).is_err());
    }

    #[test]
    fn test_rejects_bad_values() {
        let fx = Fixture::new();

        let cli = fx.parse(&["--lines", "0"]).unwrap();
        assert!(matches!(Settings::from_cli(&cli), Err(Error::Config(ConfigError::InvalidLine(0)))));

        let cli = fx.parse(&["--lines", "1", "--num-threads", "1"]).unwrap();
        assert!(matches!(
            Settings::from_cli(&cli),
            Err(Error::Config(ConfigError::InvalidThreadCount(1)))
        ));

        let cli = fx.parse(&["--lines", "1", "--n-executions", "0"]).unwrap();
        assert!(matches!(Settings::from_cli(&cli), Err(Error::Config(ConfigError::InvalidRepeat))));

        let missing = fx.dir.path().join("nowhere");
        let cli = fx
            .parse(&["--lines", "1", "--working-dir", &missing.display().to_string()])
            .unwrap();
        assert!(matches!(Settings::from_cli(&cli), Err(Error::Config(ConfigError::BadWorkingDir(_)))));

        let cli = fx.parse(&["--lines", "1", "--compile-cmd", " "]).unwrap();
        assert!(matches!(
            Settings::from_cli(&cli),
            Err(Error::Config(ConfigError::EmptyCommand("compile")))
        ));
    }

    #[test]
    fn test_missing_source() {
        let cli = Cli::try_parse_from([
            "parallelizer",
            "--source",
            "/definitely/not/here.c",
            "--lines",
            "1",
            "--directives",
            "d.txt",
        ])
        .unwrap();
        assert!(matches!(Settings::from_cli(&cli), Err(Error::Config(ConfigError::MissingSource(_)))));
    }

    #[test]
    fn test_executable_relative_to_working_dir() {
        let fx = Fixture::new();
        let wd = fx.dir.path().display().to_string();
        let cli = fx
            .parse(&["--lines", "1", "--working-dir", &wd, "--executable", "bin/prog"])
            .unwrap();
        let settings = Settings::from_cli(&cli).unwrap();
        let wd = settings.target.working_dir.clone().unwrap();
        assert_eq!(settings.target.executable, wd.join("bin/prog"));
    }

    #[test]
    fn test_save_results_arg() {
        let args = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert_eq!(
            save_results_arg(&args(&["parallelizer", "--lines", "3,x", "--save-results", "out.txt"])),
            Some(PathBuf::from("out.txt"))
        );
        assert_eq!(
            save_results_arg(&args(&["parallelizer", "--save_results=log.txt"])),
            Some(PathBuf::from("log.txt"))
        );
        assert_eq!(save_results_arg(&args(&["parallelizer", "--save-results", "--lines"])), None);
        assert_eq!(save_results_arg(&args(&["parallelizer", "--lines", "1"])), None);
    }

    #[test]
    fn test_load_directives_strips_carriage_returns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.txt");
        fs::write(&path, "#pragma omp parallel for\r\n\r\n#pragma omp single").unwrap();
        assert_eq!(
            load_directives(&path).unwrap(),
            ["#pragma omp parallel for", "", "#pragma omp single"]
        );
    }
}
