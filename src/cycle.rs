// Build-run-measure cycle.
// One attempt = compile, chmod +x, run, clean, then read the timing sample
// from the binary's stdout. Every step is a blocking external process.

use std::fmt;
use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{ConfigError, MeasurementError};

pub const DEFAULT_COMPILE_CMD: &str = "make";
pub const DEFAULT_CLEAN_CMD: &str = "make clean";
pub const DEFAULT_MARKER: &str = "Wall time";

/// Program plus arguments, split on whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    pub fn parse(text: &str, what: &'static str) -> Result<Self, ConfigError> {
        let mut words = text.split_whitespace().map(str::to_owned);
        let program = words.next().ok_or(ConfigError::EmptyCommand(what))?;
        Ok(Self {
            program,
            args: words.collect(),
        })
    }

    fn command(&self, working_dir: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Source of raw timing samples. The real implementation shells out to the
/// build toolchain; tests substitute their own.
pub trait Bench {
    fn measure_once(
        &mut self,
        executable: &Path,
        working_dir: Option<&Path>,
    ) -> Result<u64, MeasurementError>;
}

/// External compile/clean commands and the stdout marker of the timing line.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub compile: CommandLine,
    pub clean: CommandLine,
    pub marker: String,
    pub verbose: bool,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            compile: CommandLine {
                program: "make".into(),
                args: Vec::new(),
            },
            clean: CommandLine {
                program: "make".into(),
                args: vec!["clean".into()],
            },
            marker: DEFAULT_MARKER.into(),
            verbose: false,
        }
    }
}

impl Toolchain {
    fn run_status(
        &self,
        line: &CommandLine,
        working_dir: Option<&Path>,
        quiet: bool,
    ) -> Result<(), MeasurementError> {
        if self.verbose {
            eprintln!("+ {}", line);
        }
        let mut cmd = line.command(working_dir);
        if quiet {
            cmd.stdout(Stdio::null());
        }
        let status = cmd.status().map_err(|source| MeasurementError::Launch {
            command: line.to_string(),
            source,
        })?;
        if !status.success() {
            return Err(MeasurementError::ExitStatus {
                command: line.to_string(),
                status: status.to_string(),
            });
        }
        Ok(())
    }

    fn run_binary(
        &self,
        executable: &Path,
        working_dir: Option<&Path>,
    ) -> Result<String, MeasurementError> {
        mark_executable(executable)?;
        if self.verbose {
            eprintln!("+ {}", executable.display());
        }
        let mut cmd = Command::new(executable);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        let output = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|source| MeasurementError::Launch {
                command: executable.display().to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(MeasurementError::ExitStatus {
                command: executable.display().to_string(),
                status: output.status.to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Bench for Toolchain {
    fn measure_once(
        &mut self,
        executable: &Path,
        working_dir: Option<&Path>,
    ) -> Result<u64, MeasurementError> {
        self.run_status(&self.compile, working_dir, false)?;
        // clean runs even when the binary failed
        let run = self.run_binary(executable, working_dir);
        let clean = self.run_status(&self.clean, working_dir, true);
        let stdout = run?;
        clean?;

        match parse_timing(&stdout, &self.marker) {
            Timing::Sample(value) => Ok(value),
            Timing::OutOfRange(value) => Err(MeasurementError::TimingOutOfRange {
                value: value.to_string(),
                marker: self.marker.clone(),
                executable: executable.to_path_buf(),
            }),
            Timing::Missing => Err(MeasurementError::NoTimingLine {
                marker: self.marker.clone(),
                executable: executable.to_path_buf(),
            }),
        }
    }
}

/// Average of `repeat` samples, truncated. Any failed attempt fails the call.
pub fn measure<B: Bench + ?Sized>(
    bench: &mut B,
    executable: &Path,
    repeat: NonZeroUsize,
    working_dir: Option<&Path>,
) -> Result<u64, MeasurementError> {
    let mut total: u128 = 0;
    for _ in 0..repeat.get() {
        total += u128::from(bench.measure_once(executable, working_dir)?);
    }
    Ok((total / repeat.get() as u128) as u64)
}

/// What the binary's stdout says about its runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing<'a> {
    Sample(u64),
    /// The marker line carries an integer too large for a sample.
    OutOfRange(&'a str),
    Missing,
}

/// First whole-word integer on the first marker line that has one.
pub fn parse_timing<'a>(stdout: &'a str, marker: &str) -> Timing<'a> {
    let token = stdout
        .lines()
        .filter(|line| line.starts_with(marker))
        .find_map(first_word_integer);
    match token {
        Some(digits) => digits
            .parse()
            .map_or(Timing::OutOfRange(digits), Timing::Sample),
        None => Timing::Missing,
    }
}

fn first_word_integer(line: &str) -> Option<&str> {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let chars: Vec<(usize, char)> = line.char_indices().collect();

    let mut i = 0;
    while i < chars.len() {
        if !chars[i].1.is_ascii_digit() {
            i += 1;
            continue;
        }
        let mut j = i;
        while j < chars.len() && chars[j].1.is_ascii_digit() {
            j += 1;
        }
        let start = chars[i].0;
        let end = chars.get(j).map_or(line.len(), |&(k, _)| k);
        let left = i == 0 || !is_word(chars[i - 1].1);
        let right = j == chars.len() || !is_word(chars[j].1);
        if left && right {
            return Some(&line[start..end]);
        }
        i = j;
    }
    None
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<(), MeasurementError> {
    use std::os::unix::fs::PermissionsExt;

    let to_err = |source: std::io::Error| MeasurementError::Permissions {
        path: path.to_path_buf(),
        source,
    };
    let mut perms = fs::metadata(path).map_err(to_err)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(path, perms).map_err(to_err)
}

#[cfg(not(unix))]
fn mark_executable(path: &Path) -> Result<(), MeasurementError> {
    fs::metadata(path)
        .map(|_| ())
        .map_err(|source| MeasurementError::Permissions {
            path: path.to_path_buf(),
            source,
        })
}
