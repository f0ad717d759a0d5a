// Output sink. Every line goes to stdout and, if a result log was asked for,
// to that file as well: the first line truncates it, later lines append.
// The line formats are consumed by existing tooling; keep them exact.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::analyzer::OptimalResult;
use crate::error::{Error, Result};
use crate::sweep::{Configuration, ResultSpace};

pub struct Reporter {
    log_path: Option<PathBuf>,
    log: Option<File>,
    verbose: bool,
}

impl Reporter {
    pub fn new(log_path: Option<PathBuf>, verbose: bool) -> Self {
        Self {
            log_path,
            log: None,
            verbose,
        }
    }

    pub fn emit(&mut self, line: &str) -> Result<()> {
        println!("{}", line);

        let Some(path) = &self.log_path else {
            return Ok(());
        };
        if self.log.is_none() {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
                .map_err(|e| Error::io(path, e))?;
            self.log = Some(file);
        }
        if let Some(file) = self.log.as_mut() {
            writeln!(file, "{}", line).map_err(|e| Error::io(path, e))?;
        }
        Ok(())
    }

    /// Diagnostics for `--verbose`; never written to the result log.
    pub fn note(&self, message: &str) {
        if self.verbose {
            eprintln!("{}", message);
        }
    }

    pub fn sequential(&mut self, baseline: u64) -> Result<()> {
        self.emit(&format!("Sequential time: {}", baseline))
    }

    pub fn result(&mut self, configuration: &Configuration, runtime: u64) -> Result<()> {
        self.emit(&result_line(configuration, runtime))
    }

    pub fn optimal(&mut self, optimal: &OptimalResult) -> Result<()> {
        for line in summary_lines(optimal) {
            self.emit(&line)?;
        }
        Ok(())
    }
}

pub fn result_line(configuration: &Configuration, runtime: u64) -> String {
    format!(
        "Results with directive \"{}\" and {} threads in line {}: {} ms",
        configuration.directive, configuration.threads, configuration.line, runtime
    )
}

pub fn summary_lines(optimal: &OptimalResult) -> [String; 3] {
    let c = &optimal.configuration;
    [
        format!(
            "The best parallelization was obtained with {} threads in line {} using directive \"{}\" with a runtime of {} ms",
            c.threads, c.line, c.directive, optimal.runtime
        ),
        format!(
            "Speedup = Ts/Tp = {}/{} = {}",
            optimal.baseline,
            optimal.runtime,
            ratio(optimal.speedup)
        ),
        format!(
            "Efficiency = Speedup/N_Cores = {}/{} = {}",
            ratio(optimal.speedup),
            c.threads,
            ratio(optimal.efficiency)
        ),
    ]
}

/// Shortest round-trip form, but always with a decimal point: 5.0, 1.25.
pub fn ratio(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    source: &'a Path,
    sequential_time: u64,
    results: &'a ResultSpace,
    optimal: &'a OptimalResult,
}

/// Machine-readable dump of a finished run.
pub fn write_json(
    path: &Path,
    source: &Path,
    baseline: u64,
    results: &ResultSpace,
    optimal: &OptimalResult,
) -> Result<()> {
    let report = JsonReport {
        source,
        sequential_time: baseline,
        results,
        optimal,
    };
    let json = serde_json::to_string_pretty(&report).map_err(|e| Error::io(path, e.into()))?;
    std::fs::write(path, json + "\n").map_err(|e| Error::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::find_optimal;
    use crate::sweep::Axes;

    fn optimal() -> (ResultSpace, OptimalResult) {
        let axes = Axes::new([2, 4], [14], ["#pragma omp parallel for", "#pragma omp single"]);
        let space = ResultSpace::from_grid(&axes, &[vec![vec![400, 300]], vec![vec![100, 350]]]).unwrap();
        let best = find_optimal(&space, 500).unwrap();
        (space, best)
    }

    #[test]
    fn test_ratio_format() {
        assert_eq!(ratio(5.0), "5.0");
        assert_eq!(ratio(1.25), "1.25");
        assert_eq!(ratio(0.5), "0.5");
        assert_eq!(ratio(12.0), "12.0");
    }

    #[test]
    fn test_result_line() {
        let c = Configuration {
            threads: 4,
            line: 14,
            directive: "#pragma omp parallel for".into(),
        };
        assert_eq!(
            result_line(&c, 812),
            "Results with directive \"#pragma omp parallel for\" and 4 threads in line 14: 812 ms"
        );
    }

    #[test]
    fn test_summary_lines() {
        let (_, best) = optimal();
        let lines = summary_lines(&best);
        assert_eq!(
            lines[0],
            "The best parallelization was obtained with 4 threads in line 14 using directive \"#pragma omp parallel for\" with a runtime of 100 ms"
        );
        assert_eq!(lines[1], "Speedup = Ts/Tp = 500/100 = 5.0");
        assert_eq!(lines[2], "Efficiency = Speedup/N_Cores = 5.0/4 = 1.25");
    }

    #[test]
    fn test_log_truncates_then_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.txt");
        std::fs::write(&path, "stale\n").unwrap();

        let mut reporter = Reporter::new(Some(path.clone()), false);
        reporter.emit("Running original source to extract sequential time").unwrap();
        reporter.sequential(1234).unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Running original source to extract sequential time\nSequential time: 1234\n"
        );
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let (space, best) = optimal();

        write_json(&path, Path::new("prog.c"), 500, &space, &best).unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["sequential_time"], 500);
        assert_eq!(value["results"]["entries"].as_array().unwrap().len(), 4);
        assert_eq!(value["results"]["entries"][2]["threads"], 4);
        assert_eq!(value["results"]["entries"][2]["runtime"], 100);
        assert_eq!(value["optimal"]["configuration"]["line"], 14);
        assert_eq!(value["optimal"]["speedup"], 5.0);
    }
}
