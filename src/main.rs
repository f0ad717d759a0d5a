// parallelizer: sweep thread counts x lines x directives over a C source
// file and report the fastest combination.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use omp_parallelizer::{
    analyzer, config, report, sweep, AnalysisError, Cli, Reporter, Settings, SourceSnapshot, Sweep,
};

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // --help and --version
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let args: Vec<String> = std::env::args().collect();
            let mut reporter = Reporter::new(config::save_results_arg(&args), false);
            let message = e.to_string();
            let message = message.strip_prefix("error: ").unwrap_or(&message).trim_end();
            if reporter.emit(&format!("ERROR: {}", message)).is_err() {
                eprintln!("ERROR: {}", message);
            }
            return ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1));
        }
    };
    let mut reporter = Reporter::new(cli.save_results.clone(), cli.verbose);

    match run(&cli, &mut reporter) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if reporter.emit(&format!("ERROR: {:#}", e)).is_err() {
                eprintln!("ERROR: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, reporter: &mut Reporter) -> anyhow::Result<()> {
    let settings = Settings::from_cli(cli).context("invalid arguments")?;
    let target = &settings.target;

    let snapshot = SourceSnapshot::capture(&target.source)?;
    sweep::validate(&snapshot, &settings.axes, &target.thread_define)?;
    if settings.axes.is_empty() {
        return Err(AnalysisError::EmptyResult)
            .context("no non-blank directives to try");
    }

    let mut toolchain = settings.toolchain.clone();
    let mut controller = Sweep::new(&mut toolchain, target);

    reporter.emit("Running original source to extract sequential time")?;
    let baseline = controller
        .run_baseline()
        .context("sequential run failed")?;
    reporter.sequential(baseline)?;

    let results = controller.run_sweep(&snapshot, &settings.axes, reporter)?;
    if !results.skipped().is_empty() {
        reporter.note(&format!(
            "{} of {} configurations skipped",
            results.skipped().len(),
            settings.axes.len()
        ));
    }

    let optimal = analyzer::find_optimal(&results, baseline)?;
    reporter.optimal(&optimal)?;

    if let Some(path) = &settings.json {
        report::write_json(path, &target.source, baseline, &results, &optimal)?;
    }
    Ok(())
}
