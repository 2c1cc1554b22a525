use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use jpdiff_harness::render::render_console;
use jpdiff_harness::report::write_report;
use jpdiff_harness::{HarnessConfig, HarnessError, Orchestrator, ReportDetail, RunReport};

#[derive(Debug, Clone, Default)]
struct Config {
    config_path: PathBuf,
    suite: Option<PathBuf>,
    fixtures: Option<PathBuf>,
    cases: Option<PathBuf>,
    output: Option<PathBuf>,
    workers: Option<usize>,
    timeout_ms: Option<u64>,
    reduced: bool,
    quiet: bool,
    fail_on_mismatch: bool,
}

impl Config {
    /// `Ok(None)` when help was requested.
    fn parse() -> Result<Option<Self>, String> {
        let mut config_path: Option<PathBuf> = None;
        let mut config = Self::default();

        let args: Vec<String> = env::args().skip(1).collect();
        let mut index = 0_usize;
        while index < args.len() {
            match args[index].as_str() {
                "--config" => {
                    index += 1;
                    let value = args
                        .get(index)
                        .ok_or_else(|| "missing value for --config".to_owned())?;
                    config_path = Some(PathBuf::from(value));
                }
                "--suite" => {
                    index += 1;
                    let value = args
                        .get(index)
                        .ok_or_else(|| "missing value for --suite".to_owned())?;
                    config.suite = Some(PathBuf::from(value));
                }
                "--fixtures" => {
                    index += 1;
                    let value = args
                        .get(index)
                        .ok_or_else(|| "missing value for --fixtures".to_owned())?;
                    config.fixtures = Some(PathBuf::from(value));
                }
                "--cases" => {
                    index += 1;
                    let value = args
                        .get(index)
                        .ok_or_else(|| "missing value for --cases".to_owned())?;
                    config.cases = Some(PathBuf::from(value));
                }
                "--output" => {
                    index += 1;
                    let value = args
                        .get(index)
                        .ok_or_else(|| "missing value for --output".to_owned())?;
                    config.output = Some(PathBuf::from(value));
                }
                "--workers" => {
                    index += 1;
                    let value = args
                        .get(index)
                        .ok_or_else(|| "missing value for --workers".to_owned())?;
                    config.workers = Some(
                        value
                            .parse()
                            .map_err(|_| format!("invalid --workers value: {value}"))?,
                    );
                }
                "--timeout-ms" => {
                    index += 1;
                    let value = args
                        .get(index)
                        .ok_or_else(|| "missing value for --timeout-ms".to_owned())?;
                    config.timeout_ms = Some(
                        value
                            .parse()
                            .map_err(|_| format!("invalid --timeout-ms value: {value}"))?,
                    );
                }
                "--reduced" => config.reduced = true,
                "--quiet" => config.quiet = true,
                "--fail-on-mismatch" => config.fail_on_mismatch = true,
                "--help" | "-h" => {
                    print_help();
                    return Ok(None);
                }
                other => return Err(format!("unknown_argument: {other}")),
            }
            index += 1;
        }

        config.config_path = config_path.ok_or_else(|| "--config is required".to_owned())?;
        Ok(Some(config))
    }

    /// Apply command-line overrides. Paths given on the command line are
    /// taken relative to the working directory, not the config file.
    fn apply(&self, harness: &mut HarnessConfig) {
        if let Some(suite) = &self.suite {
            harness.suite = Some(suite.clone());
        }
        if let Some(fixtures) = &self.fixtures {
            harness.fixtures = Some(fixtures.clone());
        }
        if let Some(cases) = &self.cases {
            harness.cases = Some(cases.clone());
        }
        if let Some(output) = &self.output {
            harness.output = Some(output.clone());
        }
        if let Some(workers) = self.workers {
            harness.workers = workers;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            harness.timeout_ms = timeout_ms;
        }
        if self.reduced {
            harness.report_detail = ReportDetail::Reduced;
        }
    }
}

fn print_help() {
    println!(
        "\
jpdiff_runner - differential conformance runner for JSONPath implementations

USAGE:
    jpdiff_runner --config <PATH> [OPTIONS]

OPTIONS:
  --config <PATH>          Harness config (adapters, inputs, defaults)
  --suite <PATH>           Combined {{fixtures, cases}} document
  --fixtures <PATH>        Fixture registry file or directory of <key>.json
  --cases <PATH>           Case document, replaces the suite's cases
  --output <PATH>          Write the JSON report here
  --workers <N>            Cases evaluated concurrently (default 1)
  --timeout-ms <MS>        Per-invocation timeout (default 10000)
  --reduced                Keep only count/error/hasValues per result
  --quiet                  Do not print the console report
  --fail-on-mismatch       Exit 1 when any case is not a perfect match
  -h, --help               Show help

EXIT CODES:
  0  run completed
  1  run completed with mismatches and --fail-on-mismatch was set
  2  configuration or input error, no report written
"
    );
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Returns whether the run passed.
fn run(cli: &Config) -> Result<bool, HarnessError> {
    let mut harness = HarnessConfig::load_file(&cli.config_path)?;
    cli.apply(&mut harness);

    let run_config = harness.build_run_config()?;
    let (cases, fixtures) = harness.load_inputs()?;
    let orchestrator = Orchestrator::new(run_config)?;

    let outcome = orchestrator.run(&cases, &fixtures);
    let report = RunReport::from_outcome(&outcome, harness.report_detail);

    if let Some(path) = &harness.output {
        write_report(path, &report)?;
    }
    if !cli.quiet {
        print!("{}", render_console(&report));
    }
    info!(
        total = report.summary.total,
        perfect_matches = report.summary.perfect_matches,
        "jpdiff_runner finished"
    );

    Ok(!cli.fail_on_mismatch || outcome.all_perfect())
}

fn main() -> ExitCode {
    init_tracing();

    let cli = match Config::parse() {
        Ok(Some(cli)) => cli,
        Ok(None) => return ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("ERROR jpdiff_runner: {message}");
            eprintln!("Run with --help for usage.");
            return ExitCode::from(2);
        }
    };

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            eprintln!("ERROR jpdiff_runner: mismatches found");
            ExitCode::from(1)
        }
        Err(err) => {
            error!(error = %err, "run aborted");
            eprintln!("ERROR jpdiff_runner failed: {err}");
            if let Some(hint) = err.suggestion() {
                eprintln!("  hint: {hint}");
            }
            ExitCode::from(err.exit_code())
        }
    }
}
