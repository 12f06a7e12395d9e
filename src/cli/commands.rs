//! CLI command implementations

use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use testdrive_core::config::PARALLELISM_KEY;
use testdrive_core::filters::redundant_pairs;
use testdrive_core::{ConfigTree, TestFilter};

use super::reporter::ConsoleHooks;
use super::{CliError, CliResult, ExitCode, SuiteArgs};
use crate::driver::{CancelToken, DriveError, Driver, RunOptions, Target};
use crate::executor::ProcessExecutor;
use crate::suite::SuitefileLoader;

/// Run the selected test cases and print their results.
pub fn run_tests(
    suite: &SuiteArgs,
    store: Option<PathBuf>,
    parallelism: Option<usize>,
    verbose: bool,
) -> CliResult<ExitCode> {
    let filters = parse_filters(&suite.filters)?;
    let mut config = build_config(&suite.variables)?;
    if let Some(parallelism) = parallelism {
        config
            .set(PARALLELISM_KEY, parallelism.to_string())
            .map_err(|e| CliError::usage(format!("Error: {}", e)))?;
    }

    let mut options = run_options(suite);
    if let Some(store) = store {
        options = options.with_store_path(store);
    }

    let driver = default_driver();
    let cancel = CancelToken::new();
    let mut hooks = ConsoleHooks::new(io::stdout().lock(), verbose);

    let result = runtime()?
        .block_on(async {
            let interrupt = tokio::spawn(cancel_on_interrupt(cancel.clone()));
            let result = driver.drive(&options, &filters, &config, &cancel, &mut hooks).await;
            interrupt.abort();
            result
        })
        .map_err(drive_error)?;

    let (_, tally) = hooks
        .finish()
        .map_err(|e| CliError::failure(format!("Error writing test results: {}", e)))?;

    report_unused(&result.unused_filters);
    if result.cancelled {
        eprintln!("Run cancelled; test cases that had not started were skipped.");
    }

    if tally.all_good() && result.unused_filters.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Print the selected test cases without running them.
pub fn list_tests(suite: &SuiteArgs, verbose: bool) -> CliResult<ExitCode> {
    let filters = parse_filters(&suite.filters)?;
    let options = run_options(suite);

    let driver = default_driver();
    let listed = runtime()?
        .block_on(driver.list(&options, &filters))
        .map_err(drive_error)?;

    let write_error = |e: io::Error| CliError::failure(format!("Error writing test list: {}", e));
    let mut out = io::stdout().lock();
    for entry in &listed.selection {
        writeln!(out, "{}:{}", entry.program.relative_path().display(), entry.case_name()).map_err(write_error)?;
        if verbose {
            for line in metadata_lines(&entry.target, &entry.program) {
                writeln!(out, "    {}", line).map_err(write_error)?;
            }
        }
    }
    out.flush().map_err(write_error)?;

    report_unused(&listed.unused_filters);
    if listed.unused_filters.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Parse command-line filters, warning about duplicates and overlaps.
pub fn parse_filters(raw: &[String]) -> CliResult<BTreeSet<TestFilter>> {
    let mut filters = BTreeSet::new();
    for text in raw {
        let filter: TestFilter = text.parse().map_err(|e| CliError::usage(format!("Error: {}", e)))?;
        if !filters.insert(filter) {
            eprintln!("Warning: duplicate filter '{}'", text);
        }
    }

    for (broad, narrow) in redundant_pairs(&filters) {
        eprintln!("Warning: filter '{}' already selects everything '{}' does", broad, narrow);
    }

    Ok(filters)
}

/// Build the run configuration from `key=value` overrides.
pub fn build_config(variables: &[String]) -> CliResult<ConfigTree> {
    let mut config = ConfigTree::new();
    for assignment in variables {
        config
            .set_override(assignment)
            .map_err(|e| CliError::usage(format!("Error: {}", e)))?;
    }
    Ok(config)
}

fn run_options(suite: &SuiteArgs) -> RunOptions {
    let mut options = RunOptions::new(&suite.suite_root);
    if let Some(definitions) = &suite.definitions {
        options = options.with_definitions(definitions);
    }
    if let Some(build_root) = &suite.build_root {
        options = options.with_build_root(build_root);
    }
    options
}

fn default_driver() -> Driver {
    Driver::new(Arc::new(SuitefileLoader), Arc::new(ProcessExecutor))
}

fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::failure(format!("Error: cannot start async runtime: {}", e)))
}

async fn cancel_on_interrupt(cancel: CancelToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("interrupted; cancelling run");
        cancel.cancel();
    }
}

fn drive_error(err: DriveError) -> CliError {
    match err {
        DriveError::Config(e) => CliError::usage(format!("Error: {}", e)),
        DriveError::Load(e) => CliError::failure(format!("Error: {}", e)),
    }
}

fn report_unused(unused: &BTreeSet<TestFilter>) {
    for filter in unused {
        eprintln!("No test cases matched by the filter '{}'.", filter);
    }
}

fn metadata_lines(target: &Target, program: &testdrive_core::TestProgram) -> Vec<String> {
    let case = match target {
        Target::ListingFailure(reason) => return vec![format!("listing_failure = {}", reason)],
        Target::Case(case) => case,
    };

    let metadata = case.metadata();
    let mut lines = vec![
        format!("interface = {}", program.interface()),
        format!("test_suite = {}", program.test_suite()),
        format!("timeout = {}", metadata.timeout.as_secs()),
    ];
    if let Some(description) = &metadata.description {
        lines.push(format!("description = {}", description));
    }
    if let Some(reason) = &metadata.expected_failure {
        lines.push(format!("expected_failure = {}", reason));
    }
    if !metadata.required_configs.is_empty() {
        lines.push(format!("required_configs = {}", metadata.required_configs.join(" ")));
    }
    if !metadata.required_programs.is_empty() {
        let programs: Vec<String> = metadata
            .required_programs
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        lines.push(format!("required_programs = {}", programs.join(" ")));
    }
    lines
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use testdrive_core::{Interface, Metadata, TestCase, TestProgram};

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_filters_collapses_duplicates() {
        let filters = parse_filters(&strings(&["dir/prog:a", "./dir/prog:a", "other"])).unwrap();
        let printed: Vec<String> = filters.iter().map(ToString::to_string).collect();
        assert_eq!(printed, ["dir/prog:a", "other"]);
    }

    #[test]
    fn test_bad_filter_is_usage_error() {
        let err = parse_filters(&strings(&["dir/prog", "/abs"])).unwrap_err();
        assert_eq!(err.exit_code, ExitCode::USAGE);
        assert!(err.message.starts_with("Error: "));
    }

    #[test]
    fn test_build_config() {
        let config = build_config(&strings(&["parallelism=3", "test_suites.s.host=a=b"])).unwrap();
        assert_eq!(config.parallelism(), Ok(3));
        assert_eq!(config.test_suite_var("s", "host"), Some("a=b"));

        let err = build_config(&strings(&["novalue"])).unwrap_err();
        assert_eq!(err.exit_code, ExitCode::USAGE);
    }

    #[test]
    fn test_metadata_lines() {
        let metadata = Metadata {
            description: Some("Checks the resolver".to_string()),
            expected_failure: Some("Flaky on IPv6".to_string()),
            required_configs: strings(&["server", "port"]),
            ..Metadata::default()
        };
        let case = TestCase::new("a", metadata.clone());
        let program = TestProgram::new(Interface::Listing, "net/resolver", "/b", "net", metadata, vec![case.clone()]);

        assert_eq!(
            metadata_lines(&Target::Case(case), &program),
            [
                "interface = listing",
                "test_suite = net",
                "timeout = 300",
                "description = Checks the resolver",
                "expected_failure = Flaky on IPv6",
                "required_configs = server port",
            ]
        );
        assert_eq!(
            metadata_lines(&Target::ListingFailure("boom".to_string()), &program),
            ["listing_failure = boom"]
        );
    }
}
