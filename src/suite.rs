//! Suitefile-based test suite loader.
//!
//! A suite is described by JSON `Suitefile`s:
//!
//! ```json
//! {
//!     "syntax": 1,
//!     "test_suite": "net",
//!     "include": ["client/Suitefile"],
//!     "test_programs": [
//!         { "name": "resolver_test", "interface": "listing", "timeout": 60 },
//!         { "name": "smoke", "required_configs": ["server"] }
//!     ]
//! }
//! ```
//!
//! Program names are relative to the directory of the file declaring them; binaries are looked up under
//! the build root at the same relative location. Programs are returned in declaration order, each file's
//! own programs before those of its includes.
//!
//! Test programs are spawned from their own directory, so the build root is made absolute before any
//! binary path is derived from it.
//!
//! Problems with the definitions themselves abort the load. Problems with a single program (missing
//! binary, failed `--list`) are attached to that program and reported when the suite runs.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use testdrive_core::{Interface, Metadata, TestCase, TestProgram, TestSuite};

use crate::interfaces::{LoadError, SuiteLoader};

/// File name of the top-level definitions under a suite root.
pub const DEFAULT_DEFINITIONS: &str = "Suitefile";

/// Name of the single test case exposed by `plain` programs.
pub const PLAIN_CASE: &str = "main";

/// Argument asking a `listing` program to print its test case names.
pub const LIST_FLAG: &str = "--list";

const SUPPORTED_SYNTAX: u32 = 1;

// ============================================================================
// Suitefile documents
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SuitefileDoc {
    syntax: u32,
    #[serde(default)]
    test_suite: Option<String>,
    #[serde(default)]
    include: Vec<PathBuf>,
    #[serde(default)]
    test_programs: Vec<ProgramDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProgramDoc {
    name: PathBuf,
    #[serde(default)]
    interface: Option<String>,
    #[serde(default)]
    test_suite: Option<String>,
    /// Seconds.
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    required_configs: Vec<String>,
    #[serde(default)]
    required_programs: Vec<PathBuf>,
    #[serde(default)]
    description: Option<String>,
    /// Why the program's test cases are known to fail.
    #[serde(default)]
    expected_failure: Option<String>,
}

/// A program as declared, before its binary is inspected.
#[derive(Debug)]
struct Declared {
    relative_path: PathBuf,
    interface: Interface,
    test_suite: String,
    metadata: Metadata,
}

// ============================================================================
// Loader
// ============================================================================

/// Default [`SuiteLoader`] reading `Suitefile`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuitefileLoader;

#[async_trait]
impl SuiteLoader for SuitefileLoader {
    #[tracing::instrument(skip_all, fields(suite_root = %suite_root.display()))]
    async fn load(
        &self,
        suite_root: &Path,
        definitions: Option<&Path>,
        build_root: &Path,
    ) -> Result<TestSuite, LoadError> {
        let build_root = std::path::absolute(build_root).map_err(|source| LoadError::BuildRoot {
            path: build_root.to_path_buf(),
            source,
        })?;
        let top = definitions
            .map(Path::to_path_buf)
            .unwrap_or_else(|| suite_root.join(DEFAULT_DEFINITIONS));
        let top_dir = top
            .parent()
            .and_then(|dir| dir.strip_prefix(suite_root).ok())
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mut declared = Vec::new();
        let mut chain = Vec::new();
        read_definitions(&top, &top_dir, None, &mut chain, &mut declared)?;

        let mut seen = HashSet::new();
        for program in &declared {
            if !seen.insert(program.relative_path.clone()) {
                return Err(LoadError::Invalid {
                    path: top.clone(),
                    message: format!("Duplicate test program '{}'", program.relative_path.display()),
                });
            }
        }

        let mut programs = Vec::with_capacity(declared.len());
        for program in declared {
            programs.push(Arc::new(enumerate(program, &build_root).await));
        }
        Ok(TestSuite::new(programs))
    }
}

/// Parse `file` and its includes depth-first, appending declared programs to `out`.
///
/// `relative_dir` is the directory of `file` relative to the suite root; `chain` holds the files
/// currently being read, to detect include cycles.
fn read_definitions(
    file: &Path,
    relative_dir: &Path,
    inherited_suite: Option<&str>,
    chain: &mut Vec<PathBuf>,
    out: &mut Vec<Declared>,
) -> Result<(), LoadError> {
    if chain.iter().any(|open| open == file) {
        return Err(LoadError::IncludeCycle(file.to_path_buf()));
    }

    let text = fs::read_to_string(file).map_err(|source| LoadError::Read {
        path: file.to_path_buf(),
        source,
    })?;
    let doc: SuitefileDoc = serde_json::from_str(&text).map_err(|e| LoadError::Parse {
        path: file.to_path_buf(),
        message: e.to_string(),
    })?;
    let invalid = |message: String| LoadError::Invalid {
        path: file.to_path_buf(),
        message,
    };

    if doc.syntax != SUPPORTED_SYNTAX {
        return Err(invalid(format!(
            "Unsupported syntax version {} (expected {})",
            doc.syntax, SUPPORTED_SYNTAX
        )));
    }

    let file_suite = doc.test_suite.as_deref().or(inherited_suite);

    for program in doc.test_programs {
        let name = normalize_relative(&program.name)
            .ok_or_else(|| invalid(format!("Invalid test program name '{}'", program.name.display())))?;
        let interface = match program.interface.as_deref() {
            Some(raw) => raw.parse::<Interface>().map_err(&invalid)?,
            None => Interface::Plain,
        };
        let Some(test_suite) = program.test_suite.as_deref().or(file_suite) else {
            return Err(invalid(format!(
                "Test program '{}' does not belong to any test suite",
                name.display()
            )));
        };
        let timeout = match program.timeout {
            Some(0) => {
                return Err(invalid(format!(
                    "Timeout of test program '{}' must be positive",
                    name.display()
                )));
            }
            Some(secs) => Duration::from_secs(secs),
            None => Metadata::default().timeout,
        };

        out.push(Declared {
            relative_path: relative_dir.join(name),
            interface,
            test_suite: test_suite.to_string(),
            metadata: Metadata {
                timeout,
                required_configs: program.required_configs,
                required_programs: program.required_programs,
                description: program.description,
                expected_failure: program.expected_failure,
            },
        });
    }

    let base_dir = file.parent().unwrap_or(Path::new(""));
    chain.push(file.to_path_buf());
    for include in &doc.include {
        let Some(include) = normalize_relative(include) else {
            return Err(invalid(format!("Invalid include '{}'", include.display())));
        };
        let include_dir = include.parent().unwrap_or(Path::new(""));
        read_definitions(
            &base_dir.join(&include),
            &relative_dir.join(include_dir),
            file_suite,
            chain,
            out,
        )?;
    }
    chain.pop();

    Ok(())
}

/// Normalize a relative path, rejecting absolute paths, `..` and empty paths.
fn normalize_relative(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!normalized.as_os_str().is_empty()).then_some(normalized)
}

// ============================================================================
// Enumeration
// ============================================================================

/// Inspect the binary of a declared program and build its test case list.
async fn enumerate(program: Declared, build_root: &Path) -> TestProgram {
    let binary = build_root.join(&program.relative_path);

    let cases = match tokio::fs::metadata(&binary).await {
        Ok(meta) if meta.is_file() => match program.interface {
            Interface::Plain => Ok(vec![TestCase::new(PLAIN_CASE, program.metadata.clone())]),
            Interface::Listing => list_cases(&binary, program.metadata.timeout)
                .await
                .map(|names| {
                    names
                        .into_iter()
                        .map(|name| TestCase::new(name, program.metadata.clone()))
                        .collect()
                }),
        },
        Ok(_) => Err(format!("Test program '{}' is not a regular file", binary.display())),
        Err(_) => Err(format!("Test program '{}' does not exist", binary.display())),
    };

    match cases {
        Ok(cases) => TestProgram::new(
            program.interface,
            program.relative_path,
            build_root,
            program.test_suite,
            program.metadata,
            cases,
        ),
        Err(reason) => {
            tracing::warn!(
                program = %program.relative_path.display(),
                reason = %reason,
                "cannot enumerate test program"
            );
            TestProgram::with_listing_failure(
                program.interface,
                program.relative_path,
                build_root,
                program.test_suite,
                program.metadata,
                reason,
            )
        }
    }
}

/// Run `binary --list` and parse one case name per line.
async fn list_cases(binary: &Path, timeout: Duration) -> Result<Vec<String>, String> {
    let mut command = tokio::process::Command::new(binary);
    command
        .arg(LIST_FLAG)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    if let Some(dir) = binary.parent() {
        command.current_dir(dir);
    }

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(format!("Failed to execute test program to list its test cases: {}", e)),
        Err(_) => return Err("Timed out while listing test cases".to_string()),
    };

    if !output.status.success() {
        return Err(format!(
            "Test program exited with {} while listing its test cases",
            output.status
        ));
    }

    parse_case_list(&String::from_utf8_lossy(&output.stdout))
}

fn parse_case_list(stdout: &str) -> Result<Vec<String>, String> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    for line in stdout.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if !seen.insert(line) {
            return Err(format!("Duplicate test case '{}' in test case list", line));
        }
        names.push(line.to_string());
    }
    if names.is_empty() {
        return Err("Test program reported no test cases".to_string());
    }
    Ok(names)
}
