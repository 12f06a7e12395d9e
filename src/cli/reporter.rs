//! Console output for test runs.

use std::io::{self, Write};
use std::time::Duration;

use testdrive_core::{Outcome, OutcomeKind, TestProgram};

use crate::driver::RunHooks;

/// Counts accumulated while a run is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub total: usize,
    pub passed: usize,
    /// Results that are not good: failed and broken cases.
    pub failed: usize,
}

impl Tally {
    pub fn all_good(&self) -> bool {
        self.failed == 0
    }

    pub fn summary(&self) -> String {
        format!("{}/{} passed ({} failed)", self.passed, self.total, self.failed)
    }
}

/// [`RunHooks`] printing one line per result to `out`.
pub struct ConsoleHooks<W: Write> {
    out: W,
    verbose: bool,
    tally: Tally,
    error: Option<io::Error>,
}

impl<W: Write> ConsoleHooks<W> {
    pub fn new(out: W, verbose: bool) -> Self {
        Self {
            out,
            verbose,
            tally: Tally::default(),
            error: None,
        }
    }

    /// Print the summary line and hand back the output and the counts.
    ///
    /// Fails with the first write error seen during the run, if any.
    pub fn finish(mut self) -> io::Result<(W, Tally)> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        writeln!(self.out)?;
        writeln!(self.out, "{}", self.tally.summary())?;
        self.out.flush()?;
        Ok((self.out, self.tally))
    }

    fn emit(&mut self, line: std::fmt::Arguments<'_>) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = self.out.write_fmt(line).and_then(|()| self.out.write_all(b"\n")) {
            self.error = Some(err);
        }
    }
}

impl<W: Write> RunHooks for ConsoleHooks<W> {
    fn got_test_case(&mut self, program: &TestProgram, case_name: &str) {
        if self.verbose {
            self.emit(format_args!("{}:{}  ...", program.relative_path().display(), case_name));
        }
    }

    fn got_result(&mut self, program: &TestProgram, case_name: &str, outcome: &Outcome, duration: Duration) {
        self.tally.total += 1;
        if outcome.kind == OutcomeKind::Passed {
            self.tally.passed += 1;
        }
        if !outcome.is_good() {
            self.tally.failed += 1;
        }

        self.emit(format_args!(
            "{}:{}  ->  {}  [{:.3}s]",
            program.relative_path().display(),
            case_name,
            outcome,
            duration.as_secs_f64()
        ));
    }
}
