//! Progress hooks invoked by the driver.

use std::time::Duration;

use testdrive_core::{Outcome, TestProgram};

/// Observer notified as test cases start and finish.
///
/// The driver calls hooks from a single place, one call at a time, so implementations do not need to be
/// thread-safe even when test cases run concurrently. For every reported case `got_test_case` comes
/// strictly before `got_result`; there is no ordering between different cases.
///
/// Hooks must return promptly: the next notification waits for the current one.
pub trait RunHooks {
    /// Called when the processing of a test case begins.
    fn got_test_case(&mut self, program: &TestProgram, case_name: &str);

    /// Called when the result of a test case becomes available.
    fn got_result(&mut self, program: &TestProgram, case_name: &str, outcome: &Outcome, duration: Duration);
}
