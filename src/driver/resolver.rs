//! Filter resolution: decide which test cases run and which filters each one satisfies.

use std::collections::BTreeSet;
use std::sync::Arc;

use testdrive_core::model::LISTING_FAILURE_CASE;
use testdrive_core::{TestCase, TestFilter, TestProgram, TestSuite};

/// Position of a filter in the filter list of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterId(usize);

impl FilterId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// What running a selected entry means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A regular test case, handed to the executor.
    Case(TestCase),
    /// The program could not be enumerated; reported as one broken result with this reason.
    ListingFailure(String),
}

/// A test case chosen to run, with the filters that chose it.
#[derive(Debug, Clone)]
pub struct SelectedCase {
    pub program: Arc<TestProgram>,
    pub target: Target,
    /// Filters selecting this case; empty when the run has no filters at all.
    pub filters: Vec<FilterId>,
}

impl SelectedCase {
    /// Name reported to hooks for this entry.
    pub fn case_name(&self) -> &str {
        match &self.target {
            Target::Case(case) => case.name(),
            Target::ListingFailure(_) => LISTING_FAILURE_CASE,
        }
    }
}

/// Ordered selection: programs in discovery order, cases in definition order.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    cases: Vec<SelectedCase>,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SelectedCase> {
        self.cases.iter()
    }
}

impl IntoIterator for Selection {
    type Item = SelectedCase;
    type IntoIter = std::vec::IntoIter<SelectedCase>;

    fn into_iter(self) -> Self::IntoIter {
        self.cases.into_iter()
    }
}

impl<'a> IntoIterator for &'a Selection {
    type Item = &'a SelectedCase;
    type IntoIter = std::slice::Iter<'a, SelectedCase>;

    fn into_iter(self) -> Self::IntoIter {
        self.cases.iter()
    }
}

/// Resolve `filters` against `suite`.
///
/// ## Parameters
/// - `filters`: the run's filters; their positions become the [`FilterId`]s in the result.
/// - `suite`: the loaded test tree.
///
/// ## Returns
/// - (`Selection`): every case selected by at least one filter, or every case when `filters` is empty.
///
/// ## Notes
/// - A program that could not be enumerated contributes a single listing-failure entry when any filter
///   points at the program, including case-scoped filters naming one of its (unknown) cases.
#[tracing::instrument(skip_all, fields(filters = filters.len(), programs = suite.programs().len()))]
pub fn select(filters: &[TestFilter], suite: &TestSuite) -> Selection {
    let mut cases = Vec::new();

    for program in suite.programs() {
        let path = program.relative_path();
        match program.test_cases() {
            Ok(test_cases) => {
                for case in test_cases {
                    let matching = matching_filters(filters, |filter| filter.matches(path, case.name()));
                    if filters.is_empty() || !matching.is_empty() {
                        cases.push(SelectedCase {
                            program: Arc::clone(program),
                            target: Target::Case(case.clone()),
                            filters: matching,
                        });
                    }
                }
            }
            Err(reason) => {
                let matching = matching_filters(filters, |filter| filter.matches_program(path));
                if filters.is_empty() || !matching.is_empty() {
                    cases.push(SelectedCase {
                        program: Arc::clone(program),
                        target: Target::ListingFailure(reason.to_string()),
                        filters: matching,
                    });
                }
            }
        }
    }

    tracing::debug!(selected = cases.len(), "resolved filters against test suite");
    Selection { cases }
}

fn matching_filters(filters: &[TestFilter], predicate: impl Fn(&TestFilter) -> bool) -> Vec<FilterId> {
    filters
        .iter()
        .enumerate()
        .filter(|(_, filter)| predicate(filter))
        .map(|(index, _)| FilterId(index))
        .collect()
}

/// Per-run record of which filters selected at least one dispatched case.
///
/// Flags start unset and only ever go from unset to set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterUsage {
    used: Vec<bool>,
}

impl FilterUsage {
    /// Create an arena for `count` filters, none of them used.
    pub fn new(count: usize) -> Self {
        Self { used: vec![false; count] }
    }

    pub fn mark(&mut self, ids: &[FilterId]) {
        for id in ids {
            if let Some(flag) = self.used.get_mut(id.0) {
                *flag = true;
            }
        }
    }

    /// Filters whose flag is still unset. `filters` must be the list the ids were drawn from.
    pub fn unused(&self, filters: &[TestFilter]) -> BTreeSet<TestFilter> {
        filters
            .iter()
            .zip(&self.used)
            .filter(|(_, used)| !**used)
            .map(|(filter, _)| filter.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use testdrive_core::{Interface, Metadata};

    fn program(path: &str, cases: &[&str]) -> TestProgram {
        TestProgram::new(
            Interface::Listing,
            path,
            "/build",
            "suite",
            Metadata::default(),
            cases.iter().map(|name| TestCase::new(*name, Metadata::default())).collect(),
        )
    }

    fn broken(path: &str) -> TestProgram {
        TestProgram::with_listing_failure(
            Interface::Listing,
            path,
            "/build",
            "suite",
            Metadata::default(),
            "Test program does not exist",
        )
    }

    fn filters(specs: &[&str]) -> Vec<TestFilter> {
        specs.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn names(selection: &Selection) -> Vec<String> {
        selection
            .iter()
            .map(|entry| format!("{}:{}", entry.program.relative_path().display(), entry.case_name()))
            .collect()
    }

    fn suite() -> TestSuite {
        TestSuite::from(vec![program("dir/prog1", &["a", "b"]), program("dir/prog2", &["c"])])
    }

    #[test]
    fn test_no_filters_selects_everything_in_order() {
        let selection = select(&[], &suite());
        assert_eq!(names(&selection), ["dir/prog1:a", "dir/prog1:b", "dir/prog2:c"]);
        assert!(selection.iter().all(|entry| entry.filters.is_empty()));
    }

    #[test]
    fn test_mixed_filters() {
        let filters = filters(&["dir/prog1:a", "dir/prog2"]);
        let selection = select(&filters, &suite());
        assert_eq!(names(&selection), ["dir/prog1:a", "dir/prog2:c"]);
        assert_eq!(selection.iter().next().unwrap().filters, [FilterId(0)]);
    }

    #[test]
    fn test_overlapping_filters_all_contribute() {
        let filters = filters(&["dir", "dir/prog1:b"]);
        let selection = select(&filters, &suite());
        let b = selection.iter().find(|entry| entry.case_name() == "b").unwrap();
        assert_eq!(b.filters, [FilterId(0), FilterId(1)]);
    }

    #[test]
    fn test_nonexistent_program_selects_nothing() {
        let selection = select(&filters(&["dir/prog3"]), &suite());
        assert!(selection.is_empty());
    }

    #[test]
    fn test_listing_failure_selected_by_program_and_case_filters() {
        let suite = TestSuite::from(vec![broken("dir/gone"), program("dir/prog2", &["c"])]);

        let selection = select(&filters(&["dir/gone:whatever"]), &suite);
        assert_eq!(names(&selection), ["dir/gone:__test_cases_list__"]);
        assert_eq!(
            selection.iter().next().unwrap().target,
            Target::ListingFailure("Test program does not exist".to_string())
        );

        let selection = select(&filters(&["dir/prog2"]), &suite);
        assert_eq!(names(&selection), ["dir/prog2:c"]);
    }

    #[test]
    fn test_usage_tracking() {
        let filters = filters(&["a", "b", "c"]);
        let mut usage = FilterUsage::new(filters.len());
        usage.mark(&[FilterId(2)]);
        usage.mark(&[FilterId(2), FilterId(0)]);
        usage.mark(&[FilterId(7)]);

        let unused: Vec<_> = usage.unused(&filters).into_iter().map(|f| f.to_string()).collect();
        assert_eq!(unused, ["b"]);
    }
}
