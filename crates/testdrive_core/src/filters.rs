//! Hierarchical test filters.
//!
//! A filter selects test cases by their identity: the program path relative to the suite root and the
//! case name. Three forms exist:
//!
//! | Text          | Form           | Selects                                              |
//! |---------------|----------------|------------------------------------------------------|
//! | `.`           | suite-wide     | every case of every program                          |
//! | `dir/prog`    | program-scoped | every case of `dir/prog` and of programs below `dir/prog/` |
//! | `dir/prog:a`  | case-scoped    | case `a` of `dir/prog` (and of programs below it)    |
//!
//! Program paths use directory semantics: `a/b` matches `a/b` and `a/b/c`, never `a/bc`.
//!
//! Filters are values: they never record whether they matched anything. That bookkeeping belongs to
//! whoever runs the selection.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

/// Errors raised while building a filter from user input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("Test filter cannot be empty")]
    Empty,

    #[error("Program name component in '{0}' is empty")]
    EmptyProgram(String),

    #[error("Test case component in '{0}' is empty")]
    EmptyCase(String),

    #[error("Program path in '{0}' cannot be absolute")]
    Absolute(String),

    #[error("Program path in '{0}' cannot reference a parent directory")]
    ParentComponent(String),

    #[error("Test case filter '{0}' must name a test program")]
    CaseWithoutProgram(String),
}

/// Selector over (program path, case name).
///
/// Ordering puts the suite-wide filter first, then sorts by program path and case name, so sets of
/// filters print in a stable order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestFilter {
    program: Option<PathBuf>,
    case: Option<String>,
}

impl TestFilter {
    /// The filter that selects every test case.
    pub fn suite_wide() -> Self {
        Self {
            program: None,
            case: None,
        }
    }

    /// A filter selecting every case of `program` and of any program below it.
    pub fn for_program(program: impl AsRef<Path>) -> Result<Self, FilterError> {
        let raw = program.as_ref().display().to_string();
        let program = normalize_program(program.as_ref(), &raw)?;
        if program.as_os_str().is_empty() {
            return Err(FilterError::EmptyProgram(raw));
        }
        Ok(Self {
            program: Some(program),
            case: None,
        })
    }

    /// A filter selecting the case named `case` of `program`.
    pub fn for_case(program: impl AsRef<Path>, case: impl Into<String>) -> Result<Self, FilterError> {
        let mut filter = Self::for_program(program)?;
        let case = case.into();
        if case.is_empty() {
            return Err(FilterError::EmptyCase(filter.to_string() + ":"));
        }
        filter.case = Some(case);
        Ok(filter)
    }

    /// Program path component, or `None` for the suite-wide filter.
    pub fn program(&self) -> Option<&Path> {
        self.program.as_deref()
    }

    pub fn case(&self) -> Option<&str> {
        self.case.as_deref()
    }

    pub fn is_suite_wide(&self) -> bool {
        self.program.is_none()
    }

    /// Check whether the program half of the filter selects `program_path`.
    ///
    /// A case-scoped filter matches the program that contains its case. This is what decides whether a
    /// program that cannot be enumerated was targeted by the filter.
    pub fn matches_program(&self, program_path: &Path) -> bool {
        match &self.program {
            None => true,
            Some(prefix) => program_path.starts_with(prefix),
        }
    }

    /// Check whether the filter selects the case `case_name` of `program_path`.
    pub fn matches(&self, program_path: &Path, case_name: &str) -> bool {
        self.matches_program(program_path) && self.case.as_deref().is_none_or(|name| name == case_name)
    }

    /// Check whether every case selected by `other` is also selected by `self`.
    pub fn contains(&self, other: &TestFilter) -> bool {
        let Some(prefix) = &self.program else {
            return true;
        };
        let Some(other_program) = &other.program else {
            return false;
        };
        if !other_program.starts_with(prefix) {
            return false;
        }
        match &self.case {
            None => true,
            Some(name) => other.case.as_ref() == Some(name),
        }
    }
}

impl FromStr for TestFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(FilterError::Empty);
        }

        let (program_part, case_part) = match s.rsplit_once(':') {
            Some((program, case)) => (program, Some(case)),
            None => (s, None),
        };

        if program_part.is_empty() {
            return Err(FilterError::EmptyProgram(s.to_string()));
        }
        if case_part.is_some_and(str::is_empty) {
            return Err(FilterError::EmptyCase(s.to_string()));
        }

        let program = normalize_program(Path::new(program_part), s)?;
        if program.as_os_str().is_empty() {
            return match case_part {
                Some(_) => Err(FilterError::CaseWithoutProgram(s.to_string())),
                None => Ok(Self::suite_wide()),
            };
        }

        Ok(Self {
            program: Some(program),
            case: case_part.map(str::to_string),
        })
    }
}

impl fmt::Display for TestFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.program, &self.case) {
            (None, _) => f.write_str("."),
            (Some(program), None) => write!(f, "{}", program.display()),
            (Some(program), Some(case)) => write!(f, "{}:{}", program.display(), case),
        }
    }
}

/// Drop `.` components and repeated or trailing separators, rejecting absolute and `..` paths.
fn normalize_program(path: &Path, raw: &str) -> Result<PathBuf, FilterError> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(FilterError::ParentComponent(raw.to_string())),
            Component::RootDir | Component::Prefix(_) => return Err(FilterError::Absolute(raw.to_string())),
        }
    }
    Ok(normalized)
}

/// List pairs of distinct filters where the first selects everything the second does.
///
/// Overlapping filters are legal (a case simply counts towards every filter that selects it) but
/// usually point at a mistake on the command line.
pub fn redundant_pairs(filters: &BTreeSet<TestFilter>) -> Vec<(&TestFilter, &TestFilter)> {
    let mut pairs = Vec::new();
    for broad in filters {
        for narrow in filters {
            if broad != narrow && broad.contains(narrow) {
                pairs.push((broad, narrow));
            }
        }
    }
    pairs
}
