//! Run results model
//!
//! Suites hold tests, tests hold cases, cases hold issues. An issue that is a
//! plain string is an annotation; anything structured is a failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResults {
    #[serde(default)]
    pub suites: BTreeMap<String, Suite>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Suite {
    #[serde(default)]
    pub tests: BTreeMap<String, Test>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Test {
    #[serde(default)]
    pub cases: Vec<Case>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Case {
    #[serde(default)]
    pub issues: Vec<Issue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Issue {
    Annotation(String),
    Failure(Value),
}

impl Issue {
    pub fn is_failure(&self) -> bool {
        matches!(self, Issue::Failure(_))
    }
}

impl Case {
    pub fn is_passing(&self) -> bool {
        !self.issues.iter().any(Issue::is_failure)
    }
}

impl RunResults {
    pub fn cases(&self) -> impl Iterator<Item = &Case> {
        self.suites
            .values()
            .flat_map(|suite| suite.tests.values())
            .flat_map(|test| test.cases.iter())
    }

    /// True when no case has a failing issue
    pub fn is_successful(&self) -> bool {
        self.cases().all(Case::is_passing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(json: &str) -> RunResults {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_annotations_do_not_fail() {
        let r = results(
            r#"{"suites":{"tests/Math.php":{"tests":{"add":{"cases":[{"issues":["note"]},{"issues":[]}]}}}}}"#,
        );
        assert_eq!(r.cases().count(), 2);
        assert!(r.is_successful());
    }

    #[test]
    fn test_structured_issue_fails() {
        let r = results(
            r#"{"suites":{"a":{"tests":{"t":{"cases":[{"issues":["ok"]},{"issues":[{"expected":1,"actual":2}]}]}}}}}"#,
        );
        assert!(!r.is_successful());
        assert!(r.cases().nth(1).map(|c| !c.is_passing()).unwrap_or(false));
    }

    #[test]
    fn test_empty_results_succeed() {
        assert!(RunResults::default().is_successful());
        assert!(results("{}").is_successful());
    }
}
