use std::collections::BTreeSet;

use memreport_types::{Issue, IssueKey};

/// Receives localized issues.
pub trait IssueSink {
    /// Store `issue`; returns `false` when the sink already holds an equal one.
    fn save(&mut self, issue: Issue) -> bool;
}

/// Keeps every issue as-is.
impl IssueSink for Vec<Issue> {
    fn save(&mut self, issue: Issue) -> bool {
        self.push(issue);
        true
    }
}

/// In-memory sink that drops issues sharing an [`IssueKey`] with an earlier one.
///
/// Issues keep their first-insertion order.
#[derive(Debug, Clone, Default)]
pub struct UniqueIssues {
    seen: BTreeSet<IssueKey>,
    issues: Vec<Issue>,
}

impl UniqueIssues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<Issue> {
        self.issues
    }
}

impl IssueSink for UniqueIssues {
    fn save(&mut self, issue: Issue) -> bool {
        if !self.seen.insert(issue.key()) {
            return false;
        }
        self.issues.push(issue);
        true
    }
}
