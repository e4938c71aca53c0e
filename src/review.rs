//! Review handoff
//!
//! Every automated fix ends in a pull request for a human to approve. This
//! module owns the PR body template and the HTTP sink that files it.

use crate::patch::PatchRecord;
use crate::spec::BugSpec;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REVIEW_TIMEOUT_SECS: u64 = 30;

/// A filed pull request, as the review service reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PullRequestDraft {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

/// Where finished fixes go for human review. Tests use in-memory fakes.
pub trait ReviewSink: Send + Sync {
    fn create_pull_request(
        &self,
        draft: &PullRequestDraft,
    ) -> impl std::future::Future<Output = Result<PullRequest>> + Send;

    fn get_pull_request(
        &self,
        number: u64,
    ) -> impl std::future::Future<Output = Result<PullRequest>> + Send;
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// Talks to a GitHub-shaped review API (`/repos/{repo}/pulls`).
pub struct HttpReviewSink {
    base_url: String,
    repository: String,
}

impl HttpReviewSink {
    pub fn new(base_url: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            repository: repository.into(),
        }
    }

    fn client() -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(REVIEW_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")
    }
}

impl ReviewSink for HttpReviewSink {
    async fn create_pull_request(&self, draft: &PullRequestDraft) -> Result<PullRequest> {
        let url = format!("{}/repos/{}/pulls", self.base_url, self.repository);
        let response = Self::client()?
            .post(&url)
            .json(draft)
            .send()
            .await
            .context("Failed to reach review API")?;

        if !response.status().is_success() {
            return Err(anyhow!("Review API error: {}", response.status()));
        }

        response
            .json()
            .await
            .context("Failed to parse pull request response")
    }

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
        let url = format!("{}/repos/{}/pulls/{}", self.base_url, self.repository, number);
        let response = Self::client()?
            .get(&url)
            .send()
            .await
            .context("Failed to reach review API")?;

        if !response.status().is_success() {
            return Err(anyhow!("Review API error: {}", response.status()));
        }

        response
            .json()
            .await
            .context("Failed to parse pull request response")
    }
}

// ============================================================================
// PR body template
// ============================================================================

/// Render the standard PR body for an automated fix.
pub fn build_pr_body(spec: &BugSpec, patch: &PatchRecord, tests_passed: bool) -> String {
    let tests_line = if tests_passed {
        "- [x] Generated regression tests pass after the fix"
    } else {
        "- [ ] Generated regression tests pass after the fix"
    };

    format!(
        "## Automated Bug Fix\n\n\
         **Severity:** {severity}\n\
         **File:** `{file}`\n\n\
         ### Problem\n{problem}\n\n\
         ### Solution\n{solution}\n\n\
         ### Changes\n```diff\n{diff}```\n\n\
         ### Testing\n\
         {tests_line}\n\
         - [x] Regression tests failed before the fix (bug reproduced)\n\n\
         ### Safety\n\
         - Lines changed: {lines}/{budget}\n\
         - [x] No breaking API changes\n\
         - [x] Change is minimal and targeted\n",
        severity = spec.severity,
        file = patch.file,
        problem = spec.description,
        solution = spec.expected_behavior,
        diff = patch.diff,
        tests_line = tests_line,
        lines = patch.lines_changed,
        budget = spec.safety_constraints.max_lines_changed,
    )
}

/// PR title in the conventional-commit style the review service expects.
pub fn build_pr_title(spec: &BugSpec) -> String {
    format!("fix: {}", spec.title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{parse_bug_report, BugReport};

    fn report(title: &str, description: &str, expected: &str, language: &str) -> BugReport {
        BugReport {
            title: title.to_string(),
            description: description.to_string(),
            repository: "demo/repo".to_string(),
            expected_behavior: expected.to_string(),
            language: language.to_string(),
        }
    }

    fn sample_patch() -> PatchRecord {
        PatchRecord {
            file: "src/math_utils.py".to_string(),
            lines_changed: 2,
            diff: "--- a/src/math_utils.py\n+++ b/src/math_utils.py\n@@ -1,1 +1,2 @@\n-old\n+new\n".to_string(),
            new_code: "new".to_string(),
            old_code: Some("old".to_string()),
        }
    }

    #[test]
    fn test_pr_body_includes_budget_and_diff() {
        let spec = parse_bug_report(&report(
            "Factorial hangs",
            "factorial of a negative number hangs forever",
            "raise ValueError for negative input",
            "python",
        ));
        let body = build_pr_body(&spec, &sample_patch(), true);

        assert!(body.contains("**Severity:** medium"));
        assert!(body.contains("`src/math_utils.py`"));
        assert!(body.contains("Lines changed: 2/8"));
        assert!(body.contains("```diff"));
        assert!(body.contains("- [x] Generated regression tests pass"));
    }

    #[test]
    fn test_pr_body_unchecked_when_tests_fail() {
        let spec = parse_bug_report(&report(
            "Bug",
            "divide by zero crash",
            "return an error",
            "typescript",
        ));
        let body = build_pr_body(&spec, &sample_patch(), false);
        assert!(body.contains("- [ ] Generated regression tests pass"));
    }

    #[test]
    fn test_pr_title() {
        let spec = parse_bug_report(&report(
            "Calculator crashes",
            "divide by zero",
            "error result",
            "typescript",
        ));
        assert_eq!(build_pr_title(&spec), "fix: Calculator crashes");
    }
}
