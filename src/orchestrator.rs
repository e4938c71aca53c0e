//! Ten-step run orchestrator
//!
//! Drives a bug report end to end: parse, locate, branch, write regression
//! tests, confirm they fail, patch, validate, apply, confirm they pass, and
//! hand off for review. Every step transition is appended to the run's event
//! log, so a failed or aborted run is fully reconstructable afterward.
//!
//! The validate step is a hard gate: a patch over the spec's changed-line
//! budget aborts the run in place. Nothing written by earlier steps is
//! cleaned up on failure; the leftover branch and test files are the
//! evidence an operator needs.

use crate::git_ops;
use crate::patch::{generate_patch, within_budget, PatchRecord};
use crate::pipeline::FixError;
use crate::review::{build_pr_body, build_pr_title, PullRequest, PullRequestDraft, ReviewSink};
use crate::runner::{locate_targets, CodeSearch, TestRunOutcome, TestRunner};
use crate::spec::{parse_bug_report, BugReport, BugSpec};
use crate::testgen::{generate_test_code, test_file_name};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const STEPS: [&str; 10] = [
    "parse_bug",
    "search_code",
    "create_branch",
    "generate_tests",
    "run_tests_before",
    "generate_patch",
    "validate_patch",
    "apply_patch",
    "run_tests_after",
    "open_pr",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Started,
    Completed,
    Failed,
    Skipped,
}

/// One entry in the run's audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepEvent {
    pub step: String,
    pub status: StepStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Full record of one orchestrated run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    pub events: Vec<StepEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<BugSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<PatchRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tests_before: Option<TestRunOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tests_after: Option<TestRunOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequest>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    fn new() -> Self {
        Self {
            run_id: format!("run-{}", Uuid::new_v4()),
            status: RunStatus::Running,
            current_step: None,
            events: Vec::new(),
            spec: None,
            branch: None,
            patch: None,
            tests_before: None,
            tests_after: None,
            pull_request: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn record(&mut self, step: &str, status: StepStatus, message: impl Into<String>) {
        self.events.push(StepEvent {
            step: step.to_string(),
            status,
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    fn start_step(&mut self, index: usize, step: &str) {
        self.current_step = Some(step.to_string());
        self.record(step, StepStatus::Started, "");
        eprintln!("  [{}/10] {}", index, step.replace('_', " "));
    }

    fn complete_step(&mut self, step: &str, message: impl Into<String>) {
        self.record(step, StepStatus::Completed, message);
    }

    fn fail(&mut self, step: &str, message: impl Into<String>) {
        let message = message.into();
        eprintln!("  x {} failed: {}", step.replace('_', " "), message);
        self.record(step, StepStatus::Failed, message);
        self.status = RunStatus::Failed;
        self.finished_at = Some(Utc::now());
    }

    fn abort(&mut self, step: &str, message: impl Into<String>) {
        let message = message.into();
        eprintln!("  ! run aborted at {}: {}", step.replace('_', " "), message);
        self.record(step, StepStatus::Failed, message);
        self.status = RunStatus::Aborted;
        self.finished_at = Some(Utc::now());
    }

    fn complete(&mut self) {
        self.status = RunStatus::Completed;
        self.current_step = None;
        self.finished_at = Some(Utc::now());
    }
}

/// The orchestrator owns its collaborators; tests inject fakes.
pub struct Orchestrator<R, S, K> {
    root: PathBuf,
    runner: R,
    search: S,
    review: Option<K>,
}

impl<R: TestRunner, S: CodeSearch, K: ReviewSink> Orchestrator<R, S, K> {
    pub fn new(root: PathBuf, runner: R, search: S, review: Option<K>) -> Self {
        Self {
            root,
            runner,
            search,
            review,
        }
    }

    /// Run a bug report end to end.
    pub async fn run(&self, report: &BugReport) -> PipelineRun {
        let spec = parse_bug_report(report);
        self.run_spec(spec).await
    }

    /// Run an already-parsed spec end to end.
    pub async fn run_spec(&self, spec: BugSpec) -> PipelineRun {
        let mut run = PipelineRun::new();

        // -- 1: parse_bug ----------------------------------------------------
        run.start_step(1, "parse_bug");
        run.complete_step(
            "parse_bug",
            format!(
                "targets {} (severity {}, budget {} lines)",
                spec.target_files.join(", "),
                spec.severity,
                spec.safety_constraints.max_lines_changed
            ),
        );
        run.spec = Some(spec.clone());

        // -- 2: search_code --------------------------------------------------
        run.start_step(2, "search_code");
        let located = locate_targets(
            &self.search,
            &self.root,
            &spec.target_files,
            spec.primary_function(),
        )
        .await;
        run.complete_step(
            "search_code",
            if located.is_empty() {
                "no target files found on disk; continuing with spec paths".to_string()
            } else {
                format!("located {} file(s)", located.len())
            },
        );

        // -- 3: create_branch ------------------------------------------------
        run.start_step(3, "create_branch");
        match git_ops::create_fix_branch(&self.root, &run.run_id) {
            Ok(branch) => {
                run.complete_step("create_branch", branch.clone());
                run.branch = Some(branch);
            }
            Err(e) => {
                run.fail("create_branch", e.to_string());
                return run;
            }
        }

        // -- 4: generate_tests -----------------------------------------------
        run.start_step(4, "generate_tests");
        let test_path = self.root.join(test_file_name(&spec.language));
        let test_code = generate_test_code(&spec);
        if let Err(e) = write_with_parents(&test_path, &test_code) {
            run.fail("generate_tests", e);
            return run;
        }
        run.complete_step("generate_tests", test_path.display().to_string());

        // -- 5: run_tests_before ---------------------------------------------
        run.start_step(5, "run_tests_before");
        match self
            .runner
            .run_tests(&self.root, &spec.test_requirements.framework)
            .await
        {
            Ok(outcome) => {
                let message = if outcome.passed {
                    "tests passed before the fix; bug not reproduced".to_string()
                } else {
                    "tests fail before the fix, bug reproduced".to_string()
                };
                run.complete_step("run_tests_before", message);
                run.tests_before = Some(outcome);
            }
            Err(e) => {
                run.fail("run_tests_before", e.to_string());
                return run;
            }
        }

        // -- 6: generate_patch -----------------------------------------------
        run.start_step(6, "generate_patch");
        let source = fs::read_to_string(self.root.join(spec.primary_file())).ok();
        let patch = generate_patch(&spec, source.as_deref());
        run.complete_step(
            "generate_patch",
            format!("{} ({} lines changed)", patch.file, patch.lines_changed),
        );

        // -- 7: validate_patch -----------------------------------------------
        run.start_step(7, "validate_patch");
        if !within_budget(&patch, &spec) {
            run.abort(
                "validate_patch",
                FixError::SafetyConstraintViolation(format!(
                    "{} lines changed exceeds the {}-line budget",
                    patch.lines_changed, spec.safety_constraints.max_lines_changed
                ))
                .to_string(),
            );
            run.patch = Some(patch);
            return run;
        }
        run.complete_step(
            "validate_patch",
            format!(
                "{}/{} lines within budget",
                patch.lines_changed, spec.safety_constraints.max_lines_changed
            ),
        );

        // -- 8: apply_patch --------------------------------------------------
        run.start_step(8, "apply_patch");
        if let Err(e) = apply_patch(&self.root, &patch) {
            run.fail("apply_patch", e);
            run.patch = Some(patch);
            return run;
        }
        run.complete_step("apply_patch", patch.file.clone());
        run.patch = Some(patch.clone());

        // -- 9: run_tests_after ----------------------------------------------
        run.start_step(9, "run_tests_after");
        let tests_passed = match self
            .runner
            .run_tests(&self.root, &spec.test_requirements.framework)
            .await
        {
            Ok(outcome) => {
                let passed = outcome.passed;
                let message = if passed {
                    "tests pass after the fix".to_string()
                } else {
                    "tests still failing after the fix".to_string()
                };
                run.complete_step("run_tests_after", message);
                run.tests_after = Some(outcome);
                passed
            }
            Err(e) => {
                run.fail("run_tests_after", e.to_string());
                return run;
            }
        };

        // -- 10: open_pr -----------------------------------------------------
        run.start_step(10, "open_pr");
        let Some(review) = &self.review else {
            run.record(
                "open_pr",
                StepStatus::Skipped,
                "no review sink configured",
            );
            run.complete();
            return run;
        };

        let draft = PullRequestDraft {
            title: build_pr_title(&spec),
            body: build_pr_body(&spec, &patch, tests_passed),
            head: run.branch.clone().unwrap_or_default(),
            base: "main".to_string(),
        };
        match review.create_pull_request(&draft).await {
            Ok(pr) => {
                run.complete_step("open_pr", pr.html_url.clone());
                run.pull_request = Some(pr);
                run.complete();
            }
            Err(e) => {
                run.fail("open_pr", e.to_string());
            }
        }

        run
    }
}

/// Write the patch into the working tree, backing up the previous content.
///
/// Script patches carry the whole fixed file in `new_code`; Python patches
/// carry only the replacement function with the original slice in
/// `old_code`. Missing target files are created (stub patches).
fn apply_patch(root: &Path, patch: &PatchRecord) -> Result<(), String> {
    let path = root.join(&patch.file);

    let current = fs::read_to_string(&path).ok();
    let updated = match (&current, &patch.old_code) {
        (Some(content), Some(old)) if content == old => patch.new_code.clone(),
        (Some(content), Some(old)) if content.contains(old.as_str()) => {
            content.replacen(old.as_str(), &patch.new_code, 1)
        }
        _ => patch.new_code.clone(),
    };

    if let Some(content) = &current {
        let mut backup = path.as_os_str().to_owned();
        backup.push(".backup");
        fs::write(PathBuf::from(backup), content)
            .map_err(|e| format!("Failed to write backup: {e}"))?;
    }

    write_with_parents(&path, &updated)
}

fn write_with_parents(path: &Path, content: &str) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {e}", parent.display()))?;
    }
    fs::write(path, content).map_err(|e| format!("Failed to write {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Returns scripted pass/fail outcomes in order.
    struct ScriptedRunner {
        outcomes: Mutex<Vec<bool>>,
    }

    impl ScriptedRunner {
        fn new(outcomes: &[bool]) -> Self {
            let mut v: Vec<bool> = outcomes.to_vec();
            v.reverse();
            Self {
                outcomes: Mutex::new(v),
            }
        }
    }

    impl TestRunner for ScriptedRunner {
        async fn run_tests(&self, _root: &Path, _framework: &str) -> Result<TestRunOutcome> {
            let passed = self.outcomes.lock().unwrap().pop().unwrap_or(true);
            Ok(TestRunOutcome {
                passed,
                output: String::new(),
                exit_code: Some(if passed { 0 } else { 1 }),
            })
        }
    }

    struct EmptySearch;

    impl CodeSearch for EmptySearch {
        async fn search(&self, _root: &Path, _query: &str) -> Result<Vec<crate::runner::SearchHit>> {
            Ok(vec![])
        }
    }

    struct FakeReview;

    impl ReviewSink for FakeReview {
        async fn create_pull_request(&self, _draft: &PullRequestDraft) -> Result<PullRequest> {
            Ok(PullRequest {
                number: 42,
                html_url: "http://localhost:8080/pulls/42".to_string(),
                state: "open".to_string(),
            })
        }

        async fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
            Ok(PullRequest {
                number,
                html_url: format!("http://localhost:8080/pulls/{number}"),
                state: "open".to_string(),
            })
        }
    }

    fn factorial_report() -> BugReport {
        BugReport {
            title: "Factorial hangs".to_string(),
            description: "calling factorial with a negative number hangs forever".to_string(),
            repository: "demo/buggy-apps".to_string(),
            expected_behavior: "raise ValueError for negative input".to_string(),
            language: "python".to_string(),
        }
    }

    fn seed_python_project(dir: &TempDir) {
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(
            dir.path().join("src/math_utils.py"),
            "def factorial(n):\n    return n * factorial(n - 1)\n",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_full_run_completes_all_ten_steps() {
        let dir = TempDir::new().unwrap();
        seed_python_project(&dir);

        let orch = Orchestrator::new(
            dir.path().to_path_buf(),
            ScriptedRunner::new(&[false, true]),
            EmptySearch,
            Some(FakeReview),
        );
        let run = orch.run(&factorial_report()).await;

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.pull_request.as_ref().unwrap().number, 42);
        assert!(run.finished_at.is_some());

        // Every step both started and completed, in order.
        for step in STEPS {
            assert!(
                run.events
                    .iter()
                    .any(|e| e.step == step && e.status == StepStatus::Completed),
                "step {step} did not complete"
            );
        }

        // The patched file got the guarded factorial.
        let fixed = fs::read_to_string(dir.path().join("src/math_utils.py")).unwrap();
        assert!(fixed.contains("raise ValueError"));

        // Regression tests were written.
        assert!(dir.path().join("tests/test_generated.py").exists());
    }

    #[tokio::test]
    async fn test_budget_violation_aborts_run() {
        let dir = TempDir::new().unwrap();
        seed_python_project(&dir);

        let mut spec = parse_bug_report(&factorial_report());
        spec.safety_constraints.max_lines_changed = 1;

        let orch = Orchestrator::new(
            dir.path().to_path_buf(),
            ScriptedRunner::new(&[false, true]),
            EmptySearch,
            Some(FakeReview),
        );
        let run = orch.run_spec(spec).await;

        assert_eq!(run.status, RunStatus::Aborted);
        assert!(run.pull_request.is_none());
        assert!(run
            .events
            .iter()
            .any(|e| e.step == "validate_patch" && e.status == StepStatus::Failed));
        // No step past the gate ran.
        assert!(!run.events.iter().any(|e| e.step == "apply_patch"));

        // The aborted run left the file untouched.
        let content = fs::read_to_string(dir.path().join("src/math_utils.py")).unwrap();
        assert!(!content.contains("raise ValueError"));

        // No cleanup: the generated test file stays on disk as evidence.
        assert!(dir.path().join("tests/test_generated.py").exists());
    }

    #[tokio::test]
    async fn test_run_without_review_sink_skips_pr() {
        let dir = TempDir::new().unwrap();
        seed_python_project(&dir);

        let orch: Orchestrator<_, _, FakeReview> = Orchestrator::new(
            dir.path().to_path_buf(),
            ScriptedRunner::new(&[false, true]),
            EmptySearch,
            None,
        );
        let run = orch.run(&factorial_report()).await;

        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.pull_request.is_none());
        assert!(run
            .events
            .iter()
            .any(|e| e.step == "open_pr" && e.status == StepStatus::Skipped));
    }

    #[tokio::test]
    async fn test_apply_patch_replaces_function_slice() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("utils.py");
        fs::write(
            &path,
            "def helper():\n    pass\n\ndef factorial(n):\n    return n * factorial(n - 1)\n",
        )
        .unwrap();

        let patch = PatchRecord {
            file: "utils.py".to_string(),
            lines_changed: 2,
            diff: String::new(),
            new_code: "def factorial(n):\n    if n < 0:\n        raise ValueError(\"negative\")\n    return 1 if n == 0 else n * factorial(n - 1)".to_string(),
            old_code: Some("def factorial(n):\n    return n * factorial(n - 1)".to_string()),
        };
        apply_patch(dir.path(), &patch).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("def helper():"));
        assert!(content.contains("raise ValueError"));
        assert!(!content.contains("    return n * factorial(n - 1)\n"));

        // Backup holds the original.
        let backup = fs::read_to_string(dir.path().join("utils.py.backup")).unwrap();
        assert!(backup.contains("return n * factorial(n - 1)"));
    }
}
