//! Test execution and code search
//!
//! Subprocess-backed collaborators for the orchestrator. Both are traits so
//! orchestrator tests can run against in-memory fakes instead of spawning
//! real toolchains.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const TEST_TIMEOUT_SECS: u64 = 120;
const SEARCH_TIMEOUT_SECS: u64 = 30;

/// Result of one test-suite invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRunOutcome {
    pub passed: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// A code-search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub file: String,
    pub line: usize,
    pub text: String,
}

pub trait TestRunner: Send + Sync {
    fn run_tests(
        &self,
        root: &Path,
        framework: &str,
    ) -> impl std::future::Future<Output = Result<TestRunOutcome>> + Send;
}

pub trait CodeSearch: Send + Sync {
    fn search(
        &self,
        root: &Path,
        query: &str,
    ) -> impl std::future::Future<Output = Result<Vec<SearchHit>>> + Send;
}

// ============================================================================
// Subprocess implementations
// ============================================================================

/// Runs the project's real test suite via its package toolchain.
pub struct SubprocessTestRunner;

impl TestRunner for SubprocessTestRunner {
    async fn run_tests(&self, root: &Path, framework: &str) -> Result<TestRunOutcome> {
        let mut cmd = match framework {
            "vitest" => {
                let mut c = Command::new("pnpm");
                c.arg("test");
                c
            }
            _ => {
                let mut c = Command::new("python3");
                c.args(["-m", "pytest", "-v"]);
                c
            }
        };

        let output = tokio::time::timeout(
            Duration::from_secs(TEST_TIMEOUT_SECS),
            cmd.current_dir(root)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await
        .context("Test run timed out")?
        .context("Failed to spawn test runner")?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(TestRunOutcome {
            passed: output.status.success(),
            output: text,
            exit_code: output.status.code(),
        })
    }
}

/// `grep -rn` over the project tree.
pub struct GrepSearch;

impl CodeSearch for GrepSearch {
    async fn search(&self, root: &Path, query: &str) -> Result<Vec<SearchHit>> {
        let output = tokio::time::timeout(
            Duration::from_secs(SEARCH_TIMEOUT_SECS),
            Command::new("grep")
                .args(["-rn", "--include=*.ts", "--include=*.js", "--include=*.py", "--include=*.html"])
                .arg(query)
                .arg(".")
                .current_dir(root)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .output(),
        )
        .await
        .context("Search timed out")?
        .context("Failed to spawn grep")?;

        let text = String::from_utf8_lossy(&output.stdout);
        let hits = parse_grep_output(&text);
        Ok(hits)
    }
}

/// Parse `file:line:text` grep lines, dropping anything malformed.
fn parse_grep_output(text: &str) -> Vec<SearchHit> {
    text.lines()
        .filter_map(|line| {
            let (file, rest) = line.split_once(':')?;
            let (line_no, matched) = rest.split_once(':')?;
            let line_no = line_no.parse().ok()?;
            Some(SearchHit {
                file: file.trim_start_matches("./").to_string(),
                line: line_no,
                text: matched.trim().to_string(),
            })
        })
        .collect()
}

/// Locate the files a spec names, falling back to a search for the primary
/// function when the spec's paths do not exist on disk.
pub async fn locate_targets<S: CodeSearch>(
    search: &S,
    root: &Path,
    target_files: &[String],
    primary_function: &str,
) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = target_files
        .iter()
        .map(|f| root.join(f))
        .filter(|p| p.exists())
        .collect();

    if found.is_empty() && !primary_function.is_empty() {
        if let Ok(hits) = search.search(root, primary_function).await {
            for hit in hits {
                let path = root.join(&hit.file);
                if path.exists() && !found.contains(&path) {
                    found.push(path);
                }
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct FakeSearch {
        hits: Vec<SearchHit>,
    }

    impl CodeSearch for FakeSearch {
        async fn search(&self, _root: &Path, _query: &str) -> Result<Vec<SearchHit>> {
            Ok(self.hits.clone())
        }
    }

    #[test]
    fn test_parse_grep_output() {
        let text = "./src/calculator.ts:17:export function divide(a, b) {\napp.js:3:divide(1, 0);\n";
        let hits = parse_grep_output(text);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].file, "src/calculator.ts");
        assert_eq!(hits[0].line, 17);
        assert!(hits[0].text.starts_with("export function divide"));
    }

    #[test]
    fn test_parse_grep_skips_malformed_lines() {
        let hits = parse_grep_output("no colons here\nfile.ts:notanumber:text\n");
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_locate_prefers_existing_spec_paths() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.js"), "x").unwrap();
        let search = FakeSearch { hits: vec![] };

        let found = locate_targets(
            &search,
            dir.path(),
            &["app.js".to_string(), "missing.js".to_string()],
            "divide",
        )
        .await;

        assert_eq!(found, vec![dir.path().join("app.js")]);
    }

    #[tokio::test]
    async fn test_locate_falls_back_to_search() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("calc.ts"), "function divide() {}").unwrap();
        let search = FakeSearch {
            hits: vec![SearchHit {
                file: "calc.ts".to_string(),
                line: 1,
                text: "function divide() {}".to_string(),
            }],
        };

        let found = locate_targets(&search, dir.path(), &["missing.ts".to_string()], "divide").await;
        assert_eq!(found, vec![dir.path().join("calc.ts")]);
    }
}
