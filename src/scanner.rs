//! Project tree scanner
//!
//! Walks a root path, classifies every file, and runs cheap line-level
//! heuristic checks. The scan is read-only: it never mutates source files.
//! Output carries both the flagged issues and the full file inventory, so
//! callers that need "all available files" read the latter.

use crate::language::{detect_language, Language};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    Pending,
    Analyzing,
    Fixing,
    Fixed,
    Failed,
    Skipped,
}

/// A single heuristic finding. Identity (`id`) is stable for its lifetime;
/// downstream fixers only ever update `status`/`fixed_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub file: String,
    pub language: Language,
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
    pub severity: Severity,
    pub rule: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    pub status: IssueStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_at: Option<DateTime<Utc>>,
}

impl Issue {
    fn new(
        file: &str,
        language: Language,
        line: usize,
        severity: Severity,
        rule: &str,
        message: &str,
        suggested_fix: Option<&str>,
    ) -> Self {
        Self {
            id: format!("{}:{}:{}", file, line, rule),
            file: file.to_string(),
            language,
            line,
            end_line: None,
            column: None,
            severity,
            rule: rule.to_string(),
            message: message.to_string(),
            suggested_fix: suggested_fix.map(str::to_string),
            status: IssueStatus::Pending,
            created_at: Utc::now(),
            fixed_at: None,
        }
    }
}

/// A classified file recorded in the inventory, flagged or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannedFile {
    pub path: String,
    pub language: Language,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub issues: Vec<Issue>,
    pub scanned_files: usize,
    pub all_files: Vec<ScannedFile>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub root: PathBuf,
    pub exclude: Vec<String>,
    pub max_files: Option<usize>,
}

const DEFAULT_EXCLUDE: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    ".next",
    "coverage",
    "target",
    "__pycache__",
    ".pytest_cache",
    "venv",
    ".venv",
];

/// Scan a project tree and return the issue list plus the file inventory.
pub fn scan_project(options: &ScanOptions) -> Result<ScanReport> {
    let start = Instant::now();
    let exclude: Vec<&str> = DEFAULT_EXCLUDE
        .iter()
        .copied()
        .chain(options.exclude.iter().map(String::as_str))
        .collect();

    let should_exclude = |name: &str| exclude.iter().any(|pat| name == *pat);

    // Collect candidate files first, then scan them in parallel.
    let mut candidates: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(&options.root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            e.file_name()
                .to_str()
                .map(|name| !should_exclude(name))
                .unwrap_or(true)
        })
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_file() {
            candidates.push(entry.path().to_path_buf());
        }
    }
    candidates.sort();
    if let Some(max) = options.max_files {
        candidates.truncate(max);
    }

    let scanned: Vec<(ScannedFile, Vec<Issue>)> = candidates
        .par_iter()
        .filter_map(|path| {
            let language = detect_language(path);
            if !language.is_supported() {
                return None;
            }
            let relative = path
                .strip_prefix(&options.root)
                .unwrap_or(path)
                .to_string_lossy()
                .to_string();
            let issues = scan_file(path, &relative, language);
            Some((ScannedFile { path: relative, language }, issues))
        })
        .collect();

    let mut issues = Vec::new();
    let mut all_files = Vec::with_capacity(scanned.len());
    for (file, file_issues) in scanned {
        all_files.push(file);
        issues.extend(file_issues);
    }

    Ok(ScanReport {
        scanned_files: all_files.len(),
        issues,
        all_files,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

fn scan_file(path: &Path, relative: &str, language: Language) -> Vec<Issue> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };

    let mut issues = run_language_checks(&content, language, relative);
    issues.extend(run_common_checks(&content, language, relative));
    issues
}

fn run_language_checks(content: &str, language: Language, file: &str) -> Vec<Issue> {
    let mut issues = Vec::new();

    if !matches!(language, Language::Html | Language::JavaScript | Language::TypeScript) {
        return issues;
    }

    let lines: Vec<&str> = content.lines().collect();
    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;

        // Disabled attribute in markup
        if line.contains("<button") && line.contains("disabled") {
            issues.push(Issue::new(
                file,
                language,
                line_no,
                Severity::High,
                "button-disabled",
                "Button has disabled attribute",
                Some("Remove the disabled attribute from the button"),
            ));
        }

        // .disabled assignments in script
        if line.contains(".disabled") && line.contains('=') {
            if line.contains("// BUG") || line.contains("//BUG") {
                issues.push(Issue::new(
                    file,
                    language,
                    line_no,
                    Severity::High,
                    "button-disabled",
                    "Button disabled code marked as BUG",
                    Some("Fix or remove the disabled code based on the bug comment"),
                ));
            } else if line.contains("= true") {
                issues.push(Issue::new(
                    file,
                    language,
                    line_no,
                    Severity::High,
                    "button-disabled",
                    "Button is being disabled in JavaScript",
                    Some("Change .disabled = true to .disabled = false or remove the line"),
                ));
            }
        }

        if line.contains("setAttribute") && line.contains("disabled") {
            issues.push(Issue::new(
                file,
                language,
                line_no,
                Severity::High,
                "button-disabled",
                "Button is being disabled via setAttribute",
                Some("Remove the setAttribute call"),
            ));
        }

        // preventDefault inside a button click handler blocks the action;
        // inside a form submit handler it is intentional.
        if line.contains("preventDefault") {
            let context = lines[idx.saturating_sub(3)..idx].join(" ");
            let is_button_click = context.contains("addEventListener(\"click\"")
                && (context.contains("Btn") || context.contains("button"));
            let is_form_submit =
                context.contains("addEventListener(\"submit\"") || context.contains("form.");

            if is_button_click && !is_form_submit {
                issues.push(Issue::new(
                    file,
                    language,
                    line_no,
                    Severity::Medium,
                    "prevent-default",
                    "preventDefault may be blocking button functionality",
                    Some("Remove preventDefault if not needed"),
                ));
            }
        }
    }

    issues
}

fn run_common_checks(content: &str, language: Language, file: &str) -> Vec<Issue> {
    let mut issues = Vec::new();
    let is_script = matches!(language, Language::JavaScript | Language::TypeScript);

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;

        if line.contains("TODO") || line.contains("FIXME") {
            issues.push(Issue::new(
                file,
                language,
                line_no,
                Severity::Info,
                "todo-comment",
                "TODO comment found",
                None,
            ));
        }

        if is_script && line.contains("console.log") && !line.trim_start().starts_with("//") {
            issues.push(Issue::new(
                file,
                language,
                line_no,
                Severity::Low,
                "no-console",
                "console.log statement found",
                None,
            ));
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_disabled_button_in_markup_yields_one_high_issue() {
        // Scenario: a markup file with `<button disabled>` produces exactly
        // one button-disabled issue at severity high.
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "index.html",
            "<!DOCTYPE html>\n<html>\n<button disabled>Submit</button>\n</html>\n",
        );

        let report = scan_project(&ScanOptions {
            root: dir.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();

        let button_issues: Vec<_> = report
            .issues
            .iter()
            .filter(|i| i.rule == "button-disabled")
            .collect();
        assert_eq!(button_issues.len(), 1);
        assert_eq!(button_issues[0].severity, Severity::High);
        assert_eq!(button_issues[0].line, 3);
        assert_eq!(button_issues[0].status, IssueStatus::Pending);
    }

    #[test]
    fn test_inventory_includes_clean_files() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/clean.py", "def add(a, b):\n    return a + b\n");
        write(&dir, "src/app.js", "app.ready = true; // TODO wire up\n");

        let report = scan_project(&ScanOptions {
            root: dir.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(report.scanned_files, 2);
        assert_eq!(report.all_files.len(), 2);
        assert!(report
            .all_files
            .iter()
            .any(|f| f.path.ends_with("clean.py") && f.language == Language::Python));
        // Only app.js was flagged (TODO marker)
        assert!(report.issues.iter().all(|i| i.file.ends_with("app.js")));
    }

    #[test]
    fn test_excluded_directories_are_skipped() {
        let dir = TempDir::new().unwrap();
        write(&dir, "node_modules/dep/index.js", "console.log('x');\n");
        write(&dir, "src/main.js", "let x = 1;\n");

        let report = scan_project(&ScanOptions {
            root: dir.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(report.scanned_files, 1);
        assert!(report.all_files[0].path.ends_with("main.js"));
    }

    #[test]
    fn test_bug_marked_disabled_assignment_flagged() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "app.js",
            "const btn = document.getElementById('go');\nbtn.disabled = true; // BUG: keeps button dead\n",
        );

        let report = scan_project(&ScanOptions {
            root: dir.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();

        assert!(report
            .issues
            .iter()
            .any(|i| i.rule == "button-disabled" && i.line == 2 && i.severity == Severity::High));
    }

    #[test]
    fn test_console_log_flagged_low() {
        let dir = TempDir::new().unwrap();
        write(&dir, "debug.ts", "console.log(state);\n// console.log(old);\n");

        let report = scan_project(&ScanOptions {
            root: dir.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();

        let logs: Vec<_> = report.issues.iter().filter(|i| i.rule == "no-console").collect();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].severity, Severity::Low);
        assert_eq!(logs[0].line, 1);
    }

    #[test]
    fn test_max_files_cap() {
        let dir = TempDir::new().unwrap();
        for i in 0..5 {
            write(&dir, &format!("f{}.js", i), "let x = 1;\n");
        }

        let report = scan_project(&ScanOptions {
            root: dir.path().to_path_buf(),
            max_files: Some(2),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(report.scanned_files, 2);
    }
}
