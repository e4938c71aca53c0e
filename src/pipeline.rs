//! Single-file fix pipeline
//!
//! The safety core of the tool: read, lock, back up, fix, diff, write,
//! verify.
//! Every step is recorded in order in `checks_run`, so a failed result shows
//! exactly how far the attempt got. The pipeline never panics and never
//! returns `Err` to its caller; all failure is carried in the result value.
//!
//! Fixes come from the pattern registry first. The generative oracle is only
//! consulted when no pattern matches, and its output is accepted only above a
//! confidence floor and only when it actually changes the file.

use crate::diff::naive_diff;
use crate::fixers::apply_first_match;
use crate::language::{detect_language, Language};
use crate::oracle::FixOracle;
use crate::scanner::{Issue, Severity};
use anyhow::{anyhow, Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Oracle fixes below or at this confidence are discarded.
const CONFIDENCE_FLOOR: u8 = 60;

/// Files above this size are refused outright.
const MAX_FILE_SIZE: u64 = 1024 * 1024;

const BACKUP_SUFFIX: &str = ".backup";
const LOCK_SUFFIX: &str = ".lock";

#[derive(Debug, Error)]
pub enum FixError {
    #[error("Failed to read file: {0}")]
    FileRead(String),
    #[error("Unsupported file type")]
    UnsupportedFileType,
    #[error("No applicable fix found")]
    NoApplicableFix,
    #[error("Path escapes the project root: {0}")]
    PathForbidden(String),
    #[error("File too large to fix safely: {0} bytes")]
    FileTooLarge(u64),
    #[error("File is locked by another fix in progress")]
    Locked,
    #[error("Safety constraint violated: {0}")]
    SafetyConstraintViolation(String),
    #[error("Fix verification failed: {0}")]
    VerificationFailed(String),
    #[error("Fix oracle unavailable: {0}")]
    OracleUnavailable(String),
}

/// One fix attempt against one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixRequest {
    pub root: PathBuf,
    pub issue_id: String,
    pub file: String,
    pub description: String,
    pub expected: String,
    pub dry_run: bool,
}

/// Outcome of a fix attempt. `checks_run` lists every step reached, in
/// order, whether or not the attempt succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixPipelineResult {
    pub success: bool,
    /// How the fix was obtained: "pattern" or "ai".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// The registry rule that matched, for pattern fixes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_diff: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checks_run: Vec<String>,
    pub checks_passed: bool,
    pub rollback_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
}

impl FixPipelineResult {
    fn failure(error: FixError, checks_run: Vec<String>) -> Self {
        Self {
            success: false,
            method: None,
            rule: None,
            explanation: None,
            applied_diff: None,
            error: Some(error.to_string()),
            checks_run,
            checks_passed: false,
            rollback_available: false,
            backup_path: None,
        }
    }
}

/// Batch fix options for `fix_all`.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Only touch low/info findings. High-severity fixes need a human eye.
    pub safe_only: bool,
    pub max_fixes: Option<usize>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FixOutcome {
    pub issue_id: String,
    pub result: FixPipelineResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct FixSummary {
    pub fixed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub results: Vec<FixOutcome>,
}

/// Stand-in for callers that run without a generative fallback. Always
/// reports itself unavailable, so only pattern fixes apply.
pub struct NoOracle;

impl FixOracle for NoOracle {
    async fn analyze_and_fix(
        &self,
        _code: &str,
        _description: &str,
        _file_path: &str,
        _language: Language,
    ) -> Result<crate::oracle::OracleFix> {
        Err(anyhow!("no oracle configured"))
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Run the full fix pipeline for a single file.
///
/// Infallible at the call boundary: every internal failure is folded into
/// the returned `FixPipelineResult`.
pub async fn fix_file<O: FixOracle>(
    request: &FixRequest,
    oracle: Option<&O>,
) -> FixPipelineResult {
    let mut checks_run = Vec::new();

    // -- resolve and confine the target path ---------------------------------
    let path = match resolve_target(&request.root, &request.file) {
        Ok(p) => p,
        Err(e) => return FixPipelineResult::failure(e, checks_run),
    };

    // -- read-file -----------------------------------------------------------
    checks_run.push("read-file".to_string());
    match fs::metadata(&path) {
        Ok(meta) if meta.len() > MAX_FILE_SIZE => {
            return FixPipelineResult::failure(FixError::FileTooLarge(meta.len()), checks_run);
        }
        Ok(_) => {}
        Err(e) => {
            return FixPipelineResult::failure(FixError::FileRead(e.to_string()), checks_run);
        }
    }
    let original = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) => {
            return FixPipelineResult::failure(FixError::FileRead(e.to_string()), checks_run);
        }
    };

    // -- detect-language -----------------------------------------------------
    checks_run.push("detect-language".to_string());
    let language = detect_language(&path);
    if !language.is_supported() {
        return FixPipelineResult::failure(FixError::UnsupportedFileType, checks_run);
    }

    // -- acquire-lock --------------------------------------------------------
    checks_run.push("acquire-lock".to_string());
    let _lock = match FileLock::acquire(&path) {
        Ok(l) => l,
        Err(e) => return FixPipelineResult::failure(e, checks_run),
    };

    // -- create-backup -------------------------------------------------------
    // Only one rollback generation is retained: a prior backup is
    // overwritten. Dry runs never write, so they take no backup.
    let backup = backup_path(&path);
    if !request.dry_run {
        checks_run.push("create-backup".to_string());
        if let Err(e) = fs::write(&backup, &original) {
            return FixPipelineResult::failure(FixError::FileRead(e.to_string()), checks_run);
        }
    }

    // -- apply-fix -----------------------------------------------------------
    checks_run.push("apply-fix".to_string());
    let fix = match produce_fix(
        &original,
        language,
        &request.description,
        &request.expected,
        &request.file,
        oracle,
    )
    .await
    {
        Ok(f) => f,
        Err(e) => {
            // The backup already exists by this point, so report it.
            let mut result = FixPipelineResult::failure(e, checks_run);
            if !request.dry_run {
                result.rollback_available = true;
                result.backup_path = Some(backup);
            }
            return result;
        }
    };

    // -- generate-diff -------------------------------------------------------
    checks_run.push("generate-diff".to_string());
    let diff = naive_diff(&request.file, &original, &fix.fixed);

    if request.dry_run {
        return FixPipelineResult {
            success: true,
            method: Some(fix.method.to_string()),
            rule: fix.rule,
            explanation: Some(fix.explanation),
            applied_diff: Some(diff),
            error: None,
            checks_run,
            checks_passed: true,
            rollback_available: false,
            backup_path: None,
        };
    }

    // -- write-file ----------------------------------------------------------
    checks_run.push("write-file".to_string());
    if let Err(e) = fs::write(&path, &fix.fixed) {
        // A partial write may have corrupted the file; put the original back.
        let _ = fs::copy(&backup, &path);
        let mut result =
            FixPipelineResult::failure(FixError::FileRead(e.to_string()), checks_run);
        result.rollback_available = true;
        result.backup_path = Some(backup);
        return result;
    }

    // -- verify-fix ----------------------------------------------------------
    // Verification failure does not reverse the write. The fix is committed
    // and reported with checks_passed = false; undoing it is the caller's
    // call, via rollback_fix.
    checks_run.push("verify-fix".to_string());
    let verification = verify_fix(language, &fix.fixed);
    let checks_passed = verification.is_ok();
    let error = verification
        .err()
        .map(|reason| FixError::VerificationFailed(reason).to_string());

    FixPipelineResult {
        success: true,
        method: Some(fix.method.to_string()),
        rule: fix.rule,
        explanation: Some(fix.explanation),
        applied_diff: Some(diff),
        error,
        checks_run,
        checks_passed,
        rollback_available: true,
        backup_path: Some(backup),
    }
}

/// A fix obtained from either source, with its provenance.
struct ProducedFix {
    fixed: String,
    /// "pattern" or "ai".
    method: &'static str,
    rule: Option<String>,
    explanation: String,
}

/// Pattern registry first, oracle second. Oracle output is accepted only
/// above the confidence floor and only when it changes the file.
async fn produce_fix<O: FixOracle>(
    original: &str,
    language: Language,
    description: &str,
    expected: &str,
    file: &str,
    oracle: Option<&O>,
) -> Result<ProducedFix, FixError> {
    if let Some(fix) = apply_first_match(original, language, description, expected) {
        return Ok(ProducedFix {
            fixed: fix.fixed,
            method: "pattern",
            rule: Some(fix.rule.to_string()),
            explanation: fix.explanation.to_string(),
        });
    }

    let Some(oracle) = oracle else {
        return Err(FixError::NoApplicableFix);
    };

    match oracle
        .analyze_and_fix(original, description, file, language)
        .await
    {
        Ok(fix) if fix.confidence > CONFIDENCE_FLOOR && fix.fixed_code != original => {
            Ok(ProducedFix {
                fixed: fix.fixed_code,
                method: "ai",
                rule: None,
                explanation: fix.explanation,
            })
        }
        Ok(_) => Err(FixError::NoApplicableFix),
        Err(e) => Err(FixError::OracleUnavailable(e.to_string())),
    }
}

/// Restore a previously fixed file from its backup. Takes the same per-file
/// lock as the fix path, so a rollback cannot interleave with a concurrent
/// fix attempt.
pub fn rollback_fix(root: &Path, file: &str) -> Result<()> {
    let path = resolve_target(root, file).map_err(|e| anyhow!(e.to_string()))?;
    let _lock = FileLock::acquire(&path).map_err(|e| anyhow!(e.to_string()))?;
    let backup = backup_path(&path);
    if !backup.exists() {
        return Err(anyhow!("No backup found for {}", file));
    }
    fs::copy(&backup, &path)
        .with_context(|| format!("Failed to restore {} from backup", file))?;
    fs::remove_file(&backup).ok();
    Ok(())
}

/// Apply pattern fixes across a batch of scanner findings.
pub async fn fix_all<O: FixOracle>(
    root: &Path,
    issues: &[Issue],
    options: &BatchOptions,
    oracle: Option<&O>,
) -> FixSummary {
    let mut summary = FixSummary {
        fixed: 0,
        failed: 0,
        skipped: 0,
        results: Vec::new(),
    };

    let mut attempted = 0;
    for issue in issues {
        if let Some(max) = options.max_fixes {
            if attempted >= max {
                summary.skipped += 1;
                continue;
            }
        }
        if options.safe_only && issue.severity < Severity::Low {
            summary.skipped += 1;
            continue;
        }

        attempted += 1;
        let request = FixRequest {
            root: root.to_path_buf(),
            issue_id: issue.id.clone(),
            file: issue.file.clone(),
            description: issue.message.clone(),
            expected: issue.suggested_fix.clone().unwrap_or_default(),
            dry_run: options.dry_run,
        };
        let result = fix_file(&request, oracle).await;
        // A fix that was written but failed verification counts as failed.
        if result.success && result.checks_passed {
            summary.fixed += 1;
        } else {
            summary.failed += 1;
        }
        summary.results.push(FixOutcome {
            issue_id: issue.id.clone(),
            result,
        });
    }

    summary
}

// ============================================================================
// Helpers
// ============================================================================

fn resolve_target(root: &Path, file: &str) -> Result<PathBuf, FixError> {
    let root = root
        .canonicalize()
        .map_err(|e| FixError::FileRead(e.to_string()))?;
    let candidate = root.join(file);
    // Canonicalizing resolves `..` and symlinks before the containment check.
    let resolved = candidate
        .canonicalize()
        .map_err(|e| FixError::FileRead(e.to_string()))?;
    if !resolved.starts_with(&root) {
        return Err(FixError::PathForbidden(file.to_string()));
    }
    Ok(resolved)
}

fn backup_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(BACKUP_SUFFIX);
    PathBuf::from(os)
}

/// Advisory per-file lock held for the duration of one fix attempt.
struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    fn acquire(target: &Path) -> Result<Self, FixError> {
        let mut os = target.as_os_str().to_owned();
        os.push(LOCK_SUFFIX);
        let path = PathBuf::from(os);
        let file = File::create(&path).map_err(|e| FixError::FileRead(e.to_string()))?;
        file.try_lock_exclusive().map_err(|_| FixError::Locked)?;
        Ok(Self { file, path })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = fs::remove_file(&self.path);
    }
}

/// Cheap sanity checks on the fixed content. Not a compiler; the point is
/// catching a fix that obviously destroyed the file.
fn verify_fix(language: Language, content: &str) -> Result<(), String> {
    if content.trim().is_empty() {
        return Err("fixed file is empty".to_string());
    }
    match language {
        Language::Json => serde_json::from_str::<serde_json::Value>(content)
            .map(|_| ())
            .map_err(|e| format!("invalid JSON after fix: {e}")),
        Language::Html => {
            let lower = content.to_lowercase();
            if lower.contains("<!doctype") || lower.contains("<html") {
                Ok(())
            } else {
                Err("fixed HTML lost its document structure".to_string())
            }
        }
        Language::JavaScript | Language::TypeScript => {
            if content.contains("is not defined") {
                Err("fixed code references an undefined symbol".to_string())
            } else {
                Ok(())
            }
        }
        _ => Ok(()),
    }
}
