//! Git operations for the fix workflow
//!
//! Fix branches, staging, and commits. Every run gets its own `fix/` branch
//! so an aborted run never dirties the mainline. Targets that are not git
//! repositories are tolerated: branch creation degrades to returning the
//! name it would have used.

use anyhow::{Context, Result};
use git2::{IndexAddOption, Repository, Signature};
use std::path::Path;

/// Create a `fix/{run_id}` branch from main (or master, or HEAD) and check
/// it out. Returns the branch name even when `repo_path` is not a git
/// repository, so the rest of the run can proceed against a bare directory.
pub fn create_fix_branch(repo_path: &Path, run_id: &str) -> Result<String> {
    let branch_name = format!("fix/{}", run_id);

    let repo = match Repository::open(repo_path) {
        Ok(r) => r,
        Err(_) => return Ok(branch_name),
    };

    let base_commit = repo
        .find_branch("main", git2::BranchType::Local)
        .or_else(|_| repo.find_branch("master", git2::BranchType::Local))
        .and_then(|b| b.get().peel_to_commit())
        .or_else(|_| repo.head().and_then(|h| h.peel_to_commit()))
        .context("Repository has no commits to branch from")?;

    repo.branch(&branch_name, &base_commit, false)
        .with_context(|| format!("Failed to create branch '{}'", branch_name))?;

    let (object, reference) = repo
        .revparse_ext(&branch_name)
        .with_context(|| format!("Branch '{}' not found after creation", branch_name))?;
    repo.checkout_tree(&object, None)?;
    match reference {
        Some(r) => repo.set_head(r.name().unwrap_or("HEAD"))?,
        None => repo.set_head_detached(object.id())?,
    }

    Ok(branch_name)
}

/// Stage one file.
pub fn stage_file(repo_path: &Path, file_path: &str) -> Result<()> {
    let repo = Repository::open(repo_path)?;
    let mut index = repo.index()?;
    index.add_path(Path::new(file_path))?;
    index.write()?;
    Ok(())
}

/// Stage everything.
pub fn stage_all(repo_path: &Path) -> Result<()> {
    let repo = Repository::open(repo_path)?;
    let mut index = repo.index()?;
    index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
    index.write()?;
    Ok(())
}

/// Commit staged changes. Author comes from git config, with a tool
/// identity as fallback.
pub fn commit(repo_path: &Path, message: &str) -> Result<String> {
    let repo = Repository::open(repo_path)?;
    let mut index = repo.index()?;

    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;

    let config = repo.config()?;
    let name = config
        .get_string("user.name")
        .unwrap_or_else(|_| "bugreaper".to_string());
    let email = config
        .get_string("user.email")
        .unwrap_or_else(|_| "bugreaper@local".to_string());
    let sig = Signature::now(&name, &email)?;

    let oid = match repo.head().and_then(|h| h.peel_to_commit()) {
        Ok(parent) => repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?,
        Err(_) => repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[])?,
    };

    Ok(oid.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn init_repo(dir: &TempDir) -> Repository {
        let repo = Repository::init(dir.path()).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("user.name", "tester").unwrap();
            config.set_str("user.email", "tester@local").unwrap();
        }
        repo
    }

    #[test]
    fn test_fix_branch_in_bare_directory() {
        let dir = TempDir::new().unwrap();
        let name = create_fix_branch(dir.path(), "run-123").unwrap();
        assert_eq!(name, "fix/run-123");
    }

    #[test]
    fn test_fix_branch_from_initial_commit() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);
        fs::write(dir.path().join("app.js"), "const x = 1;\n").unwrap();
        stage_all(dir.path()).unwrap();
        commit(dir.path(), "initial").unwrap();

        let name = create_fix_branch(dir.path(), "run-abc").unwrap();
        assert_eq!(name, "fix/run-abc");

        let repo = Repository::open(dir.path()).unwrap();
        assert_eq!(repo.head().unwrap().shorthand(), Some("fix/run-abc"));
    }

    #[test]
    fn test_commit_returns_oid() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        stage_file(dir.path(), "a.txt").unwrap();
        let oid = commit(dir.path(), "add a.txt").unwrap();
        assert_eq!(oid.len(), 40);
    }
}
