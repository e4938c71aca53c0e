use anyhow::{anyhow, Result};
use bugreaper::config::Config;
use bugreaper::oracle::HttpOracle;
use bugreaper::orchestrator::Orchestrator;
use bugreaper::pipeline::{self, BatchOptions, FixRequest, NoOracle};
use bugreaper::review::HttpReviewSink;
use bugreaper::runner::{GrepSearch, SubprocessTestRunner};
use bugreaper::scanner::{scan_project, ScanOptions};
use bugreaper::spec::{parse_bug_report, spec_to_toml, BugReport};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "bugreaper",
    about = "Automated bug remediation: scan, patch, test, and hand off for review",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a project tree for known issue patterns
    Scan {
        /// Path to the project (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Stop after scanning this many files
        #[arg(long)]
        max_files: Option<usize>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fix a single file, or every scanned issue with --all
    Fix {
        /// Path to the project
        #[arg(default_value = ".")]
        path: PathBuf,

        /// File to fix, relative to the project root
        #[arg(long)]
        file: Option<String>,

        /// What is wrong
        #[arg(long, default_value = "")]
        description: String,

        /// What should happen instead
        #[arg(long, default_value = "")]
        expected: String,

        /// Fix every issue the scanner finds
        #[arg(long)]
        all: bool,

        /// With --all, only touch low-severity findings
        #[arg(long)]
        safe: bool,

        /// With --all, stop after this many fixes
        #[arg(long)]
        max_fixes: Option<usize>,

        /// Show the diff without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Consult the fix oracle when no pattern matches
        #[arg(long)]
        ai: bool,
    },

    /// Run a bug report through the full ten-step pipeline
    Run {
        /// Path to the project
        #[arg(default_value = ".")]
        path: PathBuf,

        #[arg(long)]
        title: String,

        #[arg(long)]
        description: String,

        #[arg(long, default_value = "")]
        expected: String,

        /// Report language tag: typescript, javascript, python, html
        #[arg(long, default_value = "typescript")]
        language: String,

        /// Repository slug for the pull request
        #[arg(long)]
        repo: Option<String>,

        /// Skip the pull-request step
        #[arg(long)]
        no_pr: bool,
    },

    /// Parse a bug report and print the structured spec
    Spec {
        #[arg(long)]
        title: String,

        #[arg(long)]
        description: String,

        #[arg(long, default_value = "")]
        expected: String,

        #[arg(long, default_value = "typescript")]
        language: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load();

    match args.command {
        Command::Scan {
            path,
            max_files,
            json,
        } => cmd_scan(path, max_files, json),
        Command::Fix {
            path,
            file,
            description,
            expected,
            all,
            safe,
            max_fixes,
            dry_run,
            ai,
        } => {
            cmd_fix(
                &config, path, file, description, expected, all, safe, max_fixes, dry_run, ai,
            )
            .await
        }
        Command::Run {
            path,
            title,
            description,
            expected,
            language,
            repo,
            no_pr,
        } => cmd_run(&config, path, title, description, expected, language, repo, no_pr).await,
        Command::Spec {
            title,
            description,
            expected,
            language,
        } => cmd_spec(title, description, expected, language),
    }
}

fn cmd_scan(path: PathBuf, max_files: Option<usize>, json: bool) -> Result<()> {
    eprintln!("  Scanning {}...", path.display());
    let report = scan_project(&ScanOptions {
        root: path,
        exclude: Vec::new(),
        max_files,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    eprintln!(
        "  Scanned {} file(s) in {}ms",
        report.scanned_files, report.duration_ms
    );
    if report.issues.is_empty() {
        println!("No issues found.");
        return Ok(());
    }
    for issue in &report.issues {
        println!(
            "{:>8}  {}:{}  [{}] {}",
            format!("{:?}", issue.severity).to_lowercase(),
            issue.file,
            issue.line,
            issue.rule,
            issue.message
        );
    }
    println!("{} issue(s) found.", report.issues.len());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_fix(
    config: &Config,
    path: PathBuf,
    file: Option<String>,
    description: String,
    expected: String,
    all: bool,
    safe: bool,
    max_fixes: Option<usize>,
    dry_run: bool,
    ai: bool,
) -> Result<()> {
    let oracle = if ai {
        match HttpOracle::from_config(config) {
            Some(o) => Some(o),
            None => {
                eprintln!("  Warning: no oracle API key configured; pattern fixes only.");
                eprintln!("  Set ORACLE_API_KEY or add it to {}", Config::config_location());
                None
            }
        }
    } else {
        None
    };

    if all {
        eprintln!("  Scanning {} for fixable issues...", path.display());
        let report = scan_project(&ScanOptions {
            root: path.clone(),
            exclude: Vec::new(),
            max_files: None,
        })?;
        let summary = pipeline::fix_all(
            &path,
            &report.issues,
            &BatchOptions {
                safe_only: safe,
                max_fixes,
                dry_run,
            },
            oracle.as_ref(),
        )
        .await;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let file = file.ok_or_else(|| anyhow!("--file is required unless --all is given"))?;
    let request = FixRequest {
        root: path,
        issue_id: format!("{}:manual", file),
        file,
        description,
        expected,
        dry_run,
    };

    eprintln!("  Fixing {}...", request.file);
    let result = match oracle.as_ref() {
        Some(o) => pipeline::fix_file(&request, Some(o)).await,
        None => pipeline::fix_file(&request, None::<&NoOracle>).await,
    };
    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_run(
    config: &Config,
    path: PathBuf,
    title: String,
    description: String,
    expected: String,
    language: String,
    repo: Option<String>,
    no_pr: bool,
) -> Result<()> {
    let report = BugReport {
        title,
        description,
        repository: repo.unwrap_or_else(|| config.repository()),
        expected_behavior: expected,
        language,
    };

    let review = if no_pr {
        None
    } else {
        Some(HttpReviewSink::new(
            config.review_api_url(),
            report.repository.clone(),
        ))
    };

    eprintln!("  Starting pipeline for \"{}\"...", report.title);
    let orchestrator = Orchestrator::new(path, SubprocessTestRunner, GrepSearch, review);
    let run = orchestrator.run(&report).await;

    println!("{}", serde_json::to_string_pretty(&run)?);
    match run.status {
        bugreaper::orchestrator::RunStatus::Completed => Ok(()),
        _ => std::process::exit(1),
    }
}

fn cmd_spec(title: String, description: String, expected: String, language: String) -> Result<()> {
    let report = BugReport {
        title,
        description,
        repository: "local/unspecified".to_string(),
        expected_behavior: expected,
        language,
    };
    let spec = parse_bug_report(&report);
    println!("{}", spec_to_toml(&spec)?);
    Ok(())
}
