//! bugreaper library crate
//!
//! Turns a free-text bug report into a reviewed fix: classify the target,
//! scan for issues, parse the report into a structured spec, generate a
//! regression test and a minimal patch, apply it behind safety gates, and
//! file the result for human review.

pub mod config;
pub mod diff;
pub mod fixers;
pub mod git_ops;
pub mod language;
pub mod oracle;
pub mod orchestrator;
pub mod patch;
pub mod pipeline;
pub mod review;
pub mod runner;
pub mod scanner;
pub mod spec;
pub mod testgen;
