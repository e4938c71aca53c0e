//! Generative fix oracle
//!
//! External collaborator consulted when no pattern fixer matches. The oracle
//! is untrusted: responses may be malformed, low-confidence, or never arrive.
//! Callers must treat every failure as "no fix from this source" and carry
//! on — nothing in this module is allowed to crash a pipeline.

use crate::config::Config;
use crate::language::Language;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ORACLE_TIMEOUT_SECS: u64 = 60;

/// A proposed fix from the oracle, with its self-reported confidence (0-100).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleFix {
    pub fixed_code: String,
    pub explanation: String,
    pub confidence: u8,
}

/// Structured code review from the oracle's review operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeReview {
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub score: u8,
}

/// The generative-fallback seam. The pipeline only ever talks to this trait,
/// so tests substitute in-memory fakes.
pub trait FixOracle: Send + Sync {
    fn analyze_and_fix(
        &self,
        code: &str,
        description: &str,
        file_path: &str,
        language: Language,
    ) -> impl std::future::Future<Output = Result<OracleFix>> + Send;
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// Chat-completions-backed oracle.
pub struct HttpOracle {
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    content: String,
}

impl HttpOracle {
    /// Build an oracle from config; `None` when no API key is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let api_key = config.api_key()?;
        Some(Self {
            endpoint: config.oracle_endpoint(),
            api_key,
            model: config.oracle_model(),
        })
    }

    async fn chat(&self, prompt: &str) -> Result<String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(ORACLE_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: 8192,
            stream: false,
        };

        let response = client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Oracle request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Oracle API error {}: {}", status, text));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .context("Failed to parse oracle response")?;

        chat.choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| anyhow!("Empty oracle response"))
    }

    /// Explain a piece of code in plain language.
    pub async fn explain(&self, code: &str, language: Language) -> Result<String> {
        let prompt = format!(
            "Explain this {lang} code in simple terms:\n\n```{lang}\n{code}\n```\n\nProvide a clear, concise explanation that a junior developer would understand.",
            lang = language,
            code = code,
        );
        self.chat(&prompt).await
    }

    /// Generate test cases targeting a described bug.
    pub async fn generate_tests(
        &self,
        code: &str,
        language: Language,
        description: &str,
    ) -> Result<String> {
        let prompt = format!(
            "Generate test cases for this {lang} code that would catch this bug: \"{desc}\"\n\nCode:\n```{lang}\n{code}\n```\n\nGenerate 3-5 test cases that:\n1. Test the bug scenario\n2. Test edge cases\n3. Test the happy path\n\nReturn ONLY the test code, no explanations.",
            lang = language,
            desc = description,
            code = code,
        );
        self.chat(&prompt).await
    }

    /// Review code quality; tolerant of loosely formatted responses.
    pub async fn review(&self, code: &str, language: Language) -> Result<CodeReview> {
        let prompt = format!(
            "Review this {lang} code for quality, bugs, and best practices:\n\n```{lang}\n{code}\n```\n\nReturn your response in this format:\nISSUES:\n- [list any bugs or problems]\n\nSUGGESTIONS:\n- [list improvements]\n\nSCORE:\n[0-100 quality score]",
            lang = language,
            code = code,
        );
        let text = self.chat(&prompt).await?;
        Ok(parse_review_response(&text))
    }
}

impl FixOracle for HttpOracle {
    async fn analyze_and_fix(
        &self,
        code: &str,
        description: &str,
        file_path: &str,
        language: Language,
    ) -> Result<OracleFix> {
        let prompt = format!(
            "You are an expert code debugger. Analyze and fix this bug with MINIMAL changes.\n\n\
             File: {file}\nLanguage: {lang}\nBug: {desc}\n\n\
             Current Code:\n```{lang}\n{code}\n```\n\n\
             Instructions:\n\
             1. Identify the exact cause of the bug\n\
             2. Make the SMALLEST possible change to fix it\n\
             3. Preserve all existing functionality\n\
             4. Return ONLY valid {lang} code\n\
             5. Do NOT add comments or explanations in the code\n\n\
             Return your response in this EXACT format:\n\
             FIXED_CODE:\n[your fixed code here]\n\n\
             EXPLANATION:\n[brief explanation of what you changed and why]\n\n\
             CONFIDENCE:\n[number from 0-100 indicating your confidence this fixes the bug]",
            file = file_path,
            lang = language,
            desc = description,
        );

        let text = self.chat(&prompt).await?;
        parse_fix_response(&text, code)
    }
}

// ============================================================================
// Response parsing
// ============================================================================

/// Extract the section between `marker` and the next marker (or end of text).
fn section_after<'a>(text: &'a str, marker: &str, next_markers: &[&str]) -> Option<&'a str> {
    let start = text.find(marker)? + marker.len();
    let rest = &text[start..];
    let end = next_markers
        .iter()
        .filter_map(|m| rest.find(m))
        .min()
        .unwrap_or(rest.len());
    Some(rest[..end].trim())
}

/// Strip a surrounding ``` fence, if present.
fn strip_code_fence(s: &str) -> &str {
    let trimmed = s.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        // Skip the optional language tag on the fence line
        let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or(rest);
        return body.trim_end_matches('`').trim();
    }
    trimmed
}

/// Parse the FIXED_CODE / EXPLANATION / CONFIDENCE response.
///
/// Malformed responses degrade: the fixed code falls back to the input (a
/// no-op the pipeline rejects) and the confidence to 50.
pub fn parse_fix_response(text: &str, original_code: &str) -> Result<OracleFix> {
    let fixed_code = section_after(text, "FIXED_CODE:", &["EXPLANATION:", "CONFIDENCE:"])
        .map(strip_code_fence)
        .map(str::to_string)
        .unwrap_or_else(|| original_code.to_string());

    let explanation = section_after(text, "EXPLANATION:", &["CONFIDENCE:"])
        .map(str::to_string)
        .unwrap_or_else(|| "AI-generated fix".to_string());

    let confidence = section_after(text, "CONFIDENCE:", &[])
        .and_then(|s| s.split_whitespace().next())
        .and_then(|s| s.parse::<u8>().ok())
        .map(|c| c.min(100))
        .unwrap_or(50);

    Ok(OracleFix {
        fixed_code,
        explanation,
        confidence,
    })
}

fn parse_review_response(text: &str) -> CodeReview {
    let bullets = |section: Option<&str>| -> Vec<String> {
        section
            .map(|s| {
                s.lines()
                    .filter(|l| l.trim_start().starts_with('-'))
                    .map(|l| l.trim_start().trim_start_matches('-').trim().to_string())
                    .collect()
            })
            .unwrap_or_default()
    };

    let issues = bullets(section_after(text, "ISSUES:", &["SUGGESTIONS:", "SCORE:"]));
    let suggestions = bullets(section_after(text, "SUGGESTIONS:", &["SCORE:"]));
    let score = section_after(text, "SCORE:", &[])
        .and_then(|s| s.split_whitespace().next())
        .and_then(|s| s.parse::<u8>().ok())
        .map(|c| c.min(100))
        .unwrap_or(50);

    CodeReview {
        issues,
        suggestions,
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed_fix_response() {
        let text = "FIXED_CODE:\n```python\ndef f():\n    return 1\n```\n\nEXPLANATION:\nReturned 1 instead of 0.\n\nCONFIDENCE:\n85";
        let fix = parse_fix_response(text, "def f():\n    return 0").unwrap();

        assert_eq!(fix.fixed_code, "def f():\n    return 1");
        assert_eq!(fix.explanation, "Returned 1 instead of 0.");
        assert_eq!(fix.confidence, 85);
    }

    #[test]
    fn test_parse_unfenced_fix_response() {
        let text = "FIXED_CODE:\nlet x = 2;\nEXPLANATION:\nBumped x.\nCONFIDENCE: 70";
        let fix = parse_fix_response(text, "let x = 1;").unwrap();
        assert_eq!(fix.fixed_code, "let x = 2;");
        assert_eq!(fix.confidence, 70);
    }

    #[test]
    fn test_malformed_response_degrades_to_noop() {
        let fix = parse_fix_response("I can't help with that.", "original").unwrap();
        assert_eq!(fix.fixed_code, "original");
        assert_eq!(fix.confidence, 50);
    }

    #[test]
    fn test_parse_review_response_bullets_and_score() {
        let text = "ISSUES:\n- unchecked division\n- silent catch\n\nSUGGESTIONS:\n- add tests\n\nSCORE:\n72";
        let review = parse_review_response(text);
        assert_eq!(review.issues.len(), 2);
        assert_eq!(review.suggestions, vec!["add tests"]);
        assert_eq!(review.score, 72);
    }

    #[test]
    fn test_review_without_sections_defaults() {
        let review = parse_review_response("looks fine to me");
        assert!(review.issues.is_empty());
        assert_eq!(review.score, 50);
    }
}
