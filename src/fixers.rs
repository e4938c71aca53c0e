//! Per-language pattern fixer registry
//!
//! Each language maps to an ordered list of detect/apply rules. Dispatch is
//! first-match-wins: rules are tried in registration order and the first one
//! whose `detect` fires AND whose `apply` actually changes the content is
//! taken. A rule that matches but produces identical output is treated as a
//! non-match and dispatch continues. The registries are built once at first
//! use and never mutated.

use crate::language::Language;
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// A named detect/transform rule for one language.
pub trait FixPattern: Send + Sync {
    fn name(&self) -> &'static str;
    /// Whether this rule applies to the given code + (lowercased) description.
    fn detect(&self, code: &str, description: &str) -> bool;
    /// Produce the transformed code. May return the input unchanged, in which
    /// case the dispatcher moves on to the next rule.
    fn apply(&self, code: &str, description: &str, expected: &str) -> String;
    fn explanation(&self) -> &'static str;
}

/// Outcome of a successful pattern dispatch.
#[derive(Debug, Clone)]
pub struct PatternFix {
    pub fixed: String,
    pub rule: &'static str,
    pub explanation: &'static str,
}

// ============================================================================
// JavaScript / TypeScript rules
// ============================================================================

struct ButtonDisabled {
    assign_true: Regex,
    button_attr: Regex,
    set_attribute: Regex,
}

impl ButtonDisabled {
    fn new() -> Self {
        Self {
            assign_true: Regex::new(r"(\w+)\.disabled\s*=\s*true;?").unwrap(),
            button_attr: Regex::new(r"(?i)<button([^>]*)\s+disabled([^>]*)>").unwrap(),
            set_attribute: Regex::new(
                r#"(\w+)\.setAttribute\s*\(\s*["']disabled["']\s*,\s*["']disabled["']\s*\);?"#,
            )
            .unwrap(),
        }
    }
}

impl FixPattern for ButtonDisabled {
    fn name(&self) -> &'static str {
        "button-disabled"
    }

    fn detect(&self, code: &str, description: &str) -> bool {
        (description.contains("button")
            || description.contains("disabled")
            || description.contains("preventdefault"))
            && (code.contains(".disabled")
                || code.contains("disabled")
                || code.contains("setAttribute")
                || code.contains("preventDefault"))
    }

    fn apply(&self, code: &str, _description: &str, _expected: &str) -> String {
        // Drop lines the author explicitly flagged as the bug
        let filtered: Vec<&str> = code
            .lines()
            .filter(|line| {
                !(line.contains("// BUG")
                    && (line.contains("disabled") || line.contains("button")))
            })
            .collect();
        let mut fixed = filtered.join("\n");

        fixed = self.assign_true.replace_all(&fixed, "$1.disabled = false;").into_owned();
        fixed = self.button_attr.replace_all(&fixed, "<button$1$2>").into_owned();
        fixed = self.set_attribute.replace_all(&fixed, "").into_owned();
        fixed
    }

    fn explanation(&self) -> &'static str {
        "Removed code that disables the button"
    }
}

struct NullCheck {
    member_access: Regex,
}

impl NullCheck {
    fn new() -> Self {
        Self {
            member_access: Regex::new(r"(\w+)\.(\w+)").unwrap(),
        }
    }
}

impl FixPattern for NullCheck {
    fn name(&self) -> &'static str {
        "null-check"
    }

    fn detect(&self, _code: &str, description: &str) -> bool {
        description.contains("null")
            || description.contains("undefined")
            || description.contains("cannot read")
    }

    fn apply(&self, code: &str, _description: &str, _expected: &str) -> String {
        self.member_access
            .replace_all(code, |caps: &Captures| {
                let obj = &caps[1];
                // Globals are always defined; rewriting them just adds noise
                if obj == "console" || obj == "window" || obj == "document" {
                    caps[0].to_string()
                } else {
                    format!("{}?.{}", obj, &caps[2])
                }
            })
            .into_owned()
    }

    fn explanation(&self) -> &'static str {
        "Added optional chaining for null safety"
    }
}

struct AsyncAwait {
    function_decl: Regex,
}

impl AsyncAwait {
    fn new() -> Self {
        Self {
            function_decl: Regex::new(r"function\s+(\w+)").unwrap(),
        }
    }
}

impl FixPattern for AsyncAwait {
    fn name(&self) -> &'static str {
        "async-await"
    }

    fn detect(&self, _code: &str, description: &str) -> bool {
        description.contains("promise")
            || description.contains("async")
            || description.contains("await")
    }

    fn apply(&self, code: &str, _description: &str, _expected: &str) -> String {
        if code.contains(".then(") && !code.contains("async ") {
            self.function_decl
                .replace_all(code, "async function $1")
                .into_owned()
        } else {
            code.to_string()
        }
    }

    fn explanation(&self) -> &'static str {
        "Added async/await for promise handling"
    }
}

// ============================================================================
// Python rules
// ============================================================================

struct DivisionByZero;

impl FixPattern for DivisionByZero {
    fn name(&self) -> &'static str {
        "division-by-zero"
    }

    fn detect(&self, _code: &str, description: &str) -> bool {
        (description.contains("divide") || description.contains("division"))
            && description.contains("zero")
    }

    fn apply(&self, code: &str, _description: &str, _expected: &str) -> String {
        let mut fixed: Vec<String> = Vec::new();
        for line in code.lines() {
            if line.contains('/') && !line.contains("//") && !line.contains("\"\"\"") {
                let indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();
                fixed.push(format!("{}if denominator == 0:", indent));
                fixed.push(format!(
                    "{}    raise ValueError(\"Division by zero\")",
                    indent
                ));
            }
            fixed.push(line.to_string());
        }
        fixed.join("\n")
    }

    fn explanation(&self) -> &'static str {
        "Added division by zero check"
    }
}

struct TypeHints {
    def_decl: Regex,
}

impl TypeHints {
    fn new() -> Self {
        Self {
            def_decl: Regex::new(r"def\s+(\w+)\s*\((.*?)\):").unwrap(),
        }
    }
}

impl FixPattern for TypeHints {
    fn name(&self) -> &'static str {
        "type-hints"
    }

    fn detect(&self, code: &str, description: &str) -> bool {
        description.contains("type") && code.contains("def ") && !code.contains("->")
    }

    fn apply(&self, code: &str, _description: &str, _expected: &str) -> String {
        self.def_decl.replace_all(code, "def $1($2) -> None:").into_owned()
    }

    fn explanation(&self) -> &'static str {
        "Added type hints"
    }
}

// ============================================================================
// HTML rules
// ============================================================================

struct ButtonDisabledAttr {
    button_attr: Regex,
}

impl ButtonDisabledAttr {
    fn new() -> Self {
        Self {
            button_attr: Regex::new(r"<button([^>]*)\s+disabled([^>]*)>").unwrap(),
        }
    }
}

impl FixPattern for ButtonDisabledAttr {
    fn name(&self) -> &'static str {
        "button-disabled-attr"
    }

    fn detect(&self, code: &str, description: &str) -> bool {
        description.contains("button") && code.contains("disabled")
    }

    fn apply(&self, code: &str, _description: &str, _expected: &str) -> String {
        self.button_attr.replace_all(code, "<button$1$2>").into_owned()
    }

    fn explanation(&self) -> &'static str {
        "Removed disabled attribute from button"
    }
}

struct MissingAlt {
    img_tag: Regex,
}

impl MissingAlt {
    fn new() -> Self {
        Self {
            img_tag: Regex::new(r"<img[^>]*>").unwrap(),
        }
    }
}

impl FixPattern for MissingAlt {
    fn name(&self) -> &'static str {
        "missing-alt"
    }

    fn detect(&self, code: &str, description: &str) -> bool {
        description.contains("alt") || (code.contains("<img") && !code.contains("alt="))
    }

    fn apply(&self, code: &str, _description: &str, _expected: &str) -> String {
        self.img_tag
            .replace_all(code, |caps: &Captures| {
                let tag = &caps[0];
                if tag.contains("alt=") {
                    tag.to_string()
                } else {
                    format!("{} alt=\"\">", tag.trim_end_matches('>'))
                }
            })
            .into_owned()
    }

    fn explanation(&self) -> &'static str {
        "Added alt attribute to images"
    }
}

// ============================================================================
// CSS rules
// ============================================================================

struct MissingSemicolon {
    bare_decl: Regex,
}

impl MissingSemicolon {
    fn new() -> Self {
        Self {
            bare_decl: Regex::new(r":\s*([^;}\n]+)(\n)").unwrap(),
        }
    }
}

impl FixPattern for MissingSemicolon {
    fn name(&self) -> &'static str {
        "missing-semicolon"
    }

    fn detect(&self, code: &str, _description: &str) -> bool {
        self.bare_decl.is_match(code)
    }

    fn apply(&self, code: &str, _description: &str, _expected: &str) -> String {
        self.bare_decl.replace_all(code, ": $1;$2").into_owned()
    }

    fn explanation(&self) -> &'static str {
        "Added missing semicolons"
    }
}

// ============================================================================
// Registry
// ============================================================================

static JS_FIXES: LazyLock<Vec<Box<dyn FixPattern>>> = LazyLock::new(|| {
    vec![
        Box::new(ButtonDisabled::new()),
        Box::new(NullCheck::new()),
        Box::new(AsyncAwait::new()),
    ]
});

static PYTHON_FIXES: LazyLock<Vec<Box<dyn FixPattern>>> = LazyLock::new(|| {
    vec![Box::new(DivisionByZero), Box::new(TypeHints::new())]
});

// HTML pages can embed scripts, so the JS rules run after the markup rules.
static HTML_FIXES: LazyLock<Vec<Box<dyn FixPattern>>> = LazyLock::new(|| {
    vec![
        Box::new(ButtonDisabledAttr::new()),
        Box::new(MissingAlt::new()),
        Box::new(ButtonDisabled::new()),
        Box::new(NullCheck::new()),
        Box::new(AsyncAwait::new()),
    ]
});

static CSS_FIXES: LazyLock<Vec<Box<dyn FixPattern>>> =
    LazyLock::new(|| vec![Box::new(MissingSemicolon::new())]);

static NO_FIXES: LazyLock<Vec<Box<dyn FixPattern>>> = LazyLock::new(Vec::new);

/// The ordered rule list for a language. Empty for formats with no rules.
pub fn fixers_for(language: Language) -> &'static [Box<dyn FixPattern>] {
    match language {
        Language::TypeScript | Language::JavaScript => &JS_FIXES,
        Language::Python => &PYTHON_FIXES,
        Language::Html => &HTML_FIXES,
        Language::Css => &CSS_FIXES,
        _ => &NO_FIXES,
    }
}

/// Run the registry for `language` over `code`, first-match-wins.
///
/// The description is lowercased once before rule matching. Returns `None`
/// when no rule detects the issue or every matching rule is a no-op.
pub fn apply_first_match(
    code: &str,
    language: Language,
    description: &str,
    expected: &str,
) -> Option<PatternFix> {
    let desc = description.to_lowercase();

    for fixer in fixers_for(language) {
        if !fixer.detect(code, &desc) {
            continue;
        }
        let fixed = fixer.apply(code, &desc, expected);
        if fixed != code {
            return Some(PatternFix {
                fixed,
                rule: fixer.name(),
                explanation: fixer.explanation(),
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_disabled_strips_bug_line_and_flips_flag() {
        // Scenario: flagged line removed, remaining assignments flipped
        let code = "const btn = get();\nbutton.disabled = true; // BUG\nother.disabled = true;\n";
        let fix = apply_first_match(code, Language::JavaScript, "the button is disabled", "")
            .expect("pattern should match");

        assert_eq!(fix.rule, "button-disabled");
        assert!(!fix.fixed.contains("// BUG"));
        assert!(fix.fixed.contains("other.disabled = false;"));
    }

    #[test]
    fn test_button_attr_removed_from_markup() {
        let code = "<html><button id=\"go\" disabled>Go</button></html>";
        let fix = apply_first_match(code, Language::Html, "Button not working", "")
            .expect("pattern should match");
        assert_eq!(fix.rule, "button-disabled-attr");
        assert!(!fix.fixed.contains("disabled"));
        assert!(fix.fixed.contains("<button id=\"go\">Go</button>"));
    }

    #[test]
    fn test_null_check_skips_globals() {
        let code = "console.log(user.name);";
        let fix = apply_first_match(code, Language::JavaScript, "cannot read name of null", "")
            .expect("pattern should match");
        assert!(fix.fixed.contains("console.log"));
        assert!(fix.fixed.contains("user?.name"));
    }

    #[test]
    fn test_division_guard_inserted_with_indent() {
        let code = "def divide(numerator, denominator):\n    return numerator / denominator\n";
        let fix = apply_first_match(code, Language::Python, "app crashes on divide by zero", "")
            .expect("pattern should match");
        assert!(fix.fixed.contains("    if denominator == 0:"));
        assert!(fix.fixed.contains("raise ValueError(\"Division by zero\")"));
    }

    #[test]
    fn test_noop_rule_falls_through() {
        // async-await detects but changes nothing (no .then chain); no other
        // rule matches, so the dispatcher reports no fix.
        let code = "async function run() { await go(); }";
        let fix = apply_first_match(code, Language::JavaScript, "promise never resolves", "");
        assert!(fix.is_none());
    }

    #[test]
    fn test_no_rules_for_unknown_language() {
        assert!(fixers_for(Language::Unknown).is_empty());
        assert!(apply_first_match("x", Language::Unknown, "anything", "").is_none());
    }

    #[test]
    fn test_css_semicolon_insertion() {
        let code = "a {\n  color: red\n}\n";
        let fix = apply_first_match(code, Language::Css, "styles broken", "")
            .expect("pattern should match");
        assert!(fix.fixed.contains("color: red;"));
    }

    #[test]
    fn test_missing_alt_inserted_only_where_absent() {
        let code = "<img src=\"a.png\"><img src=\"b.png\" alt=\"b\">";
        let fixer = MissingAlt::new();
        let fixed = fixer.apply(code, "images have no alt text", "");
        assert!(fixed.contains("<img src=\"a.png\" alt=\"\">"));
        assert!(fixed.contains("alt=\"b\""));
    }
}
