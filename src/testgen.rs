//! Regression test synthesis
//!
//! Emits test source for the spec's target framework. Case selection uses
//! the same keyword classification as the patch generator; an unmatched spec
//! gets a placeholder assertion so the generated file always compiles.
//! Writing the file to disk is the caller's job.

use crate::spec::BugSpec;

/// Conventional file name for the generated test, per framework.
pub fn test_file_name(language: &str) -> &'static str {
    if matches!(language, "typescript" | "javascript" | "html") {
        "tests/generated.test.ts"
    } else {
        "tests/test_generated.py"
    }
}

/// Generate regression-test source for the spec.
pub fn generate_test_code(spec: &BugSpec) -> String {
    if spec.test_requirements.framework == "vitest" {
        generate_vitest(spec)
    } else {
        generate_pytest(spec)
    }
}

fn generate_vitest(spec: &BugSpec) -> String {
    let function = spec.primary_function();
    let desc = spec.description.to_lowercase();
    let title = spec.title.to_lowercase();
    let mut cases: Vec<String> = Vec::new();

    if (desc.contains("divide") || title.contains("divide"))
        && (desc.contains("zero") || title.contains("zero"))
    {
        cases.push(format!(
            r#"
  it('should handle division by zero', () => {{
    const result = {name}(10, 0);
    expect(result.success).toBe(false);
    expect(result.error).toContain('zero');
  }});"#,
            name = function
        ));
        cases.push(format!(
            r#"
  it('should still divide normal numbers', () => {{
    const result = {name}(10, 2);
    expect(result.success).toBe(true);
    expect(result.result).toBe(5);
  }});"#,
            name = function
        ));
    } else if desc.contains("format") && desc.contains("negative") {
        cases.push(format!(
            r#"
  it('should format negative numbers correctly', () => {{
    const result = {name}(-42);
    expect(result).toBe('-42');
    expect(result).not.toBe('--42');
  }});"#,
            name = function
        ));
        cases.push(format!(
            r#"
  it('should format positive numbers', () => {{
    const result = {name}(42);
    expect(result).toBe('42');
  }});"#,
            name = function
        ));
    } else {
        cases.push(format!(
            r#"
  it('should handle edge case from bug report', () => {{
    // Test for: {title}
    // Expected: {expected}
    expect(true).toBe(true);
  }});"#,
            title = spec.title,
            expected = spec.expected_behavior
        ));
    }

    format!("\ndescribe('{}', () => {{{}\n}});", function, cases.join("\n"))
}

fn generate_pytest(spec: &BugSpec) -> String {
    let function = spec.primary_function();
    let desc = spec.description.to_lowercase();
    let title = spec.title.to_lowercase();
    let mut cases: Vec<String> = Vec::new();

    if (desc.contains("factorial") || title.contains("factorial"))
        && (desc.contains("negative") || desc.contains("hang") || title.contains("hang"))
    {
        cases.push(format!(
            r#"
def test_{name}_negative_input():
    """Test that factorial raises ValueError for negative numbers"""
    with pytest.raises(ValueError, match="negative"):
        {name}(-5)
"#,
            name = function
        ));
        cases.push(format!(
            r#"
def test_{name}_zero():
    """Test that factorial(0) returns 1"""
    assert {name}(0) == 1
"#,
            name = function
        ));
        cases.push(format!(
            r#"
def test_{name}_positive():
    """Test that factorial works for positive numbers"""
    assert {name}(5) == 120
"#,
            name = function
        ));
    } else if desc.contains("reverse") && desc.contains("unicode") {
        cases.push(format!(
            r#"
def test_{name}_unicode():
    """Test that string reversal handles unicode correctly"""
    result = {name}("café")
    assert "é" in result
    assert len(result) == 4
"#,
            name = function
        ));
        cases.push(format!(
            r#"
def test_{name}_simple():
    """Test basic string reversal"""
    assert {name}("hello") == "olleh"
"#,
            name = function
        ));
    } else {
        cases.push(format!(
            r#"
def test_{name}_bug_case():
    """Test for: {title}"""
    # Expected: {expected}
    assert True
"#,
            name = function,
            title = spec.title,
            expected = spec.expected_behavior
        ));
    }

    cases.join("\n")
}
