//! Naive line diff
//!
//! The remediation pipeline deliberately preserves the historical diff
//! format: every non-blank old line is emitted as removed and every
//! non-blank new line as added under a single hunk header. That is lossy
//! compared to a minimal unified diff, but it is the observable output
//! downstream tooling (PR bodies, fix results) was built around, so it is
//! kept byte-compatible rather than silently upgraded.

/// Build the (lossy) textual diff between two versions of a file.
pub fn naive_diff(file_name: &str, old: &str, new: &str) -> String {
    let old_lines: Vec<&str> = old.split('\n').collect();
    let new_lines: Vec<&str> = new.split('\n').collect();

    let mut diff = format!("--- a/{}\n+++ b/{}\n", file_name, file_name);
    diff.push_str(&format!(
        "@@ -1,{} +1,{} @@\n",
        old_lines.len(),
        new_lines.len()
    ));

    for line in &old_lines {
        if !line.trim().is_empty() {
            diff.push('-');
            diff.push_str(line);
            diff.push('\n');
        }
    }
    for line in &new_lines {
        if !line.trim().is_empty() {
            diff.push('+');
            diff.push_str(line);
            diff.push('\n');
        }
    }

    diff
}

/// Heuristic changed-line count: the number of line positions where the two
/// versions disagree, including lines only one side has. Not an alignment
/// diff — inserting one line near the top counts everything below it.
pub fn changed_lines(old: &str, new: &str) -> usize {
    let old_lines: Vec<&str> = old.split('\n').collect();
    let new_lines: Vec<&str> = new.split('\n').collect();
    let max = old_lines.len().max(new_lines.len());

    (0..max)
        .filter(|&i| old_lines.get(i) != new_lines.get(i))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_emits_all_old_as_removed_and_new_as_added() {
        let diff = naive_diff("src/a.ts", "one\ntwo", "one\nthree");
        assert!(diff.starts_with("--- a/src/a.ts\n+++ b/src/a.ts\n"));
        assert!(diff.contains("@@ -1,2 +1,2 @@"));
        assert!(diff.contains("-one\n"));
        assert!(diff.contains("-two\n"));
        assert!(diff.contains("+one\n"));
        assert!(diff.contains("+three\n"));
    }

    #[test]
    fn test_diff_skips_blank_lines() {
        let diff = naive_diff("f", "a\n\nb", "a\n\nc");
        assert!(!diff.contains("-\n-"));
        assert_eq!(diff.matches("\n-").count(), 2); // -a and -b only
    }

    #[test]
    fn test_changed_lines_positional() {
        assert_eq!(changed_lines("a\nb\nc", "a\nb\nc"), 0);
        assert_eq!(changed_lines("a\nb\nc", "a\nx\nc"), 1);
        // One inserted line shifts everything after it
        assert_eq!(changed_lines("a\nb", "a\nnew\nb"), 2);
        assert_eq!(changed_lines("a", "a\nb\nc"), 2);
    }
}
