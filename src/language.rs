//! Language classification for scanned and patched files
//!
//! Maps a file path (and, for extensionless files, its content) to a closed
//! set of language tags. `Unknown` means "not supported" — it is never an
//! error on its own; callers decide whether it is fatal.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    TypeScript,
    JavaScript,
    Python,
    Html,
    Css,
    Json,
    Yaml,
    Markdown,
    Sql,
    Unknown,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::Html => "html",
            Language::Css => "css",
            Language::Json => "json",
            Language::Yaml => "yaml",
            Language::Markdown => "markdown",
            Language::Sql => "sql",
            Language::Unknown => "unknown",
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Language::Unknown)
    }

    /// Parse a language tag as it appears in bug reports ("typescript",
    /// "python", ...). Unrecognized tags map to `Unknown`.
    pub fn parse_tag(tag: &str) -> Language {
        match tag.to_lowercase().as_str() {
            "typescript" | "ts" => Language::TypeScript,
            "javascript" | "js" => Language::JavaScript,
            "python" | "py" => Language::Python,
            "html" => Language::Html,
            "css" => Language::Css,
            "json" => Language::Json,
            "yaml" | "yml" => Language::Yaml,
            "markdown" | "md" => Language::Markdown,
            "sql" => Language::Sql,
            _ => Language::Unknown,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn from_extension(ext: &str) -> Option<Language> {
    let lang = match ext {
        "ts" | "tsx" => Language::TypeScript,
        "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
        "py" | "pyw" => Language::Python,
        "html" | "htm" => Language::Html,
        "css" | "scss" | "sass" => Language::Css,
        "json" => Language::Json,
        "yaml" | "yml" => Language::Yaml,
        "md" | "markdown" => Language::Markdown,
        "sql" => Language::Sql,
        _ => return None,
    };
    Some(lang)
}

/// Classify a file from its path alone, falling back to content heuristics
/// for extensionless files. Never fails: unreadable files are `Unknown`.
pub fn detect_language(path: &Path) -> Language {
    // 1. Extension lookup
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        if let Some(lang) = from_extension(&ext.to_lowercase()) {
            return lang;
        }
    }

    // 2. Filename pattern overrides
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        let name = name.to_lowercase();
        if name == "dockerfile" {
            return Language::Unknown;
        }
        if name.ends_with(".config.js") {
            return Language::JavaScript;
        }
        if name.ends_with(".config.ts") {
            return Language::TypeScript;
        }
    }

    // 3./4. Shebang + content heuristics for files without a known extension
    match fs::read_to_string(path) {
        Ok(content) => classify_content(&content),
        Err(_) => Language::Unknown,
    }
}

/// Classify by first line and coarse content patterns.
pub fn classify_content(content: &str) -> Language {
    let first_line = content.lines().next().unwrap_or("");

    if first_line.starts_with("#!") {
        if first_line.contains("python") {
            return Language::Python;
        }
        if first_line.contains("node") {
            return Language::JavaScript;
        }
        if first_line.contains("bash") || first_line.contains("sh") {
            return Language::Unknown;
        }
    }

    if content.contains("<!DOCTYPE html") || content.contains("<html") {
        return Language::Html;
    }
    if content.contains("def ") && content.contains("import ") {
        return Language::Python;
    }
    if content.contains("function ") || content.contains("const ") || content.contains("let ") {
        return Language::JavaScript;
    }

    Language::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_extension_lookup() {
        assert_eq!(detect_language(Path::new("src/app.ts")), Language::TypeScript);
        assert_eq!(detect_language(Path::new("lib/util.mjs")), Language::JavaScript);
        assert_eq!(detect_language(Path::new("tools/run.pyw")), Language::Python);
        assert_eq!(detect_language(Path::new("styles/site.scss")), Language::Css);
        assert_eq!(detect_language(Path::new("notes.markdown")), Language::Markdown);
    }

    #[test]
    fn test_filename_overrides() {
        assert_eq!(detect_language(Path::new("Dockerfile")), Language::Unknown);
        assert_eq!(
            detect_language(Path::new("vite.config.ts")),
            Language::TypeScript
        );
    }

    #[test]
    fn test_unknown_extension_is_not_an_error() {
        assert_eq!(detect_language(Path::new("binary.exe")), Language::Unknown);
        assert_eq!(detect_language(Path::new("does/not/exist")), Language::Unknown);
    }

    #[test]
    fn test_shebang_detection() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "#!/usr/bin/env python").unwrap();
        writeln!(file, "print('hi')").unwrap();
        assert_eq!(detect_language(file.path()), Language::Python);
    }

    #[test]
    fn test_content_heuristics() {
        assert_eq!(
            classify_content("<!DOCTYPE html>\n<html></html>"),
            Language::Html
        );
        assert_eq!(
            classify_content("import os\n\ndef main():\n    pass\n"),
            Language::Python
        );
        assert_eq!(
            classify_content("const x = 1;\n"),
            Language::JavaScript
        );
        assert_eq!(classify_content("плоский текст"), Language::Unknown);
    }

    #[test]
    fn test_parse_tag() {
        assert_eq!(Language::parse_tag("TypeScript"), Language::TypeScript);
        assert_eq!(Language::parse_tag("py"), Language::Python);
        assert_eq!(Language::parse_tag("cobol"), Language::Unknown);
    }
}
