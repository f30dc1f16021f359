//! Utility functions shared across the engine

/// Extract the file name component from a path-like string.
///
/// Source identifiers are plain strings that may use either separator,
/// so this does not go through `std::path`.
pub fn file_name(path_like: &str) -> String {
    path_like
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(path_like)
        .to_string()
}

/// Extract the lowercased extension from a file name, `"unknown"` when absent.
pub fn file_extension(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_lowercase(),
        _ => "unknown".to_string(),
    }
}

/// Truncate a string to `max_chars` characters, appending an ellipsis when cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_chars).collect();
    format!("{}...", truncated)
}

/// Number of characters in a string.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("docs/report.pdf"), "report.pdf");
        assert_eq!(file_name("C:\\docs\\report.pdf"), "report.pdf");
        assert_eq!(file_name("report.pdf"), "report.pdf");
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("report.PDF"), "pdf");
        assert_eq!(file_extension("archive.tar.gz"), "gz");
        assert_eq!(file_extension("README"), "unknown");
        assert_eq!(file_extension(".hidden"), "unknown");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdefgh", 5), "abcde...");
        // Multi-byte characters must not be split
        assert_eq!(truncate_chars("héllo wörld", 6), "héllo ...");
    }
}
