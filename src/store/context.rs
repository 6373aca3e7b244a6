//! Contextual source extraction by byte offsets
//!
//! Returns a line-numbered snippet around a stored entity without ever
//! reading the whole file: a padded byte window is fetched with
//! `substr(CAST(content AS BLOB) …)`, newlines are counted on the raw bytes
//! (multi-byte UTF-8 safe), and only then is the window decoded for display.

use super::helpers::StoreError;
use super::Store;

/// Conservative per-line byte estimate for the overfetch window
const BYTES_PER_LINE_ESTIMATE: u32 = 120;

impl Store {
    /// Extract a snippet for the given line/byte span with `context_lines`
    /// of padding above and below.
    ///
    /// Output: `// Lines D-E\n<lines>` where D and E are the displayed
    /// 1-indexed line numbers after clamping at the file boundaries.
    pub fn extract_context(
        &self,
        file: &str,
        start_line: u32,
        end_line: u32,
        start_byte: u32,
        end_byte: u32,
        context_lines: u32,
    ) -> Result<String, StoreError> {
        let pad = (context_lines + 1) * BYTES_PER_LINE_ESTIMATE;
        let fetch_start = start_byte.saturating_sub(pad);
        let fetch_len = end_byte.saturating_add(pad) - fetch_start;

        let window = self.fetch_window(file, fetch_start, fetch_len)?;
        Ok(render_snippet(
            &window,
            start_line,
            end_line,
            start_byte - fetch_start,
            context_lines,
        ))
    }

    /// Fetch a byte window of stored file content, through the LRU cache.
    fn fetch_window(&self, file: &str, start: u32, len: u32) -> Result<Vec<u8>, StoreError> {
        let key = (file.to_string(), start, len);
        if let Ok(mut cache) = self.window_cache.lock() {
            if let Some(bytes) = cache.get(&key) {
                return Ok(bytes.clone());
            }
        }

        let row: Option<(Option<Vec<u8>>,)> = self.rt.block_on(async {
            sqlx::query_as(
                "SELECT substr(CAST(content AS BLOB), ?1, ?2) FROM files WHERE file_path = ?3",
            )
            .bind(start as i64 + 1) // substr is 1-indexed
            .bind(len as i64)
            .bind(file)
            .fetch_optional(&self.pool)
            .await
        })?;

        let bytes = row
            .and_then(|(b,)| b)
            .ok_or_else(|| StoreError::MissingContent(file.to_string()))?;

        if let Ok(mut cache) = self.window_cache.lock() {
            cache.put(key, bytes.clone());
        }
        Ok(bytes)
    }
}

/// Assemble the snippet from a fetched byte window.
///
/// `rel_start` is the target's start offset within the window. The target's
/// first line index is the newline count before it; the displayed window is
/// `[target − context, target + span + context]` clamped to what was fetched.
fn render_snippet(
    window: &[u8],
    start_line: u32,
    end_line: u32,
    rel_start: u32,
    context_lines: u32,
) -> String {
    let lines: Vec<&[u8]> = window.split(|b| *b == b'\n').collect();
    let prefix = &window[..(rel_start as usize).min(window.len())];
    let target_idx = prefix.iter().filter(|b| **b == b'\n').count();

    let span = end_line.saturating_sub(start_line) as usize;
    let first = target_idx.saturating_sub(context_lines as usize);
    let last = (target_idx + span + context_lines as usize).min(lines.len().saturating_sub(1));

    // Displayed numbers account for clamping at the start of the file
    let display_first = start_line.saturating_sub((target_idx - first) as u32).max(1);
    let display_last = display_first + (last - first) as u32;

    let body = lines[first..=last]
        .iter()
        .map(|l| String::from_utf8_lossy(l))
        .collect::<Vec<_>>()
        .join("\n");

    format!("// Lines {display_first}-{display_last}\n{body}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_file(content: &str) -> (Store, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("graph.db")).unwrap();
        store
            .rt
            .block_on(async {
                sqlx::query(
                    "INSERT INTO files (file_path, content, content_hash, module_path, language) \
                     VALUES ('pkg/a.go', ?1, 'hash', 'pkg', 'go')",
                )
                .bind(content)
                .execute(&store.pool)
                .await
            })
            .unwrap();
        (store, dir)
    }

    /// Byte offset of the start of a 1-indexed line
    fn line_start(content: &str, line: u32) -> u32 {
        content
            .split_inclusive('\n')
            .take(line as usize - 1)
            .map(|l| l.len() as u32)
            .sum()
    }

    #[test]
    fn test_snippet_with_context() {
        let content = (1..=20)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let (store, _dir) = store_with_file(&content);

        // Target: line 10 only, two context lines
        let start = line_start(&content, 10);
        let end = line_start(&content, 11);
        let snippet = store
            .extract_context("pkg/a.go", 10, 10, start, end, 2)
            .unwrap();

        assert!(snippet.starts_with("// Lines 8-12\n"));
        assert!(snippet.contains("line 8"));
        assert!(snippet.contains("line 10"));
        assert!(snippet.contains("line 12"));
        assert!(!snippet.contains("line 13"));
    }

    #[test]
    fn test_snippet_clamped_at_file_start() {
        let content = (1..=10)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let (store, _dir) = store_with_file(&content);

        let snippet = store
            .extract_context("pkg/a.go", 1, 2, 0, line_start(&content, 3), 3)
            .unwrap();

        // No lines above line 1: display starts at 1
        assert!(snippet.starts_with("// Lines 1-"));
        assert!(snippet.contains("line 1"));
        assert!(snippet.contains("line 5"), "span 2 + 3 context below");
    }

    #[test]
    fn test_missing_file_errors() {
        let (store, _dir) = store_with_file("package pkg\n");
        let err = store
            .extract_context("pkg/missing.go", 1, 1, 0, 10, 3)
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingContent(_)));
    }

    #[test]
    fn test_multibyte_content() {
        // Multi-byte characters before the target must not shift line math
        let content = "// héllo wörld\n// ünïcode\nfunc Target() {}\n// after\n";
        let (store, _dir) = store_with_file(content);

        let start = content.find("func Target").unwrap() as u32;
        let end = start + "func Target() {}".len() as u32;
        let snippet = store
            .extract_context("pkg/a.go", 3, 3, start, end, 1)
            .unwrap();

        assert!(snippet.starts_with("// Lines 2-4\n"));
        assert!(snippet.contains("func Target() {}"));
        assert!(snippet.contains("ünïcode"));
    }

    #[test]
    fn test_window_cache_round_trip() {
        let content = (1..=50)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let (store, _dir) = store_with_file(&content);

        let start = line_start(&content, 20);
        let end = line_start(&content, 21);
        let first = store
            .extract_context("pkg/a.go", 20, 20, start, end, 2)
            .unwrap();
        let second = store
            .extract_context("pkg/a.go", 20, 20, start, end, 2)
            .unwrap();
        assert_eq!(first, second);
    }
}
