//! Path policy enforcement and bounded snippet reads.

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use regex::Regex;

use crate::config::WorkspaceConfig;
use crate::error::{AccessError, Error, Result};

/// Marker appended when a snippet was cut at the read bound.
const TRUNCATION_MARKER: &str = "\n[... truncated]";

/// Chunk size for bounded reads; the elapsed budget is checked between
/// chunks so a stalled filesystem cannot eat the whole request deadline.
const READ_CHUNK_BYTES: usize = 8 * 1024;

/// A bounded, policy-checked read of a workspace file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    /// Canonical path after validation.
    pub path: PathBuf,

    /// Path relative to the workspace root, for display in prompts.
    pub display_path: String,

    /// File content, bounded to the snippet limit, valid UTF-8.
    pub content: String,

    /// Whether the content was cut at the read bound.
    pub truncated: bool,
}

/// Gatekeeper for workspace file reads.
///
/// Policy, in order: foreign path syntax, root containment on the
/// canonical path (symlinks resolved), deny-list patterns, extension
/// allow-list, size cap, then a bounded read that rejects binary content.
/// Every read also carries a wall-clock budget, measured from entry to
/// [`WorkspaceGate::open`] and re-checked between read chunks.
///
/// # Examples
///
/// ```no_run
/// use mentor_rs::config::WorkspaceConfig;
/// use mentor_rs::workspace::WorkspaceGate;
///
/// let mut config = WorkspaceConfig::default();
/// config.root = Some("/tmp/ws".into());
/// let gate = WorkspaceGate::new(&config).unwrap();
/// let snippet = gate.open("src/lib.rs").unwrap();
/// assert!(!snippet.content.is_empty());
/// ```
#[derive(Debug)]
pub struct WorkspaceGate {
    root: Option<PathBuf>,
    allowed_extensions: HashSet<String>,
    denied: Vec<Regex>,
    max_file_bytes: u64,
    snippet_bytes: usize,
    read_budget: Duration,
}

impl WorkspaceGate {
    /// Builds a gate from the workspace policy.
    ///
    /// The root is canonicalized once here; a missing root directory is a
    /// configuration error, not a per-request denial.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if a deny-list pattern fails to compile
    /// or the configured root cannot be canonicalized.
    pub fn new(config: &WorkspaceConfig) -> Result<Self> {
        let root = match &config.root {
            Some(root) => Some(std::fs::canonicalize(root).map_err(|e| Error::Internal {
                message: format!("workspace root is not resolvable: {e}"),
            })?),
            None => None,
        };

        let mut denied = Vec::with_capacity(config.denied_path_patterns.len());
        for pattern in &config.denied_path_patterns {
            let regex = Regex::new(pattern).map_err(|e| Error::Internal {
                message: format!("invalid deny-list pattern: {e}"),
            })?;
            denied.push(regex);
        }

        Ok(Self {
            root,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
            denied,
            max_file_bytes: config.max_file_bytes,
            snippet_bytes: config.snippet_bytes,
            read_budget: Duration::from_millis(config.read_budget_ms),
        })
    }

    /// Validates `raw` against the policy and reads a bounded snippet.
    ///
    /// # Errors
    ///
    /// Returns the [`AccessError`] naming the first policy violation,
    /// including [`AccessError::TimedOut`] when the read exceeds its
    /// wall-clock budget.
    pub fn open(&self, raw: &str) -> std::result::Result<Snippet, AccessError> {
        let started = Instant::now();

        if has_foreign_syntax(raw) {
            return Err(AccessError::ForeignPathSyntax {
                path: raw.to_string(),
            });
        }

        let Some(root) = &self.root else {
            // No root configured means workspace reads are disabled.
            return Err(AccessError::OutsideRoot {
                path: raw.to_string(),
            });
        };

        let joined = if Path::new(raw).is_absolute() {
            PathBuf::from(raw)
        } else {
            root.join(raw)
        };

        let canonical = std::fs::canonicalize(&joined).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AccessError::NotFound {
                    path: raw.to_string(),
                }
            } else {
                AccessError::Unreadable {
                    path: raw.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        if !canonical.starts_with(root) {
            return Err(AccessError::OutsideRoot {
                path: raw.to_string(),
            });
        }

        let canonical_str = canonical.to_string_lossy();
        if self.denied.iter().any(|re| re.is_match(&canonical_str)) {
            return Err(AccessError::DeniedPattern {
                path: raw.to_string(),
            });
        }

        let extension = canonical
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !self.allowed_extensions.contains(&extension) {
            return Err(AccessError::ExtensionNotAllowed { extension });
        }

        let metadata = std::fs::metadata(&canonical).map_err(|e| AccessError::Unreadable {
            path: raw.to_string(),
            reason: e.to_string(),
        })?;
        if !metadata.is_file() {
            return Err(AccessError::NotAFile {
                path: raw.to_string(),
            });
        }
        if metadata.len() > self.max_file_bytes {
            return Err(AccessError::TooLarge {
                size: metadata.len(),
                max: self.max_file_bytes,
            });
        }

        let (content, truncated) = self.read_bounded(&canonical, raw, started)?;

        let display_path = canonical
            .strip_prefix(root)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| canonical_str.into_owned());

        Ok(Snippet {
            path: canonical,
            display_path,
            content,
            truncated,
        })
    }

    /// Reads at most the snippet bound, cutting at a UTF-8 boundary.
    ///
    /// Reads in chunks and checks the elapsed budget between chunks, so
    /// neither a huge file nor a stalled filesystem can run past the cap
    /// unnoticed.
    fn read_bounded(
        &self,
        path: &Path,
        raw: &str,
        started: Instant,
    ) -> std::result::Result<(String, bool), AccessError> {
        let mut file = std::fs::File::open(path).map_err(|e| AccessError::Unreadable {
            path: raw.to_string(),
            reason: e.to_string(),
        })?;

        // One extra byte distinguishes "exactly at the bound" from
        // "truncated".
        let limit = self.snippet_bytes + 1;
        let mut buffer = Vec::with_capacity(limit.min(READ_CHUNK_BYTES));
        let mut chunk = [0u8; READ_CHUNK_BYTES];
        while buffer.len() < limit {
            if started.elapsed() >= self.read_budget {
                return Err(AccessError::TimedOut {
                    path: raw.to_string(),
                });
            }
            let want = (limit - buffer.len()).min(READ_CHUNK_BYTES);
            let got = file
                .read(&mut chunk[..want])
                .map_err(|e| AccessError::Unreadable {
                    path: raw.to_string(),
                    reason: e.to_string(),
                })?;
            if got == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..got]);
        }

        let truncated = buffer.len() > self.snippet_bytes;
        if truncated {
            let boundary = find_char_boundary(&buffer, self.snippet_bytes);
            buffer.truncate(boundary);
        }

        if buffer.contains(&0) {
            return Err(AccessError::Unreadable {
                path: raw.to_string(),
                reason: "binary content".to_string(),
            });
        }

        let mut content = match String::from_utf8(buffer) {
            Ok(content) => content,
            Err(e) if truncated => {
                // The cut may have landed inside a multi-byte sequence.
                let valid = e.utf8_error().valid_up_to();
                let mut bytes = e.into_bytes();
                bytes.truncate(valid);
                String::from_utf8(bytes).map_err(|_| AccessError::Unreadable {
                    path: raw.to_string(),
                    reason: "invalid UTF-8".to_string(),
                })?
            }
            Err(_) => {
                return Err(AccessError::Unreadable {
                    path: raw.to_string(),
                    reason: "invalid UTF-8".to_string(),
                });
            }
        };

        if truncated {
            content.push_str(TRUNCATION_MARKER);
        }
        Ok((content, truncated))
    }
}

/// Detects path syntax from a foreign platform.
///
/// On POSIX hosts Windows-style drive prefixes and backslash separators are
/// rejected outright; on Windows the platform resolver handles both forms.
fn has_foreign_syntax(raw: &str) -> bool {
    if cfg!(windows) {
        return false;
    }
    let bytes = raw.as_bytes();
    let drive_prefix = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    drive_prefix || raw.contains('\\')
}

/// Backs up to a valid UTF-8 boundary at or before `pos`.
const fn find_char_boundary(bytes: &[u8], pos: usize) -> usize {
    if pos >= bytes.len() {
        return bytes.len();
    }
    let mut boundary = pos;
    // UTF-8 continuation bytes start with 10xxxxxx (0x80-0xBF)
    while boundary > 0 && (bytes[boundary] & 0xC0) == 0x80 {
        boundary -= 1;
    }
    boundary
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn gate_for(root: &TempDir) -> WorkspaceGate {
        let mut config = WorkspaceConfig::default();
        config.root = Some(root.path().to_path_buf());
        WorkspaceGate::new(&config).unwrap()
    }

    fn write_file(root: &TempDir, rel: &str, content: &str) {
        let path = root.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_open_allowed_file() {
        let root = TempDir::new().unwrap();
        write_file(&root, "src/lib.rs", "pub fn demo() {}\n");

        let snippet = gate_for(&root).open("src/lib.rs").unwrap();
        assert_eq!(snippet.content, "pub fn demo() {}\n");
        assert_eq!(snippet.display_path, "src/lib.rs");
        assert!(!snippet.truncated);
    }

    #[test]
    fn test_rejects_traversal() {
        let root = TempDir::new().unwrap();
        // Denied as escaping the root, or as unresolvable in a sandboxed
        // environment; either way nothing is read.
        let result = gate_for(&root).open("../../etc/shadow");
        assert!(matches!(
            result,
            Err(AccessError::OutsideRoot { .. } | AccessError::NotFound { .. })
        ));
    }

    #[test]
    fn test_rejects_absolute_path_outside_root() {
        let root = TempDir::new().unwrap();
        let result = gate_for(&root).open("/etc/hosts");
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_rejects_symlink_escape() {
        let root = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("leak.rs"), "fn secret() {}").unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("leak.rs"),
            root.path().join("inside.rs"),
        )
        .unwrap();

        let result = gate_for(&root).open("inside.rs");
        assert!(matches!(result, Err(AccessError::OutsideRoot { .. })));
    }

    #[test]
    fn test_rejects_denied_pattern() {
        let root = TempDir::new().unwrap();
        write_file(&root, ".git/config.txt", "[core]\n");

        let result = gate_for(&root).open(".git/config.txt");
        assert!(matches!(result, Err(AccessError::DeniedPattern { .. })));
    }

    #[test]
    fn test_rejects_env_file() {
        let root = TempDir::new().unwrap();
        write_file(&root, ".env", "DB_URL=postgres://");

        let result = gate_for(&root).open(".env");
        assert!(matches!(
            result,
            Err(AccessError::DeniedPattern { .. } | AccessError::ExtensionNotAllowed { .. })
        ));
    }

    #[test]
    fn test_rejects_disallowed_extension() {
        let root = TempDir::new().unwrap();
        write_file(&root, "dump.bin.exe", "MZ");

        let result = gate_for(&root).open("dump.bin.exe");
        assert!(matches!(
            result,
            Err(AccessError::ExtensionNotAllowed { extension }) if extension == "exe"
        ));
    }

    #[test]
    fn test_rejects_oversized_file() {
        let root = TempDir::new().unwrap();
        let mut config = WorkspaceConfig::default();
        config.root = Some(root.path().to_path_buf());
        config.max_file_bytes = 16;
        write_file(&root, "big.md", "this file is longer than sixteen bytes");

        let gate = WorkspaceGate::new(&config).unwrap();
        assert!(matches!(
            gate.open("big.md"),
            Err(AccessError::TooLarge { max: 16, .. })
        ));
    }

    #[test]
    fn test_truncates_at_snippet_bound() {
        let root = TempDir::new().unwrap();
        let mut config = WorkspaceConfig::default();
        config.root = Some(root.path().to_path_buf());
        config.snippet_bytes = 10;
        write_file(&root, "long.md", "0123456789abcdef");

        let gate = WorkspaceGate::new(&config).unwrap();
        let snippet = gate.open("long.md").unwrap();
        assert!(snippet.truncated);
        assert!(snippet.content.starts_with("0123456789"));
        assert!(snippet.content.ends_with("[... truncated]"));
        assert!(!snippet.content.contains("abcdef"));
    }

    #[test]
    fn test_truncation_respects_utf8_boundary() {
        let root = TempDir::new().unwrap();
        let mut config = WorkspaceConfig::default();
        config.root = Some(root.path().to_path_buf());
        config.snippet_bytes = 7; // lands inside the second CJK char
        write_file(&root, "cjk.md", "ab\u{4e16}\u{754c}xyz");

        let gate = WorkspaceGate::new(&config).unwrap();
        let snippet = gate.open("cjk.md").unwrap();
        assert!(snippet.truncated);
        assert!(snippet.content.starts_with("ab\u{4e16}"));
    }

    #[test]
    fn test_zero_read_budget_times_out() {
        let root = TempDir::new().unwrap();
        let mut config = WorkspaceConfig::default();
        config.root = Some(root.path().to_path_buf());
        config.read_budget_ms = 0;
        write_file(&root, "src/lib.rs", "pub fn demo() {}\n");

        let gate = WorkspaceGate::new(&config).unwrap();
        assert!(matches!(
            gate.open("src/lib.rs"),
            Err(AccessError::TimedOut { .. })
        ));
    }

    #[test]
    fn test_generous_read_budget_is_invisible() {
        let root = TempDir::new().unwrap();
        write_file(&root, "src/lib.rs", "pub fn demo() {}\n");
        // The default budget is far above what a local read needs.
        let snippet = gate_for(&root).open("src/lib.rs").unwrap();
        assert_eq!(snippet.content, "pub fn demo() {}\n");
    }

    #[test]
    fn test_chunked_read_crosses_chunk_boundary() {
        let root = TempDir::new().unwrap();
        let mut config = WorkspaceConfig::default();
        config.root = Some(root.path().to_path_buf());
        config.snippet_bytes = 20 * 1024;
        // Larger than one read chunk, smaller than the snippet bound.
        let content = "x".repeat(12 * 1024);
        write_file(&root, "big.md", &content);

        let gate = WorkspaceGate::new(&config).unwrap();
        let snippet = gate.open("big.md").unwrap();
        assert_eq!(snippet.content, content);
        assert!(!snippet.truncated);
    }

    #[test]
    fn test_rejects_binary_content() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("blob.md");
        std::fs::write(&path, [0x68, 0x69, 0x00, 0x21]).unwrap();

        let result = gate_for(&root).open("blob.md");
        assert!(matches!(
            result,
            Err(AccessError::Unreadable { reason, .. }) if reason == "binary content"
        ));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_rejects_windows_syntax_on_posix() {
        let root = TempDir::new().unwrap();
        let gate = gate_for(&root);
        assert!(matches!(
            gate.open(r"C:\Users\me\secrets.txt"),
            Err(AccessError::ForeignPathSyntax { .. })
        ));
        assert!(matches!(
            gate.open(r"src\lib.rs"),
            Err(AccessError::ForeignPathSyntax { .. })
        ));
    }

    #[test]
    fn test_no_root_disables_reads() {
        let config = WorkspaceConfig::default();
        let gate = WorkspaceGate::new(&config).unwrap();
        assert!(matches!(
            gate.open("src/lib.rs"),
            Err(AccessError::OutsideRoot { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let root = TempDir::new().unwrap();
        assert!(matches!(
            gate_for(&root).open("nope.rs"),
            Err(AccessError::NotFound { .. })
        ));
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir(root.path().join("docs.md")).unwrap();
        let result = gate_for(&root).open("docs.md");
        assert!(matches!(result, Err(AccessError::NotAFile { .. })));
    }

    #[test]
    fn test_bad_deny_pattern_is_config_error() {
        let mut config = WorkspaceConfig::default();
        config.denied_path_patterns = vec!["[unclosed".to_string()];
        assert!(WorkspaceGate::new(&config).is_err());
    }
}
