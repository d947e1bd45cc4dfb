use std::io::Read;
use std::path::{Component, Path, PathBuf};

use anyhow::Context as _;
use sha2::Digest as _;

use crate::foundation::error::{MatflowError, MatflowResult};

/// Create `dir` and all missing parents.
pub fn ensure_dir(dir: &Path) -> MatflowResult<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory '{}'", dir.display()))?;
    Ok(())
}

/// Make `path` absolute and fold `.`/`..` components without touching the filesystem.
///
/// The path may not exist yet (output directories are created late), so this never calls
/// `canonicalize`.
pub fn normalize_lexical(path: &Path) -> MatflowResult<PathBuf> {
    let abs = std::path::absolute(path)
        .with_context(|| format!("failed to resolve path '{}'", path.display()))?;
    let mut out = PathBuf::new();
    for comp in abs.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}

/// Return `Ok(())` when `dir` lies inside one of `allowed` (or `allowed` is empty).
pub fn check_allowed(dir: &Path, allowed: &[PathBuf]) -> MatflowResult<()> {
    if allowed.is_empty() {
        return Ok(());
    }
    let dir = normalize_lexical(dir)?;
    for root in allowed {
        if dir.starts_with(normalize_lexical(root)?) {
            return Ok(());
        }
    }
    Err(MatflowError::permission(format!(
        "output directory '{}' is outside the allowed directories",
        dir.display()
    )))
}

/// Streaming SHA-256 of a file's contents.
pub fn file_sha256(path: &Path) -> MatflowResult<[u8; 32]> {
    let mut f = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MatflowError::input_not_found(path));
        }
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("failed to open '{}'", path.display()))
                .into());
        }
    };
    let mut hasher = sha2::Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().into())
}

/// Total size in bytes of all regular files below `dir`.
pub fn dir_size(dir: &Path) -> MatflowResult<u64> {
    let mut total = 0u64;
    for entry in walkdir::WalkDir::new(dir) {
        let entry =
            entry.with_context(|| format!("failed to walk directory '{}'", dir.display()))?;
        if entry.file_type().is_file() {
            let meta = entry
                .metadata()
                .with_context(|| format!("failed to stat '{}'", entry.path().display()))?;
            total = total.saturating_add(meta.len());
        }
    }
    Ok(total)
}

/// Regular files directly inside `dir`, sorted by path.
pub fn list_files(dir: &Path) -> MatflowResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry =
            entry.with_context(|| format!("failed to list directory '{}'", dir.display()))?;
        if entry.file_type().is_file() {
            out.push(entry.into_path());
        }
    }
    out.sort();
    Ok(out)
}

/// Match `name` against a shell-style pattern supporting `*` and `?`.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((sp, sn)) = star {
            pi = sp + 1;
            ni = sn + 1;
            star = Some((sp, sn + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// Lowercased extension of `path`, if any.
pub fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Keep at most the last `max_chars` characters of `s`.
pub fn tail_chars(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        return s.to_string();
    }
    s.chars().skip(count - max_chars).collect()
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/fs.rs"]
mod tests;
