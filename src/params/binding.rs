use std::path::{Path, PathBuf};

use crate::foundation::error::{MatflowError, MatflowResult};
use crate::foundation::fs::ensure_dir;

/// Subdirectory of a staging root that holds transient image inputs.
pub const TEMP_INPUTS_DIR: &str = "temp_inputs";

/// A render-time "entry" parameter satisfied by a transient image file.
///
/// The binding owns the file: it is removed when the binding drops, whatever state the job
/// ended in. A staged binding also removes its `temp_inputs` directory once that is empty.
#[derive(Debug)]
pub struct ImageBinding {
    name: String,
    file: TransientFile,
}

impl ImageBinding {
    /// Copy `source` into `<staging_dir>/temp_inputs/` under a name unique to `tag`.
    pub fn stage(
        name: impl Into<String>,
        source: &Path,
        staging_dir: &Path,
        tag: &str,
    ) -> MatflowResult<Self> {
        let name = name.into();
        if !source.is_file() {
            return Err(MatflowError::input_not_found(source));
        }
        let dir = staging_dir.join(TEMP_INPUTS_DIR);
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("png");
        let dest = dir.join(format!("{}_{}.{ext}", sanitize(tag), sanitize(&name)));

        // A sibling binding dropping concurrently may remove the emptied directory.
        let mut attempts = 0;
        loop {
            ensure_dir(&dir)?;
            match std::fs::copy(source, &dest) {
                Ok(_) => break,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound && attempts < 3 => {
                    attempts += 1;
                }
                Err(e) => {
                    return Err(anyhow::Error::new(e)
                        .context(format!(
                            "failed to stage image '{}' to '{}'",
                            source.display(),
                            dest.display()
                        ))
                        .into());
                }
            }
        }
        tracing::debug!(binding = %name, path = %dest.display(), "staged image binding");

        Ok(Self {
            name,
            file: TransientFile {
                path: dest,
                cleanup_dir: Some(dir),
            },
        })
    }

    /// Take ownership of an already-written transient file.
    pub fn adopt(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            file: TransientFile {
                path: path.into(),
                cleanup_dir: None,
            },
        }
    }

    /// Entry name the image is bound to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Location of the staged copy.
    pub fn path(&self) -> &Path {
        &self.file.path
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[derive(Debug)]
struct TransientFile {
    path: PathBuf,
    cleanup_dir: Option<PathBuf>,
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove transient file");
            }
        }
        if let Some(dir) = self.cleanup_dir.take() {
            // Fails while other bindings still live there.
            let _ = std::fs::remove_dir(dir);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/params/binding.rs"]
mod tests;
