//! Macro library - one JSON document per saved macro

use pixelmacro_core::{format, Decoded, FormatError, Macro};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: FormatError,
    },
    #[error("{path}: saving would alter the file ({} load warning(s))", .warnings.len())]
    LossyRewrite { path: PathBuf, warnings: Vec<String> },
    #[error("no data directory on this platform")]
    NoDataDir,
}

impl StorageError {
    fn io<'a>(op: &'static str, path: &'a Path) -> impl FnOnce(std::io::Error) -> Self + 'a {
        move |source| StorageError::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            StorageError::Io { path, .. }
            | StorageError::Format { path, .. }
            | StorageError::LossyRewrite { path, .. } => Some(path),
            StorageError::NoDataDir => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

pub struct MacroStorage {
    dir: PathBuf,
}

impl MacroStorage {
    /// `<data dir>/pixelmacro`
    pub fn new() -> Result<Self> {
        let dir = dirs::data_dir()
            .ok_or(StorageError::NoDataDir)?
            .join("pixelmacro");
        Self::with_dir(dir)
    }

    pub fn with_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(StorageError::io("create", &dir))?;
        Ok(Self { dir })
    }

    /// Save under `<name>_<timestamp>.json` and return the full path
    pub fn save(&self, name: &str, m: &Macro) -> Result<PathBuf> {
        let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = self.dir.join(format!("{}_{}.json", sanitize(name), ts));
        save_to(&path, m)?;
        info!(path = %path.display(), steps = m.len(), "saved macro");
        Ok(path)
    }

    /// Load a file from the library; absolute paths are used as given
    pub fn load(&self, filename: &str) -> Result<Decoded> {
        load_from(&self.resolve(filename))
    }

    /// File names of every saved macro, oldest name first
    pub fn list(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        let entries = fs::read_dir(&self.dir).map_err(StorageError::io("list", &self.dir))?;
        for entry in entries {
            let entry = entry.map_err(StorageError::io("list", &self.dir))?;
            if let Some(s) = entry.file_name().to_str() {
                if s.ends_with(".json") {
                    files.push(s.to_string());
                }
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn delete(&self, filename: &str) -> Result<()> {
        let path = self.resolve(filename);
        fs::remove_file(&path).map_err(StorageError::io("delete", &path))?;
        info!(path = %path.display(), "deleted macro");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Where `filename` lives; absolute paths are returned unchanged
    pub fn resolve(&self, filename: &str) -> PathBuf {
        let p = Path::new(filename);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.dir.join(p)
        }
    }
}

/// Write `m` to `path`. The file is replaced in one rename, so a reader never
/// sees a half-written macro.
pub fn save_to(path: &Path, m: &Macro) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(StorageError::io("create", parent))?;
    }
    let tmp = path.with_extension("json.tmp");
    let mut file = fs::File::create(&tmp).map_err(StorageError::io("write", &tmp))?;
    file.write_all(format::serialize_pretty(m).as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(StorageError::io("write", &tmp))?;
    drop(file);
    fs::rename(&tmp, path).map_err(StorageError::io("rename", path))?;
    debug!(path = %path.display(), steps = m.len(), "wrote macro");
    Ok(())
}

pub fn load_from(path: &Path) -> Result<Decoded> {
    let bytes = fs::read(path).map_err(StorageError::io("read", path))?;
    let decoded = format::deserialize_with_warnings(&bytes).map_err(|source| StorageError::Format {
        path: path.to_path_buf(),
        source,
    })?;
    for w in &decoded.warnings {
        warn!(path = %path.display(), "{}", w);
    }
    debug!(
        path = %path.display(),
        steps = decoded.macro_.len(),
        warnings = decoded.warnings.len(),
        "read macro"
    );
    Ok(decoded)
}

/// Refuse to write `decoded` back over `path` when that would rewrite a
/// button label or drop a field, unless `force` is set
pub fn check_rewrite(path: &Path, decoded: &Decoded, force: bool) -> Result<()> {
    let lossy: Vec<String> = decoded
        .warnings
        .iter()
        .filter(|w| w.is_lossy())
        .map(ToString::to_string)
        .collect();
    if lossy.is_empty() {
        return Ok(());
    }
    if force {
        warn!(path = %path.display(), changes = lossy.len(), "rewriting despite load warnings");
        return Ok(());
    }
    Err(StorageError::LossyRewrite {
        path: path.to_path_buf(),
        warnings: lossy,
    })
}

fn sanitize(s: &str) -> String {
    let s: String = s
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if s.is_empty() {
        "macro".to_string()
    } else {
        s
    }
}
