use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::{Mutex, MutexGuard, OnceLock};

/// Per-project state directory name.
pub const STATE_DIR: &str = ".xavva";

/// Get xavva's global home directory (`~/.xavva`, or `XAVVA_HOME`).
pub fn xavva_home_dir() -> Result<PathBuf, std::io::Error> {
    if let Ok(v) = std::env::var("XAVVA_HOME")
        && !v.trim().is_empty()
    {
        return Ok(PathBuf::from(v));
    }

    let home = dirs::home_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine home directory",
        )
    })?;

    Ok(home.join(".xavva"))
}

/// Shared cache of downloaded JVM agents.
pub fn agents_dir() -> Result<PathBuf, std::io::Error> {
    Ok(xavva_home_dir()?.join("agents"))
}

/// `.xavva/` inside the project.
pub fn state_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(STATE_DIR)
}

#[cfg(test)]
pub(crate) fn test_xavva_home_env_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
