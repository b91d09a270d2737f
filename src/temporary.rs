//! temp file logic
use std::{
    collections::HashSet,
    iter,
    path::PathBuf,
    sync::{LazyLock, Mutex},
};

static TEMPS: LazyLock<Mutex<HashSet<PathBuf>>> = LazyLock::new(<_>::default);

/// Add a file or directory as temporary so it can be deleted later.
pub fn add(path: impl Into<PathBuf>) {
    TEMPS
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(path.into());
}

/// Delete all added temporary files & directories.
pub async fn clean() {
    let temps = std::mem::take(&mut *TEMPS.lock().unwrap_or_else(|e| e.into_inner()));
    for path in temps {
        match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_dir() => {
                let _ = tokio::fs::remove_dir_all(&path).await;
            }
            Ok(_) => {
                let _ = tokio::fs::remove_file(&path).await;
            }
            Err(_) => {}
        }
    }
}

/// Return a new run directory path inside `parent`, or the current dir if `None`.
///
/// E.g. `.vmafrc-runner-k3Gd9aQp`
pub fn process_dir(parent: Option<PathBuf>) -> PathBuf {
    let mut dir = parent.unwrap_or_default();
    let suffix: String = iter::repeat_with(fastrand::alphanumeric).take(8).collect();
    dir.push(format!(".vmafrc-runner-{suffix}"));
    dir
}
