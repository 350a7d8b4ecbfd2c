use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use memreport_domain::{ExcludeGlobError, ProjectFiles};

#[derive(Debug, thiserror::Error)]
pub enum ProjectScanError {
    #[error("failed to resolve project root '{path}': {source}")]
    Root {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("project root '{0}' is not a directory")]
    NotADirectory(PathBuf),

    #[error(transparent)]
    Exclude(#[from] ExcludeGlobError),
}

/// Directories never considered part of a project.
const SKIPPED_DIRS: &[&str] = &["target", "node_modules"];

/// Collect the files below `root` into a [`ProjectFiles`] oracle.
///
/// Hidden directories and build output directories are skipped. Entries that
/// cannot be read are logged and ignored. The root is canonicalized; when
/// `root` reaches it through a symlink, frames using that spelling resolve
/// too.
pub fn scan_project(root: &Path, excludes: &[String]) -> Result<ProjectFiles, ProjectScanError> {
    let canonical = std::fs::canonicalize(root).map_err(|source| ProjectScanError::Root {
        path: root.to_path_buf(),
        source,
    })?;
    if !canonical.is_dir() {
        return Err(ProjectScanError::NotADirectory(root.to_path_buf()));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(&canonical)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable project entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(&canonical) {
            files.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }

    let root_display = display_root(&canonical);
    debug!("Scanned {} project file(s) below {}", files.len(), root_display);

    let mut project = ProjectFiles::new(&root_display, files);
    if let Some(given) = absolute_root(root) {
        project = project.with_root_alias(&given);
    }
    Ok(project.with_excludes(excludes)?)
}

/// `root` as an absolute path, without resolving symlinks.
fn absolute_root(root: &Path) -> Option<String> {
    let absolute = if root.is_absolute() {
        root.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(root)
    };
    Some(absolute.to_string_lossy().into_owned())
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())
}

/// Canonical paths on Windows carry a `\\?\` verbatim prefix.
fn display_root(path: &Path) -> String {
    let text = path.to_string_lossy();
    text.strip_prefix(r"\\?\").unwrap_or(&text).to_string()
}
