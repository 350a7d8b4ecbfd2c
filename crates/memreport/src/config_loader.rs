//! Loading `memreport.toml` with `includes` resolution.
//!
//! Included files are loaded first, in list order, and the including file is
//! overlaid on top of them. For every key under `[defaults]` the last file
//! that sets it wins.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::debug;

use memreport_types::{ConfigFile, Defaults};

/// Maximum nesting of `includes`.
const MAX_INCLUDE_DEPTH: usize = 10;

/// Load `path` and everything it includes into one [`ConfigFile`].
///
/// `expand_env` runs on each file's text before it is parsed. The returned
/// config has an empty `includes` list.
pub fn load_config_with_includes<F>(path: &Path, expand_env: F) -> Result<ConfigFile>
where
    F: Fn(&str) -> Result<String> + Copy,
{
    let mut visited = HashSet::new();
    let defaults = load_defaults(path, expand_env, &mut visited, 0)?;
    Ok(ConfigFile {
        includes: vec![],
        defaults,
    })
}

fn load_defaults<F>(
    path: &Path,
    expand_env: F,
    visited: &mut HashSet<PathBuf>,
    depth: usize,
) -> Result<Defaults>
where
    F: Fn(&str) -> Result<String> + Copy,
{
    if depth > MAX_INCLUDE_DEPTH {
        bail!(
            "Include depth exceeded maximum of {} levels at '{}'",
            MAX_INCLUDE_DEPTH,
            path.display()
        );
    }

    let canonical = path
        .canonicalize()
        .with_context(|| format!("canonicalize path '{}'", path.display()))?;
    if !visited.insert(canonical) {
        bail!("Circular include detected: '{}'", path.display());
    }

    debug!("Loading config from '{}' (depth {})", path.display(), depth);

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config '{}'", path.display()))?;
    let expanded = expand_env(&text)?;
    let config: ConfigFile =
        toml::from_str(&expanded).with_context(|| format!("parse config '{}'", path.display()))?;

    let base_dir = path.parent().unwrap_or(Path::new("."));
    let mut merged = Defaults::default();

    for include in &config.includes {
        let include_path = base_dir.join(include);
        if !include_path.exists() {
            bail!(
                "Included config file not found: '{}' (resolved from '{}')",
                include_path.display(),
                include
            );
        }
        let included = load_defaults(&include_path, expand_env, visited, depth + 1)?;
        merged = merged.merged_with(included);
    }

    Ok(merged.merged_with(config.defaults))
}
