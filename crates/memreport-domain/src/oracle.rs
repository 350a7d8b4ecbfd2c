use std::collections::BTreeSet;
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;

/// Answers "is this path part of the project, and under which name?".
///
/// `lookup` returns the canonical path of a project file, or `None` when the
/// path is outside the project or unknown.
pub trait ProjectOracle {
    fn lookup(&self, path: &str) -> Option<String>;
}

impl<F> ProjectOracle for F
where
    F: Fn(&str) -> Option<String>,
{
    fn lookup(&self, path: &str) -> Option<String> {
        self(path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExcludeGlobError {
    #[error("invalid exclude glob '{glob}': {source}")]
    InvalidGlob {
        glob: String,
        source: globset::Error,
    },

    #[error("failed to build exclude globs: {0}")]
    Build(#[source] globset::Error),
}

/// An in-memory project: a root directory and the files below it.
///
/// Paths are compared lexically: separators are normalized to `/`, `.` and
/// `..` are resolved without touching the file system. Canonical paths are
/// root-relative.
///
/// A project can be reachable under more than one absolute root, for example
/// a symlinked checkout and its resolved target. Extra roots are added with
/// [`ProjectFiles::with_root_alias`].
#[derive(Debug, Clone)]
pub struct ProjectFiles {
    root: NormalPath,
    aliases: Vec<NormalPath>,
    root_display: String,
    files: BTreeSet<String>,
    exclude: Option<GlobSet>,
}

impl ProjectFiles {
    /// Build a project from its root and its files.
    ///
    /// Files may be given relative to the root or as absolute paths below it;
    /// anything else is dropped.
    pub fn new<I, S>(root: &str, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let root_path = normalize(root).unwrap_or_default();
        let mut project = Self {
            root_display: root_path.display(),
            root: root_path,
            aliases: Vec::new(),
            files: BTreeSet::new(),
            exclude: None,
        };

        for file in files {
            let file = file.as_ref();
            match project.relativize(file) {
                Some(relative) => {
                    project.files.insert(relative);
                }
                None => debug!("Ignoring '{}': not below the project root", file),
            }
        }

        project
    }

    /// Treat files matching any of `globs` as outside the project.
    pub fn with_excludes(mut self, globs: &[String]) -> Result<Self, ExcludeGlobError> {
        self.exclude = compile_excludes(globs)?;
        Ok(self)
    }

    /// Also accept absolute paths below `alias` as paths below the root.
    ///
    /// Aliases equal to the root, and relative aliases, are ignored.
    pub fn with_root_alias(mut self, alias: &str) -> Self {
        match normalize(alias) {
            Some(alias) if alias.prefix.is_some() && alias != self.root => {
                debug!("Accepting '{}' as an alias of '{}'", alias.display(), self.root_display);
                self.aliases.push(alias);
            }
            _ => {}
        }
        self
    }

    /// The normalized project root.
    pub fn root(&self) -> &str {
        &self.root_display
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> impl Iterator<Item = &str> + '_ {
        self.files.iter().map(String::as_str)
    }

    /// Express `path` relative to the project root.
    ///
    /// Returns `None` for absolute paths outside the root, relative paths that
    /// climb above it, and the root itself.
    pub fn relativize(&self, path: &str) -> Option<String> {
        let path = normalize(path)?;
        let rest = match &path.prefix {
            None => path.components.as_slice(),
            Some(_) => std::iter::once(&self.root)
                .chain(&self.aliases)
                .find_map(|root| strip_root(&path, root))?,
        };

        if rest.is_empty() {
            return None;
        }
        Some(rest.join("/"))
    }

    fn is_excluded(&self, relative: &str) -> bool {
        self.exclude
            .as_ref()
            .is_some_and(|exclude| exclude.is_match(Path::new(relative)))
    }
}

impl ProjectOracle for ProjectFiles {
    fn lookup(&self, path: &str) -> Option<String> {
        let relative = self.relativize(path)?;
        if !self.files.contains(&relative) || self.is_excluded(&relative) {
            return None;
        }
        Some(relative)
    }
}

/// The components of an absolute `path` below `root`, if it is below it.
fn strip_root<'a>(path: &'a NormalPath, root: &NormalPath) -> Option<&'a [String]> {
    let prefix = path.prefix.as_deref()?;
    let root_prefix = root.prefix.as_deref()?;
    let folded = is_drive(prefix);
    if !same_component(prefix, root_prefix, folded)
        || path.components.len() < root.components.len()
    {
        return None;
    }
    let (head, rest) = path.components.split_at(root.components.len());
    head.iter()
        .zip(&root.components)
        .all(|(a, b)| same_component(a, b, folded))
        .then_some(rest)
}

fn compile_excludes(globs: &[String]) -> Result<Option<GlobSet>, ExcludeGlobError> {
    if globs.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for glob in globs {
        let normalized = glob.replace('\\', "/");
        let parsed = Glob::new(&normalized).map_err(|source| ExcludeGlobError::InvalidGlob {
            glob: glob.clone(),
            source,
        })?;
        builder.add(parsed);
    }

    builder.build().map(Some).map_err(ExcludeGlobError::Build)
}

/// A lexically normalized path.
///
/// `prefix` is `/` for rooted paths and an upper-cased `X:` for Windows drive
/// paths; relative paths have none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct NormalPath {
    prefix: Option<String>,
    components: Vec<String>,
}

impl NormalPath {
    fn display(&self) -> String {
        let joined = self.components.join("/");
        match self.prefix.as_deref() {
            None => joined,
            Some("/") => format!("/{joined}"),
            Some(drive) => format!("{drive}/{joined}"),
        }
    }
}

/// Normalize `path`; `None` when a relative path climbs above its base.
fn normalize(path: &str) -> Option<NormalPath> {
    let replaced = path.trim().replace('\\', "/");
    let (prefix, rest) = split_prefix(&replaced);

    let mut components: Vec<String> = Vec::new();
    for part in rest.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if components.pop().is_none() && prefix.is_none() {
                    return None;
                }
            }
            other => components.push(other.to_string()),
        }
    }

    Some(NormalPath { prefix, components })
}

fn split_prefix(path: &str) -> (Option<String>, &str) {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        let drive = format!("{}:", (bytes[0] as char).to_ascii_uppercase());
        return (Some(drive), &path[2..]);
    }
    if let Some(rest) = path.strip_prefix('/') {
        return (Some("/".to_string()), rest);
    }
    (None, path)
}

fn is_drive(prefix: &str) -> bool {
    prefix.len() == 2 && prefix.ends_with(':')
}

fn same_component(a: &str, b: &str, case_insensitive: bool) -> bool {
    if case_insensitive {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}
