//! `${VAR}` and `${VAR:-default}` expansion for `memreport.toml`.
//!
//! Expansion runs on the raw config text before TOML parsing, so a variable
//! can supply any value: a project root, an encoding label, part of a glob.

use std::borrow::Cow;

use anyhow::{bail, Result};
use tracing::debug;

/// Expand every `${...}` reference in `text`.
///
/// `${VAR}` requires VAR to be set. `${VAR:-default}` falls back to `default`
/// when VAR is unset or empty. A `$` not followed by `{` is kept as is.
pub fn expand_env_vars(text: &str) -> Result<Cow<'_, str>> {
    if !text.contains("${") {
        return Ok(Cow::Borrowed(text));
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let body_start = start + 2;
        let Some(len) = rest[body_start..].find('}') else {
            let offset = text.len() - rest.len() + start;
            bail!(
                "Unclosed environment variable reference at byte {}: '{}'",
                offset,
                truncate(&rest[start..], 24)
            );
        };
        out.push_str(&expand_reference(&rest[body_start..body_start + len])?);
        rest = &rest[body_start + len + 1..];
    }
    out.push_str(rest);

    Ok(Cow::Owned(out))
}

/// Expand the text between `${` and `}`.
fn expand_reference(reference: &str) -> Result<String> {
    let (name, default) = match reference.split_once(":-") {
        Some((name, default)) => (name, Some(default)),
        None => (reference, None),
    };
    check_name(name)?;

    match (std::env::var(name), default) {
        (Ok(value), Some(_)) if !value.is_empty() => Ok(value),
        (Ok(value), None) => Ok(value),
        (_, Some(default)) => {
            debug!("${{{}}} is unset, using default '{}'", name, default);
            Ok(default.to_string())
        }
        (Err(_), None) => bail!(
            "Environment variable '{}' is not set; use ${{{}:-default}} to provide a fallback",
            name,
            name
        ),
    }
}

fn check_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        bail!("Empty environment variable name in '${{}}'");
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        bail!("Invalid environment variable name '{name}': must start with a letter or '_'");
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        bail!("Invalid environment variable name '{name}': unexpected character '{bad}'");
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
