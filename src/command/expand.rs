//! `${NAME}` expansion and environment merging.

use std::collections::BTreeMap;
use std::ffi::OsString;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static VAR_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static pattern"));

/// Replaces every `${NAME}` in `template`.
///
/// `NAME` resolves against `overrides` first, then against `ambient`; an
/// unresolved reference is left in place verbatim. Bare `$NAME` is untouched
/// and left to the shell.
///
/// # Example
/// ```
/// use std::collections::BTreeMap;
/// use procvisor::command::expand;
///
/// let overrides = BTreeMap::from([("APP".to_string(), "api".to_string())]);
/// let out = expand("${HOME}/${APP}/${NOPE}", &overrides, |k| {
///     (k == "HOME").then(|| "/home/me".to_string())
/// });
/// assert_eq!(out, "/home/me/api/${NOPE}");
/// ```
pub fn expand<F>(template: &str, overrides: &BTreeMap<String, String>, ambient: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    VAR_REF
        .replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            overrides
                .get(name)
                .cloned()
                .or_else(|| ambient(name))
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Ambient process environment with `overrides` applied on top.
///
/// Keys and values are kept as raw OS strings; entries that are not valid
/// Unicode pass through to the child untouched.
pub fn effective_env(overrides: &BTreeMap<String, String>) -> BTreeMap<OsString, OsString> {
    let mut env: BTreeMap<OsString, OsString> = std::env::vars_os().collect();
    env.extend(
        overrides
            .iter()
            .map(|(k, v)| (OsString::from(k), OsString::from(v))),
    );
    env
}
