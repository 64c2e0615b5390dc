//! # Service specification.
//!
//! [`ServiceSpec`] is the static, user-declared definition of one supervisable
//! unit. It is produced by the loader (or built in code) and never mutated by
//! the runtime: per-run state such as the shrinking `wait` list lives on
//! [`Process`](crate::Process).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer};

/// Event a hook list is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Block launch until every named service has stopped.
    Wait,
    /// Launch the named services once this one stops.
    Start,
    /// Terminate the named services once this one stops.
    Stop,
    /// Exempt the named services from failure escalation.
    Kill,
}

impl HookKind {
    /// Hook name as written in the services file.
    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::Wait => "wait",
            HookKind::Start => "start",
            HookKind::Stop => "stop",
            HookKind::Kill => "kill",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered service-name lists, one per [`HookKind`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Hooks {
    /// Services that must have stopped before this one launches.
    #[serde(default)]
    pub wait: Vec<String>,
    /// Services launched when this one stops.
    #[serde(default)]
    pub start: Vec<String>,
    /// Services terminated when this one stops.
    #[serde(default)]
    pub stop: Vec<String>,
    /// Services whose failures never escalate.
    #[serde(default)]
    pub kill: Vec<String>,
}

impl Hooks {
    /// Returns the list attached to `kind`.
    pub fn get(&self, kind: HookKind) -> &[String] {
        match kind {
            HookKind::Wait => &self.wait,
            HookKind::Start => &self.start,
            HookKind::Stop => &self.stop,
            HookKind::Kill => &self.kill,
        }
    }

    fn get_mut(&mut self, kind: HookKind) -> &mut Vec<String> {
        match kind {
            HookKind::Wait => &mut self.wait,
            HookKind::Start => &mut self.start,
            HookKind::Stop => &mut self.stop,
            HookKind::Kill => &mut self.kill,
        }
    }
}

/// Declaration of one service.
///
/// ## Example
/// ```rust
/// use procvisor::{HookKind, ServiceSpec};
///
/// let api = ServiceSpec::new("api", "cargo run")
///     .with_cwd("${HOME}/src/api")
///     .with_env("PORT", "8080")
///     .with_hook(HookKind::Wait, ["migrate"]);
///
/// assert_eq!(api.hooks.get(HookKind::Wait), ["migrate".to_string()]);
/// assert!(!api.ignore_failures);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSpec {
    /// Unique key; filled from the services map key by the loader.
    #[serde(skip)]
    pub name: String,
    /// Working directory template (`${NAME}` references allowed; empty = inherit).
    #[serde(default)]
    pub cwd: String,
    /// Shell command line (`${NAME}` references allowed).
    pub command: String,
    /// Inter-service hooks.
    #[serde(default)]
    pub hooks: Hooks,
    /// Environment overrides merged over the ambient environment.
    #[serde(default, deserialize_with = "scalar_map")]
    pub environs: BTreeMap<String, String>,
    /// Failures of this service never escalate.
    #[serde(default)]
    pub ignore_failures: bool,
    /// Never autoruns; launched only through another service's `start` hook.
    #[serde(default)]
    pub sub_service: bool,
    /// Relaunch after a failed run.
    #[serde(default)]
    pub auto_restart: bool,
}

impl ServiceSpec {
    /// Creates a spec with the given name and command and everything else defaulted.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            ..Self::default()
        }
    }

    /// Returns a new spec with the working-directory template set.
    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = cwd.into();
        self
    }

    /// Returns a new spec with one environment override added.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environs.insert(key.into(), value.into());
        self
    }

    /// Returns a new spec with names appended to the `kind` hook list.
    pub fn with_hook<I, S>(mut self, kind: HookKind, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hooks
            .get_mut(kind)
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Returns a new spec with `ignore_failures` set.
    pub fn with_ignore_failures(mut self, on: bool) -> Self {
        self.ignore_failures = on;
        self
    }

    /// Returns a new spec with `sub_service` set.
    pub fn with_sub_service(mut self, on: bool) -> Self {
        self.sub_service = on;
        self
    }

    /// Returns a new spec with `auto_restart` set.
    pub fn with_auto_restart(mut self, on: bool) -> Self {
        self.auto_restart = on;
        self
    }
}

/// Accepts any YAML scalar as an environment value.
fn scalar_map<'de, D>(de: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    use serde_yaml::Value;

    let raw = BTreeMap::<String, Value>::deserialize(de)?;
    raw.into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => String::new(),
                other => {
                    return Err(D::Error::custom(format!(
                        "environ {key:?} must be a scalar, got {other:?}"
                    )))
                }
            };
            Ok((key, value))
        })
        .collect()
}
