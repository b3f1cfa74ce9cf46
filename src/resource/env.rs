//! Environment variables, including delimited lists such as `PATH`
//!
//! With a delimiter the value is treated as an ordered list. `create` and
//! `modify` put the declared elements first, in declared order, and keep
//! whatever else was already there after them. `delete` removes only the
//! declared elements and drops the variable once nothing is left.

use anyhow::Result;
use declarative::{
    ApplyContext, ApplyResult, Converge, Issue, Probe, ResourceState, describe_change,
};
use regex::{NoExpand, Regex};
use serde::Deserialize;
use std::borrow::Cow;
use std::sync::{Arc, LazyLock};

use crate::error::Error;
use crate::sysenv::{EnvStore, SystemRootLookup, name_problem, value_problem};

/// Variable whose value gets `%SystemRoot%` expanded
pub const SEARCH_PATH: &str = "PATH";

static SYSTEM_ROOT_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)%systemroot%").expect("system root pattern is valid")
});

/// What to do with the variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvAction {
    #[default]
    Create,
    Modify,
    Delete,
}

impl std::fmt::Display for EnvAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Modify => write!(f, "modify"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Declared state of one variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSpec {
    pub value: String,
    pub delimiter: Option<String>,
    pub action: EnvAction,
}

/// Split a delimited value, dropping empty segments
pub fn split_elements<'a>(value: &'a str, delimiter: &str) -> Vec<&'a str> {
    value
        .split(delimiter)
        .filter(|element| !element.is_empty())
        .collect()
}

/// Unique elements, first occurrence wins
fn unique<'a>(elements: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = Vec::new();
    for element in elements {
        if !seen.contains(&element) {
            seen.push(element);
        }
    }
    seen
}

/// Whether `current` has to change to satisfy `desired`
///
/// Without a delimiter the values must be equal. With one, every desired
/// element must appear in `current` in the declared relative order; other
/// elements may be interleaved.
pub fn requires_modify_or_create(
    current: Option<&str>,
    desired: &str,
    delimiter: Option<&str>,
) -> bool {
    let Some(current) = current else {
        return true;
    };
    let Some(delimiter) = delimiter else {
        return current != desired;
    };

    let mut remaining = split_elements(current, delimiter).into_iter();
    !unique(split_elements(desired, delimiter))
        .into_iter()
        .all(|wanted| remaining.any(|element| element == wanted))
}

/// Desired elements first, then any current elements not already present
pub fn merge_elements(current: &str, desired: &str, delimiter: &str) -> String {
    unique(
        split_elements(desired, delimiter)
            .into_iter()
            .chain(split_elements(current, delimiter)),
    )
    .join(delimiter)
}

/// Result of removing elements from a delimited value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// No delimiter, so there are no elements to remove
    NoDelimiter,
    /// Every element was removed; delete the whole variable instead
    Exhausted,
    /// Some elements were removed, leaving this value
    Removed(String),
    /// None of the elements were present
    NothingToRemove,
}

pub fn delete_elements(current: &str, desired: &str, delimiter: Option<&str>) -> DeleteOutcome {
    let Some(delimiter) = delimiter else {
        return DeleteOutcome::NoDelimiter;
    };

    let unwanted = split_elements(desired, delimiter);
    let elements = split_elements(current, delimiter);
    let kept: Vec<&str> = elements
        .iter()
        .copied()
        .filter(|element| !unwanted.contains(element))
        .collect();

    if kept.is_empty() {
        DeleteOutcome::Exhausted
    } else if kept.len() == elements.len() {
        DeleteOutcome::NothingToRemove
    } else {
        DeleteOutcome::Removed(kept.join(delimiter))
    }
}

/// Replace `%SystemRoot%` (any case) with the system root, if known
pub fn expand_system_root<'a>(value: &'a str, lookup: &dyn SystemRootLookup) -> Cow<'a, str> {
    if !SYSTEM_ROOT_TOKEN.is_match(value) {
        return Cow::Borrowed(value);
    }
    match lookup.system_root() {
        Some(root) => SYSTEM_ROOT_TOKEN.replace_all(value, NoExpand(&root)),
        None => Cow::Borrowed(value),
    }
}

/// Write needed to converge a variable
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Keep,
    Create(String),
    Set { from: String, to: String },
    Remove { from: String },
    /// `modify` on a variable that does not exist
    Missing,
}

/// Converges one environment variable
#[derive(Debug)]
pub struct EnvVar {
    state: ResourceState<EnvSpec, Probe<String>>,
    store: Arc<dyn EnvStore>,
    system_root: Arc<dyn SystemRootLookup>,
    /// Declared value after placeholder expansion
    effective: String,
}

impl EnvVar {
    pub fn new(
        name: impl Into<String>,
        spec: EnvSpec,
        store: Arc<dyn EnvStore>,
        system_root: Arc<dyn SystemRootLookup>,
    ) -> Self {
        let effective = spec.value.clone();
        Self {
            state: ResourceState::new(name, spec),
            store,
            system_root,
            effective,
        }
    }

    pub fn name(&self) -> &str {
        self.state.identity()
    }

    pub fn spec(&self) -> &EnvSpec {
        &self.state.desired
    }

    /// Declared value as it will be compared and written
    pub fn effective_value(&self) -> &str {
        &self.effective
    }

    pub fn is_updated(&self) -> bool {
        self.state.is_updated()
    }

    fn delimiter(&self) -> Option<&str> {
        self.state.desired.delimiter.as_deref().filter(|d| !d.is_empty())
    }

    fn current_value(&self) -> Option<&str> {
        self.state
            .current()
            .and_then(Probe::value)
            .map(String::as_str)
    }

    fn refresh(&mut self) {
        let current = Probe::from(self.store.get(self.name()));
        log::debug!("{}: current value {:?}", self.name(), current.value());
        self.state.set_current(current);
    }

    /// Value `create`/`modify` converge an existing variable to
    fn merged(&self, current: &str) -> String {
        match self.delimiter() {
            Some(delimiter) => merge_elements(current, &self.effective, delimiter),
            None => self.effective.clone(),
        }
    }

    fn step(&self) -> Step {
        let current = self.current_value();
        let delimiter = self.delimiter();

        match (self.state.desired.action, current) {
            (EnvAction::Create, None) => Step::Create(self.effective.clone()),
            (EnvAction::Modify, None) => Step::Missing,
            (EnvAction::Create | EnvAction::Modify, Some(current)) => {
                if requires_modify_or_create(Some(current), &self.effective, delimiter) {
                    Step::Set {
                        from: current.to_string(),
                        to: self.merged(current),
                    }
                } else {
                    Step::Keep
                }
            }
            (EnvAction::Delete, None) => Step::Keep,
            (EnvAction::Delete, Some(current)) => {
                match delete_elements(current, &self.effective, delimiter) {
                    DeleteOutcome::NoDelimiter | DeleteOutcome::Exhausted => Step::Remove {
                        from: current.to_string(),
                    },
                    DeleteOutcome::Removed(rest) => Step::Set {
                        from: current.to_string(),
                        to: rest,
                    },
                    DeleteOutcome::NothingToRemove => Step::Keep,
                }
            }
        }
    }
}

impl Converge for EnvVar {
    fn id(&self) -> String {
        format!("env:{}", self.name())
    }

    fn resource_type(&self) -> &'static str {
        "env"
    }

    fn description(&self) -> String {
        format!("{} environment variable {}", self.state.desired.action, self.name())
    }

    fn load_current_state(&mut self) -> Result<()> {
        if self.name().eq_ignore_ascii_case(SEARCH_PATH) {
            self.effective =
                expand_system_root(&self.state.desired.value, self.system_root.as_ref())
                    .into_owned();
        }
        self.refresh();
        Ok(())
    }

    fn validate(&self) -> Vec<Issue> {
        let mut issues = Vec::new();
        let invalid = |attribute: &'static str, value: &str, reason: &'static str| {
            Issue::new(
                self.id(),
                Error::InvalidSpecification {
                    attribute,
                    value: format!("{value:?}"),
                    reason,
                }
                .to_string(),
            )
        };

        if let Some(reason) = name_problem(self.name()) {
            issues.push(invalid("name", self.name(), reason));
        }
        if self.state.desired.action != EnvAction::Delete
            && let Some(reason) = value_problem(&self.effective)
        {
            issues.push(invalid("value", &self.effective, reason));
        }
        if self.step() == Step::Missing {
            issues.push(Issue::new(
                self.id(),
                Error::VariableNotFound(self.name().to_string()).to_string(),
            ));
        }
        issues
    }

    fn needs_update(&self) -> bool {
        !matches!(self.step(), Step::Keep | Step::Missing)
    }

    fn describe_changes(&self) -> Vec<String> {
        match self.step() {
            Step::Keep | Step::Missing => Vec::new(),
            Step::Create(to) => vec![describe_change("value", "", to)],
            Step::Set { from, to } => vec![describe_change("value", from, to)],
            Step::Remove { from } => vec![describe_change("value", from, "")],
        }
    }

    fn apply(&mut self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        if ctx.dry_run {
            return Ok(ApplyResult::Skipped {
                reason: "Dry run".to_string(),
            });
        }

        self.refresh();
        let name = self.name().to_string();

        let result = match self.step() {
            Step::Keep => return Ok(ApplyResult::NoChange),
            Step::Missing => return Err(Error::VariableNotFound(name).into()),
            Step::Create(value) => {
                self.store.set(&name, &value)?;
                log::info!("Created environment variable {name}");
                ApplyResult::Created
            }
            Step::Set { from, to } => {
                self.store.set(&name, &to)?;
                log::info!("Changed {name} from '{from}' to '{to}'");
                ApplyResult::Modified
            }
            Step::Remove { .. } => {
                self.store.remove(&name)?;
                log::info!("Deleted environment variable {name}");
                ApplyResult::Removed
            }
        };

        self.state.mark_updated();
        self.refresh();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::{EnvWrite, FixedSystemRoot, MemoryEnv};
    use crate::sysenv::PersistentEnv;

    fn var(name: &str, value: &str, delimiter: Option<&str>, action: EnvAction, env: &Arc<MemoryEnv>) -> EnvVar {
        EnvVar::new(
            name,
            EnvSpec {
                value: value.to_string(),
                delimiter: delimiter.map(str::to_string),
                action,
            },
            env.clone(),
            Arc::new(FixedSystemRoot(Some(r"C:\Windows".to_string()))),
        )
    }

    fn converge(resource: &mut EnvVar) -> ApplyResult {
        resource.load_current_state().unwrap();
        resource.apply(&mut ApplyContext::default()).unwrap()
    }

    #[test]
    fn test_split_drops_empty_segments() {
        assert_eq!(split_elements("a::b:", ":"), vec!["a", "b"]);
        assert!(split_elements("", ":").is_empty());
    }

    #[test]
    fn test_requires_update_without_delimiter() {
        assert!(requires_modify_or_create(None, "x", None));
        assert!(requires_modify_or_create(Some("y"), "x", None));
        assert!(!requires_modify_or_create(Some("x"), "x", None));
    }

    #[test]
    fn test_requires_update_is_subsequence_check() {
        let sep = Some(":");
        assert!(!requires_modify_or_create(Some("a:b:c"), "a:c", sep));
        assert!(!requires_modify_or_create(Some("x:a:y:c:z"), "a:c", sep));
        assert!(requires_modify_or_create(Some("c:a"), "a:c", sep));
        assert!(requires_modify_or_create(Some("a:b"), "a:d", sep));
        assert!(requires_modify_or_create(None, "a", sep));
        assert!(!requires_modify_or_create(Some("a:b"), "a:a:b", sep));
    }

    #[test]
    fn test_merge_puts_desired_first() {
        assert_eq!(merge_elements("b:c:d", "a:c", ":"), "a:c:b:d");
        assert_eq!(merge_elements("c:a", "a:c", ":"), "a:c");
        assert_eq!(merge_elements("", "a:a:b", ":"), "a:b");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let once = merge_elements("/usr/bin:/bin:/usr/bin", "/bin:/sbin", ":");
        assert_eq!(once, "/bin:/sbin:/usr/bin");
        assert_eq!(merge_elements(&once, &once, ":"), once);
        assert_eq!(merge_elements(&once, "/bin:/sbin", ":"), once);
    }

    #[test]
    fn test_delete_outcomes() {
        assert_eq!(delete_elements("a:b", "a", None), DeleteOutcome::NoDelimiter);
        assert_eq!(
            delete_elements("a:b", "b:a", Some(":")),
            DeleteOutcome::Exhausted
        );
        assert_eq!(
            delete_elements("a:b:c", "b", Some(":")),
            DeleteOutcome::Removed("a:c".into())
        );
        assert_eq!(
            delete_elements("a:b", "x:y", Some(":")),
            DeleteOutcome::NothingToRemove
        );
    }

    #[test]
    fn test_expand_system_root_any_case() {
        let lookup = FixedSystemRoot(Some(r"C:\Windows".to_string()));
        assert_eq!(
            expand_system_root(r"%SYSTEMROOT%\System32;%systemroot%", &lookup),
            r"C:\Windows\System32;C:\Windows"
        );

        let unknown = FixedSystemRoot(None);
        assert_eq!(
            expand_system_root(r"%SystemRoot%\bin", &unknown),
            r"%SystemRoot%\bin"
        );
    }

    #[test]
    fn test_create_missing_variable() {
        let env = Arc::new(MemoryEnv::default());
        let mut resource = var("EDITOR", "vim", None, EnvAction::Create, &env);

        resource.load_current_state().unwrap();
        assert_eq!(
            resource.describe_changes(),
            vec!["change value from '' to 'vim'".to_string()]
        );

        let result = resource.apply(&mut ApplyContext::default()).unwrap();
        assert_eq!(result, ApplyResult::Created);
        assert_eq!(env.get("EDITOR").as_deref(), Some("vim"));
        assert!(resource.is_updated());
    }

    #[test]
    fn test_create_existing_merges_list() {
        let env = Arc::new(MemoryEnv::default().with("MANPATH", "/usr/share/man:/opt/man"));
        let mut resource = var("MANPATH", "/opt/man:/usr/local/man", Some(":"), EnvAction::Create, &env);

        assert_eq!(converge(&mut resource), ApplyResult::Modified);
        assert_eq!(
            env.get("MANPATH").as_deref(),
            Some("/opt/man:/usr/local/man:/usr/share/man")
        );
        assert_eq!(resource.spec().value, "/opt/man:/usr/local/man");
    }

    #[test]
    fn test_converged_list_is_untouched() {
        let env = Arc::new(MemoryEnv::default().with("MANPATH", "/a:/x:/b"));
        let mut resource = var("MANPATH", "/a:/b", Some(":"), EnvAction::Modify, &env);

        assert_eq!(converge(&mut resource), ApplyResult::NoChange);
        assert!(env.writes().is_empty());
        assert!(!resource.is_updated());
    }

    #[test]
    fn test_modify_missing_is_reported_and_fails() {
        let env = Arc::new(MemoryEnv::default());
        let mut resource = var("GOPATH", "/go", None, EnvAction::Modify, &env);

        resource.load_current_state().unwrap();
        let issues = resource.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("cannot modify GOPATH"));
        assert!(!resource.needs_update());

        let err = resource.apply(&mut ApplyContext::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::VariableNotFound(name)) if name == "GOPATH"
        ));
        assert!(env.writes().is_empty());
    }

    #[test]
    fn test_modify_without_delimiter_replaces() {
        let env = Arc::new(MemoryEnv::default().with("PAGER", "more"));
        let mut resource = var("PAGER", "less", None, EnvAction::Modify, &env);

        assert_eq!(converge(&mut resource), ApplyResult::Modified);
        assert_eq!(env.get("PAGER").as_deref(), Some("less"));
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let env = Arc::new(MemoryEnv::default());
        let mut resource = var("GOPATH", "", None, EnvAction::Delete, &env);

        assert_eq!(converge(&mut resource), ApplyResult::NoChange);
        assert!(env.writes().is_empty());
    }

    #[test]
    fn test_delete_without_delimiter_removes_variable() {
        let env = Arc::new(MemoryEnv::default().with("GOPATH", "/go"));
        let mut resource = var("GOPATH", "whatever", None, EnvAction::Delete, &env);

        assert_eq!(converge(&mut resource), ApplyResult::Removed);
        assert_eq!(env.writes(), vec![EnvWrite::Remove("GOPATH".into())]);
    }

    #[test]
    fn test_delete_some_elements() {
        let env = Arc::new(MemoryEnv::default().with("MANPATH", "/a:/b:/c"));
        let mut resource = var("MANPATH", "/b", Some(":"), EnvAction::Delete, &env);

        assert_eq!(converge(&mut resource), ApplyResult::Modified);
        assert_eq!(env.get("MANPATH").as_deref(), Some("/a:/c"));
    }

    #[test]
    fn test_delete_all_elements_removes_variable() {
        let env = Arc::new(MemoryEnv::default().with("MANPATH", "/a:/b"));
        let mut resource = var("MANPATH", "/b:/a", Some(":"), EnvAction::Delete, &env);

        assert_eq!(converge(&mut resource), ApplyResult::Removed);
        assert_eq!(env.get("MANPATH"), None);
    }

    #[test]
    fn test_delete_disjoint_elements_keeps_value() {
        let env = Arc::new(MemoryEnv::default().with("MANPATH", "/a:/b"));
        let mut resource = var("MANPATH", "/x", Some(":"), EnvAction::Delete, &env);

        resource.load_current_state().unwrap();
        assert!(!resource.needs_update());
        assert_eq!(
            resource.apply(&mut ApplyContext::default()).unwrap(),
            ApplyResult::NoChange
        );
        assert_eq!(env.get("MANPATH").as_deref(), Some("/a:/b"));
    }

    #[test]
    fn test_search_path_expands_system_root() {
        let env = Arc::new(MemoryEnv::default().with("Path", r"C:\Windows\System32"));
        let mut resource = var(
            "Path",
            r"%SystemRoot%\System32;C:\tools",
            Some(";"),
            EnvAction::Modify,
            &env,
        );

        resource.load_current_state().unwrap();
        assert_eq!(
            resource.effective_value(),
            r"C:\Windows\System32;C:\tools"
        );
        assert_eq!(resource.spec().value, r"%SystemRoot%\System32;C:\tools");

        assert_eq!(
            resource.apply(&mut ApplyContext::default()).unwrap(),
            ApplyResult::Modified
        );
        assert_eq!(
            env.get("Path").as_deref(),
            Some(r"C:\Windows\System32;C:\tools")
        );
    }

    #[test]
    fn test_other_variables_are_not_expanded() {
        let env = Arc::new(MemoryEnv::default());
        let mut resource = var("PROMPT", "%SystemRoot%", None, EnvAction::Create, &env);

        resource.load_current_state().unwrap();
        assert_eq!(resource.effective_value(), "%SystemRoot%");
    }

    #[test]
    fn test_dry_run_skips() {
        let env = Arc::new(MemoryEnv::default());
        let mut resource = var("EDITOR", "vim", None, EnvAction::Create, &env);

        resource.load_current_state().unwrap();
        let result = resource.apply(&mut ApplyContext::new(true, false)).unwrap();
        assert!(matches!(result, ApplyResult::Skipped { .. }));
        assert!(env.writes().is_empty());
    }

    fn persistent(dir: &tempfile::TempDir, name: &str, value: &str, action: EnvAction) -> EnvVar {
        EnvVar::new(
            name,
            EnvSpec {
                value: value.to_string(),
                delimiter: None,
                action,
            },
            Arc::new(PersistentEnv::new(dir.path().join("60-steward.conf"))),
            Arc::new(FixedSystemRoot(None)),
        )
    }

    #[test]
    fn test_unstorable_name_is_reported_and_not_applied() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut resource = persistent(&temp_dir, "STEWARD_TEST=BAD", "x", EnvAction::Create);

        resource.load_current_state().unwrap();
        let issues = resource.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("name contains '='"));

        assert!(resource.apply(&mut ApplyContext::default()).is_err());
        assert!(!temp_dir.path().join("60-steward.conf").exists());
    }

    #[test]
    fn test_multiline_value_is_reported_and_not_written() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut resource = persistent(
            &temp_dir,
            "STEWARD_TEST_ENV_MULTILINE",
            "a\nSTEWARD_TEST_ENV_INJECTED=1",
            EnvAction::Create,
        );

        resource.load_current_state().unwrap();
        let issues = resource.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("invalid value specification"));

        assert!(resource.apply(&mut ApplyContext::default()).is_err());
        assert!(!temp_dir.path().join("60-steward.conf").exists());
        assert!(std::env::var_os("STEWARD_TEST_ENV_INJECTED").is_none());
    }

    #[test]
    fn test_empty_value_only_allowed_for_delete() {
        let env = Arc::new(MemoryEnv::default());
        let mut create = var("STEWARD_TEST_ENV_EMPTY", "", None, EnvAction::Create, &env);
        create.load_current_state().unwrap();
        assert_eq!(create.validate().len(), 1);

        let mut delete = var("STEWARD_TEST_ENV_EMPTY", "", None, EnvAction::Delete, &env);
        delete.load_current_state().unwrap();
        assert!(delete.validate().is_empty());
    }

    #[test]
    fn test_delete_inherited_variable_converges() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let name = "STEWARD_TEST_ENV_INHERITED";
        unsafe { std::env::set_var(name, "/opt/old") };

        let mut resource = persistent(&temp_dir, name, "", EnvAction::Delete);
        assert_eq!(converge(&mut resource), ApplyResult::Removed);

        // Next run starts from a process that still inherited the value
        unsafe { std::env::set_var(name, "/opt/old") };
        let mut again = persistent(&temp_dir, name, "", EnvAction::Delete);
        again.load_current_state().unwrap();
        assert!(!again.needs_update());
        assert_eq!(
            again.apply(&mut ApplyContext::default()).unwrap(),
            ApplyResult::NoChange
        );
    }
}
