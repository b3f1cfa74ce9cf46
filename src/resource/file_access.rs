//! File ownership and permission convergence
//!
//! Only attributes the declaration sets are probed and compared. Each
//! differing attribute is fixed with its own system call (`chown` with
//! the other side left alone, `chmod`), so converging the mode never
//! rewrites the owner and vice versa.

use anyhow::{Context, Result};
use declarative::{
    ApplyContext, ApplyResult, Converge, Issue, Probe, ResourceState, describe_change,
};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::identity::{Identifier, IdentityResolver};
use crate::error::{Error, IdentityKind};

/// Permission bits a mode may carry
const MODE_MASK: u32 = 0o7777;

/// How an owner or group was declared
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdSpec {
    /// Numeric id, used as-is after normalization
    Id(i64),
    /// Name resolved through the identity database
    Name(String),
}

impl fmt::Display for IdSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => id.fmt(f),
            Self::Name(name) => name.fmt(f),
        }
    }
}

/// How a mode was declared
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeSpec {
    /// Octal digits, e.g. "0644" or "755"
    Octal(String),
    /// Mode bits used verbatim
    Bits(i64),
}

/// Desired access attributes; `None` means "do not manage"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessSpec {
    pub owner: Option<IdSpec>,
    pub group: Option<IdSpec>,
    pub mode: Option<ModeSpec>,
}

/// Observed access attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessState {
    pub owner: Probe<Identifier>,
    pub group: Probe<Identifier>,
    pub mode: Probe<u32>,
}

/// Ownership and permission bits of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
}

/// File metadata calls
pub trait FileOps: Send + Sync + fmt::Debug {
    /// Read ownership and permission bits
    fn stat(&self, path: &Path) -> io::Result<FileStat>;

    /// Change owner and/or group; `None` leaves that side untouched
    fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()>;

    /// Change permission bits
    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()>;
}

/// The real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemFileOps;

#[cfg(unix)]
impl FileOps for SystemFileOps {
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        use std::os::unix::fs::MetadataExt;

        let meta = std::fs::metadata(path)?;
        Ok(FileStat {
            uid: meta.uid(),
            gid: meta.gid(),
            mode: meta.mode() & MODE_MASK,
        })
    }

    fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
        std::os::unix::fs::chown(path, uid, gid)
    }

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    }
}

#[cfg(not(unix))]
impl FileOps for SystemFileOps {
    fn stat(&self, _path: &Path) -> io::Result<FileStat> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "file ownership is not supported on this platform",
        ))
    }

    fn chown(&self, _path: &Path, _uid: Option<u32>, _gid: Option<u32>) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "chown is not supported on this platform",
        ))
    }

    fn chmod(&self, _path: &Path, _mode: u32) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "chmod is not supported on this platform",
        ))
    }
}

/// Render a mode the way `ls`-literate humans read it
fn mode_to_s(mode: Option<&u32>) -> String {
    mode.map(|m| format!("0{:o}", m & MODE_MASK))
        .unwrap_or_default()
}

/// Converges owner, group and mode of one path
#[derive(Debug)]
pub struct FileAccess {
    state: ResourceState<AccessSpec, AccessState>,
    path: PathBuf,
    identities: Arc<dyn IdentityResolver>,
    fs: Arc<dyn FileOps>,
    target_uid: Option<Identifier>,
    target_gid: Option<Identifier>,
    target_mode: Option<u32>,
    /// Resolution failures, reported at validation time
    deferred: Vec<Error>,
}

impl FileAccess {
    pub fn new(
        path: impl AsRef<Path>,
        spec: AccessSpec,
        identities: Arc<dyn IdentityResolver>,
        fs: Arc<dyn FileOps>,
    ) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            state: ResourceState::new(path.to_string_lossy(), spec),
            path,
            identities,
            fs,
            target_uid: None,
            target_gid: None,
            target_mode: None,
            deferred: Vec::new(),
        }
    }

    /// Observed attributes, once probed
    pub fn current(&self) -> Option<&AccessState> {
        self.state.current()
    }

    /// Whether an applying call changed anything during this run
    pub fn is_updated(&self) -> bool {
        self.state.is_updated()
    }

    /// Numeric id a declared owner or group refers to
    ///
    /// Unset specs yield `Ok(None)`. Numeric specs are normalized and
    /// must fit in 32 bits; names go through the identity database and
    /// fail with [`Error::IdentityNotFound`] if unknown.
    pub fn target_identifier(
        &self,
        kind: IdentityKind,
        spec: Option<&IdSpec>,
    ) -> Result<Option<Identifier>, Error> {
        match spec {
            None => Ok(None),
            Some(IdSpec::Id(raw)) => {
                let id = Identifier::normalized(*raw);
                if id.to_os().is_none() {
                    return Err(Error::InvalidSpecification {
                        attribute: kind.attribute(),
                        value: raw.to_string(),
                        reason: "id does not fit in 32 bits",
                    });
                }
                Ok(Some(id))
            }
            Some(IdSpec::Name(name)) => self.identities.resolve(kind, name).map(Some),
        }
    }

    /// Permission bits a declared mode refers to
    pub fn target_mode(spec: Option<&ModeSpec>) -> Result<Option<u32>, Error> {
        let invalid = |value: String, reason| Error::InvalidSpecification {
            attribute: "mode",
            value,
            reason,
        };

        match spec {
            None => Ok(None),
            Some(ModeSpec::Octal(text)) => {
                let digits = text.trim();
                let digits = digits.strip_prefix("0o").unwrap_or(digits);
                u32::from_str_radix(digits, 8)
                    .map(|m| Some(m & MODE_MASK))
                    .map_err(|_| invalid(format!("'{text}'"), "not an octal number"))
            }
            Some(ModeSpec::Bits(bits)) => u32::try_from(*bits)
                .map(|m| Some(m & MODE_MASK))
                .map_err(|_| invalid(bits.to_string(), "mode must be non-negative")),
        }
    }

    /// Compute the numeric targets, deferring lookup failures
    fn resolve_targets(&mut self) -> Result<()> {
        self.deferred.clear();

        let owner = self.target_identifier(IdentityKind::User, self.state.desired.owner.as_ref());
        self.target_uid = self.defer(owner)?;

        let group = self.target_identifier(IdentityKind::Group, self.state.desired.group.as_ref());
        self.target_gid = self.defer(group)?;

        self.target_mode = Self::target_mode(self.state.desired.mode.as_ref())?;
        Ok(())
    }

    fn defer(&mut self, resolved: Result<Option<Identifier>, Error>) -> Result<Option<Identifier>> {
        match resolved {
            Ok(id) => Ok(id),
            Err(e @ Error::IdentityNotFound { .. }) => {
                log::debug!("{}: {}", self.path.display(), e);
                self.deferred.push(e);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stat the path, probing only the managed attributes
    fn probe(&self) -> Result<AccessState> {
        let spec = &self.state.desired;
        let stat = match self.fs.stat(&self.path) {
            Ok(stat) => Some(stat),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to stat {}", self.path.display()));
            }
        };

        let observe = |managed: bool, value: Option<u32>| -> Probe<u32> {
            if managed { Probe::from(value) } else { Probe::NotProbed }
        };

        Ok(AccessState {
            owner: observe(spec.owner.is_some(), stat.map(|s| s.uid)).map(Identifier::from),
            group: observe(spec.group.is_some(), stat.map(|s| s.gid)).map(Identifier::from),
            mode: observe(spec.mode.is_some(), stat.map(|s| s.mode & MODE_MASK)),
        })
    }

    /// Re-read on-disk state
    fn refresh(&mut self) -> Result<()> {
        let current = self.probe()?;
        self.state.set_current(current);
        Ok(())
    }

    fn observed(&self) -> AccessState {
        self.state.current().cloned().unwrap_or_default()
    }

    pub fn should_update_owner(&self) -> bool {
        self.target_uid.is_some() && self.observed().owner.differs_from(self.target_uid.as_ref())
    }

    pub fn should_update_group(&self) -> bool {
        self.target_gid.is_some() && self.observed().group.differs_from(self.target_gid.as_ref())
    }

    pub fn should_update_mode(&self) -> bool {
        self.target_mode.is_some() && self.observed().mode.differs_from(self.target_mode.as_ref())
    }

    /// chown the owner only, if it differs from what is on disk now
    pub fn set_owner(&mut self) -> Result<bool> {
        self.refresh()?;
        let Some(uid) = self.target_uid.filter(|_| self.should_update_owner()) else {
            return Ok(false);
        };

        let raw = uid.to_os().context("uid does not fit in 32 bits")?;
        self.fs
            .chown(&self.path, Some(raw), None)
            .with_context(|| format!("Failed to change owner of {}", self.path.display()))?;

        log::info!(
            "Changed owner of {} from '{}' to '{}'",
            self.path.display(),
            self.observed().owner,
            uid
        );
        self.state.mark_updated();
        Ok(true)
    }

    /// chown the group only, if it differs from what is on disk now
    pub fn set_group(&mut self) -> Result<bool> {
        self.refresh()?;
        let Some(gid) = self.target_gid.filter(|_| self.should_update_group()) else {
            return Ok(false);
        };

        let raw = gid.to_os().context("gid does not fit in 32 bits")?;
        self.fs
            .chown(&self.path, None, Some(raw))
            .with_context(|| format!("Failed to change group of {}", self.path.display()))?;

        log::info!(
            "Changed group of {} from '{}' to '{}'",
            self.path.display(),
            self.observed().group,
            gid
        );
        self.state.mark_updated();
        Ok(true)
    }

    /// chmod, if the mode differs from what is on disk now
    pub fn set_mode(&mut self) -> Result<bool> {
        self.refresh()?;
        let Some(mode) = self.target_mode.filter(|_| self.should_update_mode()) else {
            return Ok(false);
        };

        self.fs
            .chmod(&self.path, mode)
            .with_context(|| format!("Failed to change mode of {}", self.path.display()))?;

        log::info!(
            "Changed mode of {} from '{}' to '{}'",
            self.path.display(),
            mode_to_s(self.observed().mode.value()),
            mode_to_s(Some(&mode))
        );
        self.state.mark_updated();
        Ok(true)
    }

    /// Converge owner, group and mode, each against freshly read state
    pub fn set_all(&mut self) -> Result<bool> {
        let owner = self.set_owner()?;
        let group = self.set_group()?;
        let mode = self.set_mode()?;
        Ok(owner || group || mode)
    }
}

impl Converge for FileAccess {
    fn id(&self) -> String {
        format!("file:{}", self.path.display())
    }

    fn resource_type(&self) -> &'static str {
        "file"
    }

    fn description(&self) -> String {
        format!("Access control for {}", self.path.display())
    }

    fn load_current_state(&mut self) -> Result<()> {
        self.resolve_targets()?;
        self.refresh()
    }

    fn validate(&self) -> Vec<Issue> {
        self.deferred
            .iter()
            .map(|e| Issue::new(self.id(), e.to_string()))
            .collect()
    }

    fn needs_update(&self) -> bool {
        self.should_update_owner() || self.should_update_group() || self.should_update_mode()
    }

    fn describe_changes(&self) -> Vec<String> {
        let current = self.observed();
        let spec = &self.state.desired;
        let mut changes = Vec::new();

        if self.should_update_owner()
            && let Some(owner) = &spec.owner
        {
            changes.push(describe_change("owner", &current.owner, owner));
        }
        if self.should_update_group()
            && let Some(group) = &spec.group
        {
            changes.push(describe_change("group", &current.group, group));
        }
        if self.should_update_mode() {
            changes.push(describe_change(
                "mode",
                mode_to_s(current.mode.value()),
                mode_to_s(self.target_mode.as_ref()),
            ));
        }

        changes
    }

    fn apply(&mut self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        if ctx.dry_run {
            return Ok(ApplyResult::Skipped {
                reason: "Dry run".to_string(),
            });
        }

        if let Some(unresolved) = self.deferred.first() {
            anyhow::bail!("{}", unresolved);
        }

        if self.set_all()? {
            Ok(ApplyResult::Modified)
        } else {
            Ok(ApplyResult::NoChange)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::{FsCall, RecordingFileOps, StaticIdentities};

    fn controller(
        fs: &Arc<RecordingFileOps>,
        ids: StaticIdentities,
        spec: AccessSpec,
    ) -> FileAccess {
        FileAccess::new("/srv/app.conf", spec, Arc::new(ids), fs.clone())
    }

    fn ids() -> StaticIdentities {
        StaticIdentities::default()
            .user("root", 0)
            .user("deploy", 1001)
            .user("nobody", 4_294_967_294)
            .group("wheel", 0)
            .group("deploy", 1001)
    }

    fn file(uid: u32, gid: u32, mode: u32) -> Arc<RecordingFileOps> {
        let fs = RecordingFileOps::default();
        fs.add("/srv/app.conf", FileStat { uid, gid, mode });
        Arc::new(fs)
    }

    #[test]
    fn test_matching_state_issues_no_calls() {
        let fs = file(1001, 0, 0o644);
        let mut access = controller(
            &fs,
            ids(),
            AccessSpec {
                owner: Some(IdSpec::Name("deploy".into())),
                group: Some(IdSpec::Id(0)),
                mode: Some(ModeSpec::Octal("0644".into())),
            },
        );

        access.load_current_state().unwrap();
        assert!(!access.needs_update());
        assert!(access.describe_changes().is_empty());

        let result = access.apply(&mut ApplyContext::default()).unwrap();
        assert_eq!(result, ApplyResult::NoChange);
        assert!(fs.calls().is_empty());
        assert!(!access.is_updated());
    }

    #[test]
    fn test_only_differing_attributes_are_applied() {
        let fs = file(0, 0, 0o600);
        let mut access = controller(
            &fs,
            ids(),
            AccessSpec {
                owner: Some(IdSpec::Name("deploy".into())),
                group: Some(IdSpec::Name("wheel".into())),
                mode: Some(ModeSpec::Bits(0o600)),
            },
        );

        access.load_current_state().unwrap();
        assert_eq!(
            access.describe_changes(),
            vec!["change owner from '0' to 'deploy'".to_string()]
        );

        let result = access.apply(&mut ApplyContext::default()).unwrap();
        assert_eq!(result, ApplyResult::Modified);
        assert_eq!(
            fs.calls(),
            vec![FsCall::Chown {
                uid: Some(1001),
                gid: None
            }]
        );
        assert!(access.is_updated());
    }

    #[test]
    fn test_describe_changes_fixed_order() {
        let fs = file(0, 0, 0o644);
        let mut access = controller(
            &fs,
            ids(),
            AccessSpec {
                mode: Some(ModeSpec::Octal("755".into())),
                group: Some(IdSpec::Name("deploy".into())),
                owner: Some(IdSpec::Id(1001)),
            },
        );

        access.load_current_state().unwrap();
        assert_eq!(
            access.describe_changes(),
            vec![
                "change owner from '0' to '1001'".to_string(),
                "change group from '0' to 'deploy'".to_string(),
                "change mode from '0644' to '0755'".to_string(),
            ]
        );

        access.apply(&mut ApplyContext::default()).unwrap();
        assert_eq!(
            fs.calls(),
            vec![
                FsCall::Chown {
                    uid: Some(1001),
                    gid: None
                },
                FsCall::Chown {
                    uid: None,
                    gid: Some(1001)
                },
                FsCall::Chmod(0o755),
            ]
        );
    }

    #[test]
    fn test_unmanaged_attributes_are_not_probed() {
        let fs = file(0, 0, 0o644);
        let mut access = controller(
            &fs,
            ids(),
            AccessSpec {
                mode: Some(ModeSpec::Octal("0644".into())),
                ..Default::default()
            },
        );

        access.load_current_state().unwrap();
        let current = access.current().unwrap();
        assert_eq!(current.owner, Probe::NotProbed);
        assert_eq!(current.group, Probe::NotProbed);
        assert_eq!(current.mode, Probe::Value(0o644));
    }

    #[test]
    fn test_mode_compared_numerically() {
        let fs = file(0, 0, 0o644);
        let mut access = controller(
            &fs,
            ids(),
            AccessSpec {
                mode: Some(ModeSpec::Octal("00644".into())),
                ..Default::default()
            },
        );

        access.load_current_state().unwrap();
        assert!(!access.should_update_mode());
    }

    #[test]
    fn test_missing_identity_is_deferred_to_validation() {
        let fs = file(0, 0, 0o644);
        let mut access = controller(
            &fs,
            ids(),
            AccessSpec {
                owner: Some(IdSpec::Name("ghost".into())),
                group: Some(IdSpec::Name("phantoms".into())),
                mode: Some(ModeSpec::Octal("0600".into())),
            },
        );

        access.load_current_state().unwrap();
        let issues = access.validate();
        assert_eq!(issues.len(), 2);
        assert!(issues[0].message.contains("user id for 'ghost'"));
        assert!(issues[1].message.contains("group id for 'phantoms'"));
        assert!(!access.should_update_owner());
        assert!(access.should_update_mode());

        assert!(access.apply(&mut ApplyContext::default()).is_err());
        assert!(fs.calls().is_empty());
    }

    #[test]
    fn test_invalid_mode_fails_immediately() {
        let fs = file(0, 0, 0o644);
        let mut access = controller(
            &fs,
            ids(),
            AccessSpec {
                mode: Some(ModeSpec::Octal("rwxr-xr-x".into())),
                ..Default::default()
            },
        );

        let err = access.load_current_state().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidSpecification {
                attribute: "mode",
                ..
            })
        ));
    }

    #[test]
    fn test_out_of_range_numeric_owner_is_invalid() {
        let fs = file(0, 0, 0o644);
        let access = controller(&fs, ids(), AccessSpec::default());

        let err = access
            .target_identifier(IdentityKind::User, Some(&IdSpec::Id(1 << 40)))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSpecification { .. }));
    }

    #[test]
    fn test_target_mode_parsing() {
        assert_eq!(FileAccess::target_mode(None).unwrap(), None);
        assert_eq!(
            FileAccess::target_mode(Some(&ModeSpec::Octal("0755".into()))).unwrap(),
            Some(0o755)
        );
        assert_eq!(
            FileAccess::target_mode(Some(&ModeSpec::Octal("0o4750".into()))).unwrap(),
            Some(0o4750)
        );
        assert_eq!(
            FileAccess::target_mode(Some(&ModeSpec::Bits(0o640))).unwrap(),
            Some(0o640)
        );
        assert!(FileAccess::target_mode(Some(&ModeSpec::Octal("0855".into()))).is_err());
        assert!(FileAccess::target_mode(Some(&ModeSpec::Bits(-1))).is_err());
    }

    #[test]
    fn test_wrapped_nobody_matches_negative_spec() {
        let fs = file(4_294_967_294, 0, 0o644);
        let mut access = controller(
            &fs,
            ids(),
            AccessSpec {
                owner: Some(IdSpec::Id(-2)),
                ..Default::default()
            },
        );

        access.load_current_state().unwrap();
        assert!(!access.should_update_owner());

        let mut by_name = controller(
            &fs,
            ids(),
            AccessSpec {
                owner: Some(IdSpec::Name("nobody".into())),
                ..Default::default()
            },
        );
        by_name.load_current_state().unwrap();
        assert!(!by_name.should_update_owner());
    }

    #[test]
    fn test_missing_file_needs_update_and_apply_propagates_os_error() {
        let fs = Arc::new(RecordingFileOps::default());
        let mut access = controller(
            &fs,
            ids(),
            AccessSpec {
                mode: Some(ModeSpec::Octal("0644".into())),
                ..Default::default()
            },
        );

        access.load_current_state().unwrap();
        assert_eq!(access.current().unwrap().mode, Probe::Absent);
        assert!(access.needs_update());
        assert_eq!(
            access.describe_changes(),
            vec!["change mode from '' to '0644'".to_string()]
        );

        let err = access.apply(&mut ApplyContext::default()).unwrap_err();
        let io_err = err.downcast_ref::<io::Error>().unwrap();
        assert_eq!(io_err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_each_attribute_checked_against_fresh_state() {
        let fs = file(0, 0, 0o644);
        let mut access = controller(
            &fs,
            ids(),
            AccessSpec {
                mode: Some(ModeSpec::Octal("0600".into())),
                ..Default::default()
            },
        );
        access.load_current_state().unwrap();
        assert!(access.needs_update());

        // Someone else fixes the mode between probe and apply
        fs.add("/srv/app.conf", FileStat { uid: 0, gid: 0, mode: 0o600 });

        assert!(!access.set_all().unwrap());
        assert!(fs.calls().is_empty());
    }

    #[test]
    fn test_dry_run_skips() {
        let fs = file(0, 0, 0o644);
        let mut access = controller(
            &fs,
            ids(),
            AccessSpec {
                mode: Some(ModeSpec::Octal("0600".into())),
                ..Default::default()
            },
        );
        access.load_current_state().unwrap();

        let result = access.apply(&mut ApplyContext::new(true, false)).unwrap();
        assert!(matches!(result, ApplyResult::Skipped { .. }));
        assert!(fs.calls().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_system_file_ops_chmod() {
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("secret");
        std::fs::write(&path, "x").unwrap();

        let mut access = FileAccess::new(
            &path,
            AccessSpec {
                mode: Some(ModeSpec::Octal("0600".into())),
                ..Default::default()
            },
            Arc::new(StaticIdentities::default()),
            Arc::new(SystemFileOps),
        );

        access.load_current_state().unwrap();
        access.apply(&mut ApplyContext::default()).unwrap();
        assert_eq!(SystemFileOps.stat(&path).unwrap().mode, 0o600);

        access.load_current_state().unwrap();
        assert!(!access.needs_update());
    }
}
