//! Owner/group identity resolution
//!
//! Names are looked up in the system user and group databases. Numeric ids
//! go through [`Identifier::normalized`] so that platforms reporting
//! "nobody"-style negative ids as large unsigned values compare equal to
//! the declared negative value.

use crate::error::{Error, IdentityKind};
use std::fmt;

/// Unsigned values above this are treated as wrapped negative ids
///
/// Only the last nine values below 2^32 wrap. Larger ranges are real ids
/// handed out by directory services and must stay positive.
pub const WRAP_THRESHOLD: i64 = 4_294_967_286;

const ID_SPACE: i64 = 1 << 32;

/// A user or group id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(i64);

impl Identifier {
    /// Normalize a raw id
    ///
    /// Values in `(WRAP_THRESHOLD, 2^32)` become `value - 2^32`;
    /// everything else is kept as-is.
    pub fn normalized(raw: i64) -> Self {
        if raw > WRAP_THRESHOLD && raw < ID_SPACE {
            Self(raw - ID_SPACE)
        } else {
            Self(raw)
        }
    }

    pub fn get(self) -> i64 {
        self.0
    }

    /// The id as the OS expects it in `chown`, if it fits in 32 bits
    pub fn to_os(self) -> Option<u32> {
        let raw = if self.0 < 0 { self.0 + ID_SPACE } else { self.0 };
        u32::try_from(raw).ok()
    }
}

impl From<u32> for Identifier {
    fn from(raw: u32) -> Self {
        Self::normalized(i64::from(raw))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lookup of user and group names
pub trait IdentityResolver: Send + Sync + fmt::Debug {
    /// Raw uid for a user name, `None` if the user does not exist
    fn resolve_user(&self, name: &str) -> Option<u32>;

    /// Raw gid for a group name, `None` if the group does not exist
    fn resolve_group(&self, name: &str) -> Option<u32>;

    /// Resolve and normalize a name of either kind
    fn resolve(&self, kind: IdentityKind, name: &str) -> Result<Identifier, Error> {
        let raw = match kind {
            IdentityKind::User => self.resolve_user(name),
            IdentityKind::Group => self.resolve_group(name),
        };

        raw.map(Identifier::from)
            .ok_or_else(|| Error::IdentityNotFound {
                kind,
                name: name.to_string(),
            })
    }
}

/// The system user and group databases (`getpwnam_r` / `getgrnam_r`)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemIdentities;

impl IdentityResolver for SystemIdentities {
    fn resolve_user(&self, name: &str) -> Option<u32> {
        let uid = sys::lookup_uid(name);
        log::trace!("getpwnam({}) -> {:?}", name, uid);
        uid
    }

    fn resolve_group(&self, name: &str) -> Option<u32> {
        let gid = sys::lookup_gid(name);
        log::trace!("getgrnam({}) -> {:?}", name, gid);
        gid
    }
}

#[cfg(unix)]
mod sys {
    use std::ffi::CString;
    use std::mem::MaybeUninit;
    use std::ptr;

    /// Upper bound for the lookup scratch buffer
    const MAX_BUFFER: usize = 1 << 20;

    fn initial_buffer_len(name: libc::c_int) -> usize {
        // SAFETY: sysconf has no preconditions
        let hint = unsafe { libc::sysconf(name) };
        usize::try_from(hint)
            .ok()
            .filter(|&n| n > 0)
            .unwrap_or(1024)
    }

    pub(super) fn lookup_uid(name: &str) -> Option<u32> {
        let c_name = CString::new(name).ok()?;
        let mut buf: Vec<libc::c_char> = vec![0; initial_buffer_len(libc::_SC_GETPW_R_SIZE_MAX)];

        loop {
            let mut pwd = MaybeUninit::<libc::passwd>::uninit();
            let mut result: *mut libc::passwd = ptr::null_mut();

            // SAFETY: every pointer refers to live, correctly sized storage
            let rc = unsafe {
                libc::getpwnam_r(
                    c_name.as_ptr(),
                    pwd.as_mut_ptr(),
                    buf.as_mut_ptr(),
                    buf.len(),
                    &mut result,
                )
            };

            if rc == libc::ERANGE && buf.len() < MAX_BUFFER {
                buf.resize(buf.len() * 2, 0);
                continue;
            }
            if rc != 0 || result.is_null() {
                return None;
            }

            // SAFETY: a successful call points result at the initialised pwd
            return Some(unsafe { (*result).pw_uid });
        }
    }

    pub(super) fn lookup_gid(name: &str) -> Option<u32> {
        let c_name = CString::new(name).ok()?;
        let mut buf: Vec<libc::c_char> = vec![0; initial_buffer_len(libc::_SC_GETGR_R_SIZE_MAX)];

        loop {
            let mut grp = MaybeUninit::<libc::group>::uninit();
            let mut result: *mut libc::group = ptr::null_mut();

            // SAFETY: every pointer refers to live, correctly sized storage
            let rc = unsafe {
                libc::getgrnam_r(
                    c_name.as_ptr(),
                    grp.as_mut_ptr(),
                    buf.as_mut_ptr(),
                    buf.len(),
                    &mut result,
                )
            };

            if rc == libc::ERANGE && buf.len() < MAX_BUFFER {
                buf.resize(buf.len() * 2, 0);
                continue;
            }
            if rc != 0 || result.is_null() {
                return None;
            }

            // SAFETY: a successful call points result at the initialised grp
            return Some(unsafe { (*result).gr_gid });
        }
    }
}

#[cfg(not(unix))]
mod sys {
    pub(super) fn lookup_uid(_name: &str) -> Option<u32> {
        None
    }

    pub(super) fn lookup_gid(_name: &str) -> Option<u32> {
        None
    }
}
