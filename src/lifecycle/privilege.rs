//! Superuser check

/// Source of the effective user id.
pub trait PrivilegeCheck {
    fn effective_uid(&self) -> u32;

    fn is_superuser(&self) -> bool {
        self.effective_uid() == 0
    }
}

/// The process's real effective uid.
#[derive(Debug, Default, Clone, Copy)]
pub struct EffectiveUid;

impl PrivilegeCheck for EffectiveUid {
    #[cfg(unix)]
    fn effective_uid(&self) -> u32 {
        unsafe { libc::geteuid() }
    }

    #[cfg(not(unix))]
    fn effective_uid(&self) -> u32 {
        u32::MAX
    }
}

/// A fixed uid, for callers that have already checked or for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedPrivilege(pub u32);

impl PrivilegeCheck for FixedPrivilege {
    fn effective_uid(&self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed() {
        assert!(FixedPrivilege(0).is_superuser());
        assert!(!FixedPrivilege(1000).is_superuser());
    }

    #[cfg(unix)]
    #[test]
    fn test_effective_matches_libc() {
        let uid = unsafe { libc::geteuid() };
        assert_eq!(EffectiveUid.effective_uid(), uid);
    }
}
