//! Mode-bit permission checks.
//!
//! Root (`uid == 0`) always passes. Otherwise the caller's identity selects
//! one of the mode word's three permission triads — owner, group, or other —
//! and every requested bit must be present in that triad.

use crate::config::Identity;
use crate::error::{fs_err, ErrorKind, FsResult};
use crate::stat::Stat;

bitflags::bitflags! {
    pub struct Access: u32 {
        const EXECUTE = 0b001;
        const WRITE   = 0b010;
        const READ    = 0b100;
    }
}

pub fn check_permission(identity: Identity, stat: &Stat, wanted: Access) -> FsResult<()> {
    if identity.uid == 0 {
        return Ok(());
    }

    let triad = if identity.uid == stat.uid {
        (stat.mode >> 6) & 0o7
    } else if identity.gid == stat.gid {
        (stat.mode >> 3) & 0o7
    } else {
        stat.mode & 0o7
    };

    if triad & wanted.bits() == wanted.bits() {
        Ok(())
    } else {
        Err(fs_err!(ErrorKind::AccessDenied))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stat::InodeKind;

    fn stat_with(mode: u32, uid: u32, gid: u32) -> Stat {
        Stat {
            ino: 1,
            kind: InodeKind::File,
            mode,
            uid,
            gid,
            nlink: 1,
            size: 0,
            blocks: 0,
            atime: 0,
            mtime: 0,
            ctime: 0,
            birthtime: 0,
            rdev: 0,
        }
    }

    #[test]
    fn root_bypasses_checks() {
        let stat = stat_with(0o000, 5, 5);
        assert!(check_permission(Identity::ROOT, &stat, Access::READ).is_ok());
    }

    #[test]
    fn owner_without_read_bit_is_denied() {
        let stat = stat_with(0o600, 0, 0);
        let caller = Identity::new(1000, 1000);
        assert!(check_permission(caller, &stat, Access::READ).is_err());
    }

    #[test]
    fn owner_with_read_bit_is_permitted() {
        let stat = stat_with(0o600, 1000, 1000);
        let caller = Identity::new(1000, 1000);
        assert!(check_permission(caller, &stat, Access::READ).is_ok());
    }
}
