//! Path resolution.
//!
//! Walks a path one component at a time against the inode manager,
//! following symlinks as it goes and detecting cycles. Mirrors the
//! teacher's `namex`/`nameiparent` split: [`resolve`] returns the final
//! target, [`resolve_parent`] stops one component short and hands back the
//! parent directory plus the unresolved last name, for callers (create,
//! link, rename, unlink) that need to act on the name themselves rather than
//! on whatever it currently resolves to.

use std::collections::HashSet;

use crate::config::Identity;
use crate::error::{fs_err, ErrorKind, FsResult};
use crate::facade::checks::{check_permission, Access};
use crate::inode::InodeManager;
use crate::path::FsPath;
use crate::stat::InodeKind;

/// Bounds the number of symlinks followed while resolving one path, mirroring
/// common POSIX `ELOOP` limits.
const MAX_SYMLINKS: usize = 40;

/// The result of walking a path down to its final component.
#[derive(Debug, Clone)]
pub struct Navigated {
    /// Inode of the final target (after following a trailing symlink, if
    /// `follow_trailing_symlink` was set).
    pub ino: u64,
    pub kind: InodeKind,
    /// Absolute, symlink-free path leading to `ino`, used to answer `realpath`.
    pub real_path: String,
}

/// The result of walking a path down to (but not through) its last component,
/// for operations that create, remove, or rename the final name themselves.
#[derive(Debug, Clone)]
pub struct NavigatedParent {
    pub parent_ino: u64,
    pub name: String,
}

/// Resolves `path` relative to `cwd`, returning the inode it names. `root` is
/// the absolute-path base — the real root inode for an un-chrooted caller, or
/// the chroot's own root inode otherwise.
///
/// Every symlink encountered along the way — including a trailing one, when
/// `follow_trailing_symlink` is `true` — is expanded in place and folded into
/// the cycle-detection set shared across the whole call.
pub async fn resolve(
    inodes: &InodeManager,
    root: u64,
    cwd: u64,
    path: &str,
    follow_trailing_symlink: bool,
    identity: Identity,
) -> FsResult<Navigated> {
    let mut active_symlinks = HashSet::new();
    let mut path_stack: Vec<String> = Vec::new();
    let start = if path.starts_with('/') { root } else { cwd };
    navigate_from(
        inodes,
        root,
        start,
        path,
        follow_trailing_symlink,
        identity,
        &mut active_symlinks,
        &mut path_stack,
    )
    .await
}

/// Resolves every component of `path` except the last, which is returned
/// verbatim as a name under the resolved parent directory.
pub async fn resolve_parent(
    inodes: &InodeManager,
    root: u64,
    cwd: u64,
    path: &str,
    identity: Identity,
) -> FsResult<NavigatedParent> {
    let fs_path = FsPath::new(path)?;
    let start = if fs_path.is_absolute() { root } else { cwd };

    let mut components = Vec::new();
    let mut rest = fs_path;
    while let Some((name, tail)) = rest.skip_elem()? {
        components.push(name.as_str().to_string());
        rest = tail;
    }
    let Some(last) = components.pop() else {
        return Err(fs_err!(ErrorKind::InvalidArgument));
    };

    let mut active_symlinks = HashSet::new();
    let mut path_stack = Vec::new();
    let mut dir_ino = start;
    for name in &components {
        dir_ino = step(
            inodes,
            root,
            dir_ino,
            name,
            true,
            identity,
            &mut active_symlinks,
            &mut path_stack,
        )
        .await?;
    }

    let dir_stat = inodes.stat(dir_ino).await?;
    if dir_stat.kind != InodeKind::Directory {
        return Err(fs_err!(ErrorKind::NotDirectory));
    }

    Ok(NavigatedParent {
        parent_ino: dir_ino,
        name: last,
    })
}

#[allow(clippy::too_many_arguments)]
async fn navigate_from(
    inodes: &InodeManager,
    root: u64,
    start: u64,
    path: &str,
    follow_trailing_symlink: bool,
    identity: Identity,
    active_symlinks: &mut HashSet<(u64, String)>,
    path_stack: &mut Vec<String>,
) -> FsResult<Navigated> {
    let fs_path = FsPath::new(path)?;
    let mut ino = start;
    let mut kind = inodes.stat(start).await?.kind;

    let mut rest = fs_path;
    loop {
        let Some((name, tail)) = rest.skip_elem()? else {
            break;
        };
        let is_last = tail.skip_elem()?.is_none();
        let follow = !is_last || follow_trailing_symlink;
        ino = step(
            inodes,
            root,
            ino,
            name.as_str(),
            follow,
            identity,
            active_symlinks,
            path_stack,
        )
        .await?;
        kind = inodes.stat(ino).await?.kind;
        rest = tail;
    }

    Ok(Navigated {
        ino,
        kind,
        real_path: render_real_path(path_stack),
    })
}

/// Resolves one path component from `dir_ino`, expanding it if it names a
/// symlink and `follow` is set. Checks `X_OK` on `dir_ino` first, per the
/// resolver's "verify execute permission on curdir before looking up the
/// next segment" contract.
#[allow(clippy::too_many_arguments)]
async fn step(
    inodes: &InodeManager,
    root: u64,
    dir_ino: u64,
    name: &str,
    follow: bool,
    identity: Identity,
    active_symlinks: &mut HashSet<(u64, String)>,
    path_stack: &mut Vec<String>,
) -> FsResult<u64> {
    let dir_stat = inodes.stat(dir_ino).await?;
    if dir_stat.kind != InodeKind::Directory {
        return Err(fs_err!(ErrorKind::NotDirectory));
    }
    check_permission(identity, &dir_stat, Access::EXECUTE)?;

    let (child_ino, child_kind) = inodes
        .lookup(dir_ino, name)
        .await?
        .ok_or_else(|| fs_err!(ErrorKind::NoEntry))?;

    match name {
        "." => {}
        ".." => {
            path_stack.pop();
        }
        _ => path_stack.push(name.to_string()),
    }

    if child_kind == InodeKind::Symlink && follow {
        let marker = (dir_ino, name.to_string());
        if !active_symlinks.insert(marker) {
            return Err(fs_err!(ErrorKind::SymlinkLoop));
        }
        if active_symlinks.len() > MAX_SYMLINKS {
            return Err(fs_err!(ErrorKind::SymlinkLoop));
        }
        let target = inodes.read_symlink(child_ino).await?;
        let base = if target.starts_with('/') { root } else { dir_ino };
        let resolved = Box::pin(navigate_from(
            inodes,
            root,
            base,
            &target,
            true,
            identity,
            active_symlinks,
            path_stack,
        ))
        .await?;
        return Ok(resolved.ino);
    }

    Ok(child_ino)
}

fn render_real_path(path_stack: &[String]) -> String {
    if path_stack.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", path_stack.join("/"))
    }
}
