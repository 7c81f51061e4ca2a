//! Ownership-change logic
//!
//! For every visited entry the UID mapping and the GID mapping are probed
//! independently; both, either, or neither may apply. The two changes are
//! deliberately separate chown calls so that UID and GID policies stay
//! orthogonal. Symlinks are changed with lchown and never followed.
//!
//! Applied changes are logged as INFO with old/new ids and resolved names;
//! failures are logged as WARNING and the scan continues. In dry-run mode
//! the intended change is printed to stdout instead and nothing is touched.

use crate::input::Mappings;
use crate::logfile::LogHandle;
use nix::unistd::{Gid, Group, Uid, User};
use std::collections::HashMap;
use std::os::unix::fs::{chown, lchown};
use std::path::Path;
use std::sync::Arc;

/// Classification of a directory entry for change and logging purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Symlink,
    Directory,
}

impl EntryKind {
    /// Label used in log and dry-run lines
    pub fn label(&self) -> &'static str {
        match self {
            EntryKind::File => "FILE",
            EntryKind::Symlink => "SYMLINK",
            EntryKind::Directory => "DIRECTORY",
        }
    }
}

/// Per-worker cache of uid/gid name lookups
///
/// Name resolution hits the user database; a scan touching millions of
/// entries owned by a handful of ids would otherwise repeat the same
/// lookups endlessly. Unresolvable ids cache their numeric form.
#[derive(Debug, Default)]
pub struct NameCache {
    users: HashMap<u32, String>,
    groups: HashMap<u32, String>,
}

impl NameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a uid to a user name, falling back to the numeric id
    pub fn user_name(&mut self, uid: u32) -> String {
        self.users
            .entry(uid)
            .or_insert_with(|| match User::from_uid(Uid::from_raw(uid)) {
                Ok(Some(user)) => user.name,
                _ => uid.to_string(),
            })
            .clone()
    }

    /// Resolve a gid to a group name, falling back to the numeric id
    pub fn group_name(&mut self, gid: u32) -> String {
        self.groups
            .entry(gid)
            .or_insert_with(|| match Group::from_gid(Gid::from_raw(gid)) {
                Ok(Some(group)) => group.name,
                _ => gid.to_string(),
            })
            .clone()
    }
}

/// Applies the mapping tables to individual entries
pub struct OwnershipChanger {
    mappings: Arc<Mappings>,
    dry_run: bool,
    log: LogHandle,
}

impl OwnershipChanger {
    pub fn new(mappings: Arc<Mappings>, dry_run: bool, log: LogHandle) -> Self {
        Self {
            mappings,
            dry_run,
            log,
        }
    }

    /// Apply any matching UID and GID changes to `path`.
    ///
    /// `uid` and `gid` are the entry's current owners from lstat. Returns
    /// the number of changes applied (0, 1 or 2); in dry-run mode, the
    /// number that would have been applied.
    pub fn apply(
        &self,
        path: &Path,
        uid: u32,
        gid: u32,
        kind: EntryKind,
        names: &mut NameCache,
    ) -> u64 {
        let mut applied = 0;

        if let Some(new_uid) = self.mappings.uids.lookup(uid) {
            if self.dry_run {
                println!(
                    "{} ({}): {} ({}), uid will be changed to {} ({})",
                    path.display(),
                    kind.label(),
                    uid,
                    names.user_name(uid),
                    new_uid,
                    names.user_name(new_uid)
                );
                applied += 1;
            } else {
                match self.change(path, kind, Some(new_uid), None) {
                    Ok(()) => {
                        // resolve names only once the change has succeeded
                        let oname = names.user_name(uid);
                        let nname = names.user_name(new_uid);
                        self.log.info(format!(
                            "{} ({}): {:>11} ({}), uid will be changed to {:>11} ({})",
                            path.display(),
                            kind.label(),
                            uid,
                            oname,
                            new_uid,
                            nname
                        ));
                        applied += 1;
                    }
                    Err(e) => {
                        self.log.warning(format!(
                            "couldn't change uid of <{}>: {}",
                            path.display(),
                            e
                        ));
                    }
                }
            }
        }

        if let Some(new_gid) = self.mappings.gids.lookup(gid) {
            if self.dry_run {
                println!(
                    "{} ({}): {} ({}), gid will be changed to {} ({})",
                    path.display(),
                    kind.label(),
                    gid,
                    names.group_name(gid),
                    new_gid,
                    names.group_name(new_gid)
                );
                applied += 1;
            } else {
                match self.change(path, kind, None, Some(new_gid)) {
                    Ok(()) => {
                        let oname = names.group_name(gid);
                        let nname = names.group_name(new_gid);
                        self.log.info(format!(
                            "{} ({}): {:>11} ({}), gid will be changed to {:>11} ({})",
                            path.display(),
                            kind.label(),
                            gid,
                            oname,
                            new_gid,
                            nname
                        ));
                        applied += 1;
                    }
                    Err(e) => {
                        self.log.warning(format!(
                            "couldn't change gid of <{}>: {}",
                            path.display(),
                            e
                        ));
                    }
                }
            }
        }

        applied
    }

    fn change(
        &self,
        path: &Path,
        kind: EntryKind,
        uid: Option<u32>,
        gid: Option<u32>,
    ) -> std::io::Result<()> {
        match kind {
            // never follow the link itself
            EntryKind::Symlink => lchown(path, uid, gid),
            EntryKind::File | EntryKind::Directory => chown(path, uid, gid),
        }
    }
}
