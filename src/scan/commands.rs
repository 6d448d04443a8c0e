//! Command provider generator.
//!
//! Any executable regular file staged under one of the four well-known
//! binary directories is assumed to be invocable by name, and is advertised
//! as a `cmd:` capability so other packages can depend on "a command named
//! `foo`" without caring which package happens to ship it.

use crate::fsview::{EntryKind, FsView};
use crate::scan::Accumulator;

const BIN_DIRS: &[&str] = &["bin", "sbin", "usr/bin", "usr/sbin"];

/// `r-xr-xr-x`, the same mask `apk` itself checks: qualifies only when
/// owner, group, and other all carry the bits, not when any single class
/// happens to be executable.
const EXEC_MASK: u32 = 0o555;

pub fn scan(view: &FsView, version_release: &str, acc: &mut Accumulator) -> std::io::Result<()> {
    for entry in view.walk()? {
        if entry.kind != EntryKind::Regular {
            continue;
        }
        if entry.mode & EXEC_MASK != EXEC_MASK {
            continue;
        }
        if !BIN_DIRS.iter().any(|dir| is_direct_child(&entry.path, dir)) {
            continue;
        }
        let basename = entry.path.rsplit('/').next().unwrap_or(&entry.path);
        acc.provides
            .push(format!("cmd:{basename}={version_release}"));
    }
    Ok(())
}

fn is_direct_child(path: &str, dir: &str) -> bool {
    path.strip_prefix(dir)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|rest| !rest.is_empty())
}
