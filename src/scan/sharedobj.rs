//! Shared-object dependency and provider generator.
//!
//! Every ELF file staged in the package is a potential source of both
//! runtime dependencies (what it links against) and provided capabilities
//! (what it publishes as a linker name). Failures here are almost always
//! "this executable isn't actually an ELF binary" (shell scripts, wrapper
//! scripts) and are deliberately swallowed rather than propagated.

use std::path::{Path, PathBuf};

use crate::context::BuildContext;
use crate::elf::{self, musl_loader_provider};
use crate::fsview::{EntryKind, FsView};
use crate::log::BuildLog;
use crate::scan::Accumulator;

const LIB_DIRS: &[&str] = &["lib", "usr/lib", "lib64", "usr/lib64"];
/// `r-xr-xr-x`: qualifies only when owner, group, and other are all
/// executable, matching the command-provider scan's mask.
const EXEC_MASK: u32 = 0o555;

#[allow(clippy::too_many_arguments)]
pub fn scan(
    view: &FsView,
    ctx: &BuildContext,
    package_name: &str,
    candidate_packages: &[String],
    no_depends: bool,
    no_provides: bool,
    log: &dyn BuildLog,
    acc: &mut Accumulator,
) -> std::io::Result<()> {
    for entry in view.walk()? {
        match entry.kind {
            EntryKind::Symlink if entry.path.contains(".so") => {
                scan_library_symlink(view, ctx, package_name, candidate_packages, &entry.path, log, acc);
            }
            EntryKind::Regular if entry.mode & EXEC_MASK == EXEC_MASK => {
                scan_executable(view, &entry.path, no_depends, no_provides, log, acc);
            }
            _ => {}
        }
    }
    Ok(())
}

fn scan_library_symlink(
    view: &FsView,
    ctx: &BuildContext,
    package_name: &str,
    candidate_packages: &[String],
    path: &str,
    log: &dyn BuildLog,
    acc: &mut Accumulator,
) {
    let Ok(target) = view.readlink(path) else {
        return;
    };
    let Some(basename) = target.file_name().and_then(|n| n.to_str()) else {
        return;
    };

    let Some(resolved) =
        cross_package_dereference(ctx, package_name, candidate_packages, basename)
    else {
        return;
    };

    let Ok(info) = elf::inspect(&resolved) else {
        return;
    };
    let Some(info) = info else {
        return;
    };
    let Some(soname) = info.soname else {
        log.warnf(&format!("{path}: target has no SONAME, skipping"));
        return;
    };
    acc.runtime.push(format!("so:{soname}"));
}

/// Probe `{workspace-dir}/melange-out/{candidate}/{lib-dir}/{basename}` for
/// each candidate package and library directory, returning the first hit.
fn cross_package_dereference(
    ctx: &BuildContext,
    package_name: &str,
    candidate_packages: &[String],
    basename: &str,
) -> Option<PathBuf> {
    let mut tried = vec![package_name.to_string()];
    tried.extend(candidate_packages.iter().cloned());

    for candidate in tried {
        let subdir = ctx.workspace_subdir(&candidate);
        for lib_dir in LIB_DIRS {
            let probe = subdir.join(lib_dir).join(basename);
            if probe.is_file() {
                return Some(probe);
            }
        }
    }
    None
}

fn scan_executable(
    view: &FsView,
    path: &str,
    no_depends: bool,
    no_provides: bool,
    log: &dyn BuildLog,
    acc: &mut Accumulator,
) {
    let Ok(mut file) = view.open(path) else {
        return;
    };
    let mut bytes = Vec::new();
    use std::io::Read;
    if file.read_to_end(&mut bytes).is_err() {
        return;
    }
    let Ok(Some(info)) = elf::inspect_bytes(&bytes, Path::new(path)) else {
        return;
    };

    if !no_depends {
        if let Some(interp) = &info.interpreter {
            let basename = basename_of(interp);
            acc.runtime
                .push(format!("so:{}", musl_loader_provider(basename)));
        }
        for needed in &info.needed {
            if needed.contains(".so.") {
                acc.runtime.push(format!("so:{needed}"));
                acc.needed_paths
                    .entry(needed.clone())
                    .or_default()
                    .push(path.to_string());
            }
        }
    }

    if !no_provides {
        let is_libc_self_interp = info
            .interpreter
            .as_deref()
            .map(basename_of)
            .is_some_and(|b| b.starts_with("libc"));
        let in_lib_dir = LIB_DIRS.iter().any(|dir| {
            path.strip_prefix(dir)
                .and_then(|rest| rest.strip_prefix('/'))
                .is_some_and(|rest| !rest.is_empty())
        });

        if (info.interpreter.is_none() || is_libc_self_interp) && in_lib_dir {
            if let Some(soname) = &info.soname {
                let libver = soname
                    .split_once(".so.")
                    .map(|(_, ver)| ver.to_string())
                    .unwrap_or_else(|| "0".to_string());
                acc.provides.push(format!("so:{soname}={libver}"));
            }
        }
    }
}

fn basename_of(path: &str) -> &str {
    path.trim_end_matches('\0').rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::NullLog;
    use std::fs;
    use std::os::unix::fs::{symlink, PermissionsExt};

    fn ctx(workspace: &Path) -> BuildContext {
        BuildContext {
            source_date_epoch: 0,
            workspace_dir: workspace.to_path_buf(),
            out_dir: PathBuf::from("/out"),
            arch: "x86_64".to_string(),
            signing_key: None,
            signing_passphrase: None,
            strip_origin_name: false,
            create_build_log: false,
            dependency_log: None,
        }
    }

    #[test]
    fn basename_of_strips_directory_and_trailing_nul() {
        assert_eq!(basename_of("/lib/ld-musl-x86_64.so.1\0"), "ld-musl-x86_64.so.1");
    }

    #[test]
    fn cross_package_dereference_finds_file_in_origin_lib_dir() {
        let workspace = tempfile::tempdir().unwrap();
        let origin_lib = workspace.path().join("melange-out/hello/usr/lib");
        fs::create_dir_all(&origin_lib).unwrap();
        fs::write(origin_lib.join("libfoo.so.2.1"), b"fake-elf").unwrap();

        let context = ctx(workspace.path());
        let found = cross_package_dereference(
            &context,
            "hello-doc",
            &["hello".to_string()],
            "libfoo.so.2.1",
        );
        assert_eq!(found, Some(origin_lib.join("libfoo.so.2.1")));
    }

    #[test]
    fn cross_package_dereference_returns_none_when_absent_everywhere() {
        let workspace = tempfile::tempdir().unwrap();
        let context = ctx(workspace.path());
        assert_eq!(
            cross_package_dereference(&context, "hello", &[], "libfoo.so"),
            None
        );
    }

    #[test]
    fn executable_not_set_for_every_class_is_skipped() {
        let workspace = tempfile::tempdir().unwrap();
        let staged = workspace.path().join("staged");
        fs::create_dir_all(staged.join("usr/bin")).unwrap();
        let bin = staged.join("usr/bin/app");
        fs::write(&bin, b"\x7fELF-but-irrelevant-here").unwrap();
        // rwxr--r--: not executable for group/other, so the scan must
        // never even attempt to parse it as ELF.
        fs::set_permissions(&bin, fs::Permissions::from_mode(0o744)).unwrap();

        let view = FsView::new(&staged);
        let context = ctx(workspace.path());
        let mut acc = Accumulator::default();
        scan(
            &view,
            &context,
            "hello",
            &[],
            false,
            false,
            &NullLog,
            &mut acc,
        )
        .unwrap();
        assert!(acc.runtime.is_empty());
        assert!(acc.provides.is_empty());
    }

    #[test]
    fn dangling_library_symlink_is_skipped_without_error() {
        let workspace = tempfile::tempdir().unwrap();
        let staged = workspace.path().join("staged");
        fs::create_dir_all(staged.join("usr/lib")).unwrap();
        symlink("libfoo.so.2.1", staged.join("usr/lib/libfoo.so")).unwrap();

        let view = FsView::new(&staged);
        let context = ctx(workspace.path());
        let mut acc = Accumulator::default();
        scan(
            &view,
            &context,
            "hello",
            &[],
            false,
            false,
            &NullLog,
            &mut acc,
        )
        .unwrap();
        assert!(acc.runtime.is_empty());
    }
}
