//! Process-wide state for one build invocation.

use std::path::{Path, PathBuf};

/// Build-invocation-wide settings shared by every [`crate::job::PackageJob`].
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Pins every generated archive entry's mtime. Zero disables the
    /// `builddate` field in `.PKGINFO` rather than emitting `builddate = 0`.
    pub source_date_epoch: u64,
    /// Root containing `melange-out/<package-name>/` subtrees.
    pub workspace_dir: PathBuf,
    /// Directory under which `{arch}/{identity}.apk` is written.
    pub out_dir: PathBuf,
    /// Target architecture string (e.g. `x86_64`, `aarch64`); opaque to the core.
    pub arch: String,
    /// Path to an RSA private key, if keyed signing is requested.
    pub signing_key: Option<PathBuf>,
    /// Passphrase protecting `signing_key`, if any.
    pub signing_passphrase: Option<String>,
    /// When set, every job's `origin-name` becomes its own `package-name`.
    pub strip_origin_name: bool,
    /// When set, append a line to `packages.log` in the current working directory.
    pub create_build_log: bool,
    /// When set, write `{prefix}.{arch}` with the observed `DT_NEEDED` map.
    pub dependency_log: Option<PathBuf>,
}

impl BuildContext {
    /// The workspace subdirectory that must exist before emission for `package_name`.
    pub fn workspace_subdir(&self, package_name: &str) -> PathBuf {
        self.workspace_dir.join("melange-out").join(package_name)
    }

    /// The directory archives for `self.arch` are written to.
    pub fn arch_out_dir(&self) -> PathBuf {
        self.out_dir.join(&self.arch)
    }

    /// `{dependency_log}.{arch}`, if a dependency log prefix was configured.
    pub fn dependency_log_path(&self) -> Option<PathBuf> {
        self.dependency_log.as_ref().map(|prefix| {
            let mut name = prefix
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_default();
            name.push(".");
            name.push(&self.arch);
            match prefix.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.join(name),
                _ => PathBuf::from(name),
            }
        })
    }
}
