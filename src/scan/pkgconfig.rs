//! pkg-config descriptor scanning.
//!
//! Every `.pc` file staged in the package is a capability announcement: other
//! packages' build systems will look it up by name via `pkg-config`, so it
//! becomes a `pc:` provider keyed on the descriptor's declared version,
//! rewritten into apk's version-suffix convention.

use std::sync::LazyLock;

use regex::Regex;

use crate::fsview::{EntryKind, FsView};
use crate::log::BuildLog;
use crate::scan::Accumulator;

static PRERELEASE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-(alpha|beta|rc|pre)").unwrap());

/// A minimal pkg-config descriptor: just the fields the scanner needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Descriptor {
    pub name: String,
    pub version: String,
    /// Raw `Requires:` package names, kept for `generate_runtime_pkgconfig_deps`.
    pub requires: Vec<String>,
}

/// Parse a `.pc` file's `Name:`/`Version:`/`Requires:` fields. Other
/// directives (`Libs:`, `Cflags:`, variable assignments) are ignored; the
/// scanner only needs enough to mint a provider string and, optionally, the
/// runtime dependency names behind `pkgconfig-runtime-deps`.
pub fn parse(content: &str) -> Result<Descriptor, String> {
    let mut descriptor = Descriptor::default();
    for line in content.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("Name:") {
            descriptor.name = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("Version:") {
            descriptor.version = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("Requires:") {
            descriptor.requires = value
                .split(',')
                .flat_map(str::split_whitespace)
                .filter(|tok| !tok.starts_with(['<', '>', '=']))
                .map(str::to_string)
                .collect();
        }
    }
    if descriptor.version.is_empty() {
        return Err("missing Version: field".to_string());
    }
    Ok(descriptor)
}

/// Turn a descriptor's `Requires:` package names into `pc:`-scoped runtime
/// dependencies. Disabled by default (see spec.md §9's open question on
/// `generateRuntimePkgConfigDeps`): ecosystem-wide pkg-config provider data
/// isn't reliable enough yet for this to be safe to enable unconditionally.
#[cfg(feature = "pkgconfig-runtime-deps")]
pub fn generate_runtime_pkgconfig_deps(descriptor: &Descriptor) -> Vec<String> {
    descriptor
        .requires
        .iter()
        .map(|name| format!("pc:{name}"))
        .collect()
}

/// Rewrite a pkg-config version string into apk's convention: the first
/// `-alpha`/`-beta`/`-rc`/`-pre` suffix becomes `_alpha`/`_beta`/`_rc`/`_pre`.
pub fn apk_version(version: &str) -> String {
    PRERELEASE_SUFFIX.replace(version, "_$1").into_owned()
}

pub fn scan(
    view: &FsView,
    no_provides: bool,
    log: &dyn BuildLog,
    acc: &mut Accumulator,
) -> std::io::Result<()> {
    if no_provides {
        return Ok(());
    }
    for entry in view.walk()? {
        if entry.kind != EntryKind::Regular {
            continue;
        }
        let Some(basename) = entry.path.strip_suffix(".pc") else {
            continue;
        };
        let basename = basename.rsplit('/').next().unwrap_or(basename);

        let mut file = match view.open(&entry.path) {
            Ok(f) => f,
            Err(err) => {
                log.warnf(&format!("pkg-config: cannot open {}: {err}", entry.path));
                continue;
            }
        };
        let mut content = String::new();
        use std::io::Read;
        if let Err(err) = file.read_to_string(&mut content) {
            log.warnf(&format!("pkg-config: cannot read {}: {err}", entry.path));
            continue;
        }

        match parse(&content) {
            Ok(descriptor) => {
                acc.provides
                    .push(format!("pc:{basename}={}", apk_version(&descriptor.version)));
            }
            Err(err) => {
                log.warnf(&format!("pkg-config: {}: {err}", entry.path));
            }
        }
    }
    Ok(())
}
