//! Control section: `.PKGINFO` plus scriptlets, tar+gzipped.
//!
//! Built after the data section so `datahash` is known, and built in memory
//! since it also needs to be handed, unmodified, to the signer.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;

use crate::config::{Dependencies, Options, Scriptlets};
use crate::tarwriter::{Mode, TarWriter};

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("failed to render control section: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything the `.PKGINFO` renderer needs, pulled out of a `PackageJob` so
/// this module stays decoupled from the job/context types.
#[derive(Debug, Clone)]
pub struct ControlInfo<'a> {
    pub package_name: &'a str,
    pub origin_name: &'a str,
    pub version: &'a str,
    pub epoch: u64,
    pub arch: &'a str,
    pub installed_size: u64,
    pub description: &'a str,
    pub url: &'a str,
    pub commit: &'a str,
    pub source_date_epoch: u64,
    pub licenses: &'a [String],
    pub dependencies: &'a Dependencies,
    pub scriptlets: &'a Scriptlets,
    pub data_hash: &'a str,
}

/// Render `.PKGINFO` as newline-delimited `key = value` lines.
pub fn render_pkginfo(info: &ControlInfo) -> String {
    let mut out = String::new();
    let mut line = |k: &str, v: &str| out.push_str(&format!("{k} = {v}\n"));

    line("pkgname", info.package_name);
    line("pkgver", &format!("{}-r{}", info.version, info.epoch));
    line("arch", info.arch);
    line("size", &info.installed_size.to_string());
    line("origin", info.origin_name);
    line("pkgdesc", info.description);
    line("url", info.url);
    line("commit", info.commit);
    if info.source_date_epoch != 0 {
        line("builddate", &info.source_date_epoch.to_string());
    }
    for license in info.licenses {
        line("license", license);
    }
    for dep in &info.dependencies.runtime {
        line("depend", dep);
    }
    for p in &info.dependencies.provides {
        line("provides", p);
    }
    for r in &info.dependencies.replaces {
        line("replaces", r);
    }
    if let Some(priority) = info.dependencies.provider_priority {
        if priority != 0 {
            line("provider_priority", &priority.to_string());
        }
    }
    if let Some(trigger) = &info.scriptlets.trigger {
        if !trigger.paths.is_empty() {
            line("triggers", &trigger.paths.join(" "));
        }
    }
    line("datahash", info.data_hash);

    out
}

/// Build the control tar+gzip stream: `.PKGINFO` plus any populated
/// scriptlet files, all owned by root and mode 0644/0755 as appropriate.
pub fn build(info: &ControlInfo) -> Result<Vec<u8>, ControlError> {
    let pkginfo = render_pkginfo(info);

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut tar = TarWriter::new(encoder, Mode::Control, info.source_date_epoch);

    tar.add_file(".PKGINFO", 0o644, pkginfo.as_bytes())?;

    if let Some(trigger) = &info.scriptlets.trigger {
        tar.add_file(".trigger", 0o755, trigger.script.as_bytes())?;
    }
    add_scriptlet(&mut tar, ".pre-install", info.scriptlets.pre_install.as_deref())?;
    add_scriptlet(&mut tar, ".post-install", info.scriptlets.post_install.as_deref())?;
    add_scriptlet(&mut tar, ".pre-deinstall", info.scriptlets.pre_deinstall.as_deref())?;
    add_scriptlet(&mut tar, ".post-deinstall", info.scriptlets.post_deinstall.as_deref())?;
    add_scriptlet(&mut tar, ".pre-upgrade", info.scriptlets.pre_upgrade.as_deref())?;
    add_scriptlet(&mut tar, ".post-upgrade", info.scriptlets.post_upgrade.as_deref())?;

    let encoder = tar.finish()?;
    Ok(encoder.finish()?)
}

fn add_scriptlet<W: Write>(
    tar: &mut TarWriter<W>,
    name: &str,
    body: Option<&str>,
) -> std::io::Result<()> {
    if let Some(body) = body {
        tar.add_file(name, 0o755, body.as_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Dependencies, Scriptlets};

    fn base_info<'a>(
        deps: &'a Dependencies,
        scriptlets: &'a Scriptlets,
        licenses: &'a [String],
    ) -> ControlInfo<'a> {
        ControlInfo {
            package_name: "hello",
            origin_name: "hello",
            version: "1.0",
            epoch: 0,
            arch: "x86_64",
            installed_size: 0,
            description: "a greeting",
            url: "",
            commit: "",
            source_date_epoch: 0,
            licenses,
            dependencies: deps,
            scriptlets,
            data_hash: "deadbeef",
        }
    }

    #[test]
    fn empty_package_pkginfo_omits_optional_fields() {
        let deps = Dependencies::default();
        let scriptlets = Scriptlets::default();
        let licenses = Vec::new();
        let info = base_info(&deps, &scriptlets, &licenses);
        let rendered = render_pkginfo(&info);

        assert!(rendered.contains("pkgname = hello\n"));
        assert!(rendered.contains("pkgver = 1.0-r0\n"));
        assert!(rendered.contains("size = 0\n"));
        assert!(!rendered.contains("builddate"));
        assert!(!rendered.contains("depend"));
        assert!(!rendered.contains("provides"));
        assert!(rendered.contains("datahash = deadbeef\n"));
    }

    #[test]
    fn builddate_present_only_when_source_date_epoch_nonzero() {
        let deps = Dependencies::default();
        let scriptlets = Scriptlets::default();
        let licenses = Vec::new();
        let mut info = base_info(&deps, &scriptlets, &licenses);
        info.source_date_epoch = 1_700_000_000;
        assert!(render_pkginfo(&info).contains("builddate = 1700000000\n"));
    }

    #[test]
    fn strip_origin_name_scenario_uses_package_name_as_origin() {
        let deps = Dependencies::default();
        let scriptlets = Scriptlets::default();
        let licenses = Vec::new();
        let mut info = base_info(&deps, &scriptlets, &licenses);
        info.package_name = "hello-doc";
        info.origin_name = "hello-doc";
        assert!(render_pkginfo(&info).contains("origin = hello-doc\n"));
    }

    #[test]
    fn build_produces_a_valid_gzip_stream() {
        let deps = Dependencies::default();
        let scriptlets = Scriptlets::default();
        let licenses = Vec::new();
        let info = base_info(&deps, &scriptlets, &licenses);
        let bytes = build(&info).unwrap();
        assert_eq!(&bytes[0..2], &[0x1f, 0x8b]);
    }
}
