//! Dependency Scanner: walks a staged package tree and synthesizes runtime
//! dependencies and provided capabilities from what it finds there, rather
//! than requiring the build author to declare every `.so` by hand.
//!
//! Three independent generators run over the same [`FsView`] and each
//! contribute to a shared [`Accumulator`]; [`merge_and_filter`] then folds
//! the generated sets into the declared ones and removes self-satisfied
//! runtime entries.

pub mod commands;
pub mod pkgconfig;
pub mod sharedobj;

use std::collections::{BTreeMap, HashSet};

use crate::config::{Dependencies, Options};
use crate::context::BuildContext;
use crate::fsview::FsView;
use crate::log::BuildLog;

/// Dependency/provider sets being built up by the generators, plus the
/// needed-library → referencing-paths map used for the optional dependency
/// log. Kept separate from [`Dependencies`] because the latter is the
/// user-declared input, not scanner-produced output.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    pub runtime: Vec<String>,
    pub provides: Vec<String>,
    /// `DT_NEEDED` entry -> paths of files that referenced it, for `--dependency-log`.
    pub needed_paths: BTreeMap<String, Vec<String>>,
}

/// Run all enabled generators over `view` and return the generated
/// dependency set merged with `declared`, self-provides filtered out.
pub fn run(
    view: &FsView,
    ctx: &BuildContext,
    package_name: &str,
    version_release: &str,
    declared: &Dependencies,
    options: &Options,
    candidate_packages: &[String],
    log: &dyn BuildLog,
) -> std::io::Result<Dependencies> {
    let mut acc = Accumulator::default();

    if !options.no_commands {
        commands::scan(view, version_release, &mut acc)?;
    }

    sharedobj::scan(
        view,
        ctx,
        package_name,
        candidate_packages,
        options.no_depends,
        options.no_provides,
        log,
        &mut acc,
    )?;

    pkgconfig::scan(view, options.no_provides, log, &mut acc)?;

    if let Some(log_path) = ctx.dependency_log_path() {
        if let Err(err) = write_dependency_log(&log_path, &acc.needed_paths) {
            log.warnf(&format!(
                "failed to write dependency log {}: {err}",
                log_path.display()
            ));
        }
    }

    let merged = merge_and_filter(declared, &acc);
    log.printf(&format!(
        "{package_name}: runtime={} provides={}",
        merged.runtime.len(),
        merged.provides.len()
    ));
    Ok(merged)
}

fn merge_and_filter(declared: &Dependencies, acc: &Accumulator) -> Dependencies {
    let mut runtime: Vec<String> = declared
        .runtime
        .iter()
        .cloned()
        .chain(acc.runtime.iter().cloned())
        .collect();
    runtime.sort();
    runtime.dedup();

    let mut provides: Vec<String> = declared
        .provides
        .iter()
        .cloned()
        .chain(acc.provides.iter().cloned())
        .collect();
    provides.sort();
    provides.dedup();

    let provided_names: HashSet<&str> = provides
        .iter()
        .map(|p| p.split('=').next().unwrap_or(p.as_str()))
        .collect();
    runtime.retain(|r| !provided_names.contains(r.as_str()));

    Dependencies {
        runtime,
        provides,
        replaces: declared.replaces.clone(),
        provider_priority: declared.provider_priority,
    }
}

fn write_dependency_log(
    path: &std::path::Path,
    needed_paths: &BTreeMap<String, Vec<String>>,
) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(needed_paths)?;
    std::fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(runtime: &[&str], provides: &[&str]) -> Dependencies {
        Dependencies {
            runtime: runtime.iter().map(|s| s.to_string()).collect(),
            provides: provides.iter().map(|s| s.to_string()).collect(),
            replaces: Vec::new(),
            provider_priority: None,
        }
    }

    #[test]
    fn merge_and_filter_sorts_and_dedupes() {
        let declared = deps(&["so:libb.so", "so:liba.so"], &[]);
        let acc = Accumulator {
            runtime: vec!["so:liba.so".to_string(), "so:libc.so".to_string()],
            provides: Vec::new(),
            needed_paths: BTreeMap::new(),
        };
        let merged = merge_and_filter(&declared, &acc);
        assert_eq!(
            merged.runtime,
            vec!["so:liba.so", "so:libb.so", "so:libc.so"]
        );
    }

    #[test]
    fn merge_and_filter_removes_self_provided_runtime() {
        let declared = deps(&[], &[]);
        let acc = Accumulator {
            runtime: vec!["so:libfoo.so.2".to_string()],
            provides: vec!["so:libfoo.so.2=2".to_string()],
            needed_paths: BTreeMap::new(),
        };
        let merged = merge_and_filter(&declared, &acc);
        assert!(merged.runtime.is_empty());
        assert_eq!(merged.provides, vec!["so:libfoo.so.2=2"]);
    }
}
