//! A single package's emission unit: the origin package or one subpackage.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{Copyright, Dependencies, Options, Scriptlets};
use crate::context::BuildContext;

/// Everything the Assembler needs to emit one `.apk`, constructed by the
/// Subpackage Dispatcher from the Configuration. `installed_size` and
/// `data_hash` start at their zero values and are filled in by the
/// Assembler once the data section has been written.
#[derive(Debug, Clone)]
pub struct PackageJob {
    pub package_name: String,
    pub origin_name: String,
    pub version: String,
    pub epoch: u64,
    pub description: String,
    pub url: String,
    pub commit: String,
    pub copyright: Vec<Copyright>,
    pub dependencies: Dependencies,
    pub options: Options,
    pub scriptlets: Scriptlets,
    pub installed_size: u64,
    pub data_hash: String,
    pub context: Arc<BuildContext>,
}

impl PackageJob {
    /// `{package-name}-{version}-r{epoch}`, the uniqueness key for this job.
    pub fn identity(&self) -> String {
        format!("{}-{}-r{}", self.package_name, self.version, self.epoch)
    }

    /// `{out-dir}/{arch}/{identity}.apk`
    pub fn filename(&self) -> PathBuf {
        self.context
            .arch_out_dir()
            .join(format!("{}.apk", self.identity()))
    }

    /// The workspace subdirectory this job's staged files live under.
    pub fn workspace_subdir(&self) -> PathBuf {
        self.context.workspace_subdir(&self.package_name)
    }
}
