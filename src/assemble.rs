//! Package Assembler: orchestrates scanning, data/control construction,
//! optional signing, and final concatenation into one `.apk` file.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use thiserror::Error;

use crate::config::Dependencies;
use crate::control::{self, ControlInfo};
use crate::data;
use crate::fsview::FsView;
use crate::job::PackageJob;
use crate::log::BuildLog;
use crate::scan;
use crate::sign::{self, SignError, Signer};

#[derive(Error, Debug)]
pub enum AssembleError {
    #[error("package workspace subdir is missing and could not be created: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("dependency scan failed: {0}")]
    Scan(#[source] std::io::Error),

    #[error("data section build failed: {0}")]
    Data(#[from] crate::data::DataError),

    #[error("control section build failed: {0}")]
    Control(#[from] crate::control::ControlError),

    #[error("signing failed: {0}")]
    Sign(#[from] SignError),

    #[error("output I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Assembles one [`PackageJob`] into a finished `.apk` file.
pub struct Assembler<'a> {
    pub log: &'a dyn BuildLog,
}

impl<'a> Assembler<'a> {
    pub fn new(log: &'a dyn BuildLog) -> Self {
        Self { log }
    }

    /// Run the full emission pipeline for `job`, given the sibling package
    /// names (origin plus every subpackage) the Dependency Scanner's
    /// cross-package symlink dereference may need to probe.
    pub fn assemble(
        &self,
        job: &mut PackageJob,
        candidate_packages: &[String],
    ) -> Result<PathBuf, AssembleError> {
        let subdir = job.workspace_subdir();
        fs::create_dir_all(&subdir).map_err(AssembleError::Workspace)?;

        let view = FsView::new(&subdir);

        let dependencies: Dependencies = scan::run(
            &view,
            &job.context,
            &job.package_name,
            &format!("{}-r{}", job.version, job.epoch),
            &job.dependencies,
            &job.options,
            candidate_packages,
            self.log,
        )
        .map_err(AssembleError::Scan)?;
        job.dependencies = dependencies;

        job.installed_size = view.installed_size().map_err(AssembleError::Scan)?;

        let mut data_file = tempfile::tempfile()?;
        let workers = data::worker_count();
        job.data_hash = data::build(
            &view,
            &mut data_file,
            job.context.source_date_epoch,
            workers,
        )?;

        let licenses: Vec<String> = job
            .copyright
            .iter()
            .map(|c| c.license.clone())
            .collect();
        let control_info = ControlInfo {
            package_name: &job.package_name,
            origin_name: &job.origin_name,
            version: &job.version,
            epoch: job.epoch,
            arch: &job.context.arch,
            installed_size: job.installed_size,
            description: &job.description,
            url: &job.url,
            commit: &job.commit,
            source_date_epoch: job.context.source_date_epoch,
            licenses: &licenses,
            dependencies: &job.dependencies,
            scriptlets: &job.scriptlets,
            data_hash: &job.data_hash,
        };
        let control_bytes = control::build(&control_info)?;

        let signer: Option<Box<dyn Signer>> = sign::signer_for(
            job.context.signing_key.as_ref(),
            job.context.signing_passphrase.as_deref(),
        )?;
        let signature_bytes = match &signer {
            Some(signer) => Some(sign::build_signature_section(
                signer.as_ref(),
                &control_bytes,
                job.context.source_date_epoch,
            )?),
            None => None,
        };

        let out_dir = job.context.arch_out_dir();
        fs::create_dir_all(&out_dir)?;

        let final_path = job.filename();
        let mut out = fs::File::create(&final_path)?;
        if let Some(signature_bytes) = &signature_bytes {
            out.write_all(signature_bytes)?;
        }
        out.write_all(&control_bytes)?;
        io::copy(&mut data_file, &mut out)?;
        out.flush()?;

        if job.context.create_build_log {
            if let Err(err) = append_build_log(job) {
                self.log
                    .warnf(&format!("failed to append packages.log: {err}"));
            }
        }

        Ok(final_path)
    }
}

fn append_build_log(job: &PackageJob) -> io::Result<()> {
    let mut log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("packages.log")?;
    writeln!(
        log_file,
        "{}|{}|{}|{}-r{}",
        job.context.arch, job.origin_name, job.package_name, job.version, job.epoch
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Dependencies, Options, Scriptlets};
    use crate::context::BuildContext;
    use crate::log::NullLog;
    use std::sync::Arc;

    fn job_in(workspace: &std::path::Path, out: &std::path::Path) -> PackageJob {
        PackageJob {
            package_name: "empty".to_string(),
            origin_name: "empty".to_string(),
            version: "1.0".to_string(),
            epoch: 0,
            description: String::new(),
            url: String::new(),
            commit: String::new(),
            copyright: Vec::new(),
            dependencies: Dependencies::default(),
            options: Options::default(),
            scriptlets: Scriptlets::default(),
            installed_size: 0,
            data_hash: String::new(),
            context: Arc::new(BuildContext {
                source_date_epoch: 0,
                workspace_dir: workspace.to_path_buf(),
                out_dir: out.to_path_buf(),
                arch: "x86_64".to_string(),
                signing_key: None,
                signing_passphrase: None,
                strip_origin_name: false,
                create_build_log: false,
                dependency_log: None,
            }),
        }
    }

    #[test]
    fn empty_package_produces_a_gzip_prefixed_apk() {
        let workspace = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut job = job_in(workspace.path(), out.path());

        let log = NullLog;
        let assembler = Assembler::new(&log);
        let path = assembler.assemble(&mut job, &["empty".to_string()]).unwrap();

        assert!(path.ends_with("x86_64/empty-1.0-r0.apk"));
        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[0..2], &[0x1f, 0x8b]);
        assert_eq!(job.installed_size, 0);
        assert_eq!(job.data_hash.len(), 64);
    }
}
