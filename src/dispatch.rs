//! Subpackage Dispatcher: turns one Configuration into `n+1` Package Jobs
//! (the origin plus each declared subpackage) and runs the Assembler over
//! each, continuing past a failed job rather than aborting the whole build.

use std::sync::Arc;

use thiserror::Error;

use crate::assemble::{AssembleError, Assembler};
use crate::config::Configuration;
use crate::context::BuildContext;
use crate::job::PackageJob;
use crate::log::BuildLog;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("{package_name}: {source}")]
    Failed {
        package_name: String,
        #[source]
        source: AssembleError,
    },
}

pub struct Dispatcher<'a> {
    log: &'a dyn BuildLog,
}

impl<'a> Dispatcher<'a> {
    pub fn new(log: &'a dyn BuildLog) -> Self {
        Self { log }
    }

    /// Build and run a Package Job for the origin package and every
    /// subpackage declared in `config`. A failed job is recorded and
    /// dispatch continues; the full result set is always returned so a
    /// caller can decide how to treat partial failures.
    pub fn dispatch(
        &self,
        config: &Configuration,
        context: Arc<BuildContext>,
    ) -> Vec<Result<std::path::PathBuf, JobError>> {
        let jobs = self.build_jobs(config, context);
        let candidate_packages: Vec<String> =
            jobs.iter().map(|j| j.package_name.clone()).collect();

        let assembler = Assembler::new(self.log);
        jobs.into_iter()
            .map(|mut job| {
                let package_name = job.package_name.clone();
                assembler
                    .assemble(&mut job, &candidate_packages)
                    .map_err(|source| JobError::Failed {
                        package_name,
                        source,
                    })
            })
            .collect()
    }

    fn build_jobs(&self, config: &Configuration, context: Arc<BuildContext>) -> Vec<PackageJob> {
        let mut jobs = Vec::with_capacity(config.subpackages.len() + 1);
        let origin_name = config.package.name.clone();

        jobs.push(PackageJob {
            package_name: config.package.name.clone(),
            origin_name: origin_name.clone(),
            version: config.package.version.clone(),
            epoch: config.package.epoch,
            description: config.package.description.clone(),
            url: config.package.url.clone(),
            commit: config.package.commit.clone(),
            copyright: config.package.copyright.clone(),
            dependencies: config.package.dependencies.clone(),
            options: config.package.options,
            scriptlets: config.package.scriptlets.clone(),
            installed_size: 0,
            data_hash: String::new(),
            context: Arc::clone(&context),
        });

        for sub in &config.subpackages {
            let job_origin = if context.strip_origin_name {
                sub.name.clone()
            } else {
                origin_name.clone()
            };
            jobs.push(PackageJob {
                package_name: sub.name.clone(),
                origin_name: job_origin,
                version: config.package.version.clone(),
                epoch: config.package.epoch,
                description: sub.description.clone(),
                url: sub.url.clone(),
                commit: config.package.commit.clone(),
                copyright: config.package.copyright.clone(),
                dependencies: sub.dependencies.clone(),
                options: sub.options,
                scriptlets: sub.scriptlets.clone(),
                installed_size: 0,
                data_hash: String::new(),
                context: Arc::clone(&context),
            });
        }

        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PackageInfo, Subpackage};
    use crate::log::NullLog;
    use std::path::PathBuf;

    fn config() -> Configuration {
        Configuration {
            package: PackageInfo {
                name: "hello".to_string(),
                version: "1.0".to_string(),
                epoch: 0,
                ..Default::default()
            },
            subpackages: vec![Subpackage {
                name: "hello-doc".to_string(),
                ..Default::default()
            }],
            environment: serde_yaml::Value::Null,
            pipeline: serde_yaml::Value::Null,
        }
    }

    fn context(workspace: &std::path::Path, out: &std::path::Path, strip: bool) -> Arc<BuildContext> {
        Arc::new(BuildContext {
            source_date_epoch: 0,
            workspace_dir: workspace.to_path_buf(),
            out_dir: out.to_path_buf(),
            arch: "x86_64".to_string(),
            signing_key: None,
            signing_passphrase: None,
            strip_origin_name: strip,
            create_build_log: false,
            dependency_log: None,
        })
    }

    #[test]
    fn build_jobs_produces_origin_plus_each_subpackage() {
        let workspace = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::new(&NullLog);
        let jobs = dispatcher.build_jobs(&config(), context(workspace.path(), out.path(), false));

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].package_name, "hello");
        assert_eq!(jobs[1].package_name, "hello-doc");
        assert_eq!(jobs[1].origin_name, "hello");
    }

    #[test]
    fn strip_origin_name_uses_subpackage_name_as_origin() {
        let workspace = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::new(&NullLog);
        let jobs = dispatcher.build_jobs(&config(), context(workspace.path(), out.path(), true));

        assert_eq!(jobs[1].origin_name, "hello-doc");
    }

    #[test]
    fn dispatch_emits_an_apk_per_job() {
        let workspace = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::new(&NullLog);
        let results = dispatcher.dispatch(&config(), context(workspace.path(), out.path(), false));

        assert_eq!(results.len(), 2);
        for result in &results {
            assert!(result.is_ok());
        }
        assert!(results[0]
            .as_ref()
            .unwrap()
            .ends_with(PathBuf::from("x86_64/hello-1.0-r0.apk")));
    }
}
