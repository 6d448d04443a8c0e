//! Thin CLI wrapper around the emission core.
//!
//! Loading a melange-style manifest into a [`apkforge::Configuration`],
//! populating the workspace, and resolving signing material are the
//! caller's job; this binary exists so the core can be exercised and so
//! other tooling has something to shell out to.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use apkforge::context::BuildContext;
use apkforge::dispatch::Dispatcher;
use apkforge::log::TracingLog;
use apkforge::Configuration;

#[derive(Parser, Debug)]
#[command(name = "apkforge", about = "Deterministic APK package emission core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Emit one `.apk` per origin/subpackage declared in a configuration file.
    Build(BuildArgs),
}

#[derive(clap::Args, Debug)]
struct BuildArgs {
    /// Path to the build configuration (melange-style YAML manifest).
    config: PathBuf,

    /// Root containing `melange-out/<package-name>/` subtrees.
    #[arg(long, env = "APKFORGE_WORKSPACE", default_value = ".")]
    workspace: PathBuf,

    /// Directory under which `{arch}/{identity}.apk` is written.
    #[arg(long, env = "APKFORGE_OUT_DIR", default_value = "./packages")]
    out_dir: PathBuf,

    /// Target architecture string, e.g. `x86_64`.
    #[arg(long, env = "APKFORGE_ARCH")]
    arch: String,

    /// Path to an RSA private key (PKCS#8 PEM) for keyed signing.
    #[arg(long, env = "APKFORGE_SIGNING_KEY")]
    signing_key: Option<PathBuf>,

    /// File containing the signing key's passphrase, if it's encrypted.
    #[arg(long, env = "APKFORGE_SIGNING_PASSPHRASE_FILE")]
    signing_passphrase_file: Option<PathBuf>,

    /// Unix timestamp pinning every generated archive entry's mtime.
    #[arg(long, env = "APKFORGE_SOURCE_DATE_EPOCH", default_value_t = 0)]
    source_date_epoch: u64,

    /// Make every subpackage's `origin` field equal its own package name.
    #[arg(long)]
    strip_origin_name: bool,

    /// Append a line per emitted package to `packages.log` in the CWD.
    #[arg(long)]
    create_build_log: bool,

    /// Prefix path for a per-arch JSON dependency log.
    #[arg(long)]
    dependency_log: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Build(args) => run_build(args),
    }
}

fn run_build(args: BuildArgs) -> Result<()> {
    let config = Configuration::from_file(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;

    let signing_passphrase = args
        .signing_passphrase_file
        .as_ref()
        .map(std::fs::read_to_string)
        .transpose()
        .context("reading signing passphrase file")?
        .map(|s| s.trim_end().to_string());

    let context = Arc::new(BuildContext {
        source_date_epoch: args.source_date_epoch,
        workspace_dir: args.workspace,
        out_dir: args.out_dir,
        arch: args.arch,
        signing_key: args.signing_key,
        signing_passphrase,
        strip_origin_name: args.strip_origin_name,
        create_build_log: args.create_build_log,
        dependency_log: args.dependency_log,
    });

    let log = TracingLog;
    let dispatcher = Dispatcher::new(&log);
    let results = dispatcher.dispatch(&config, context);

    let mut failures = 0;
    for result in results {
        match result {
            Ok(path) => tracing::info!("wrote {}", path.display()),
            Err(err) => {
                failures += 1;
                tracing::error!("package job failed: {err}");
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} package job(s) failed");
    }
    Ok(())
}
