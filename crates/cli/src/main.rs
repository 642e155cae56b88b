mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pkgver_lib::config::ConfigOverrides;

use crate::output::{OutputFormat, print_error};

/// pkgver - content-addressed toolchain package cache
#[derive(Parser)]
#[command(name = "pkgver")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Path to the config file (default: ./pkgver.json)
  #[arg(long, global = true, value_name = "PATH")]
  config: Option<PathBuf>,

  /// Local package cache (overrides config and PKGVER_CACHE_DIR)
  #[arg(long, global = true, value_name = "DIR")]
  cache_dir: Option<PathBuf>,

  /// Extraction destination (overrides config and PKGVER_DEST_DIR)
  #[arg(long, global = true, value_name = "DIR")]
  dest_dir: Option<PathBuf>,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Copy archive files into the cache and record them in the package manifest
  Archive {
    /// Target the package is built for (default: this machine)
    #[arg(short, long)]
    target: Option<String>,

    #[arg(short, long)]
    package: String,

    /// URL prefix under which the archives will be downloadable
    #[arg(long)]
    url_prefix: Option<String>,

    /// Directory inside the archives to extract from
    #[arg(long, default_value = "")]
    tar_src_dir: String,

    /// Directory under the package's extraction dir to extract into
    #[arg(long, default_value = "")]
    extract_dir: String,

    /// Archive files to add
    #[arg(required = true)]
    files: Vec<PathBuf>,
  },

  /// Bring the cache in line with a manifest, or with every configured package
  Sync {
    #[arg(short, long)]
    target: Option<String>,

    #[arg(short, long)]
    package: Option<String>,

    /// Sync the package from this manifest file instead of its revision file
    #[arg(long, requires = "package", value_name = "MANIFEST")]
    from: Option<PathBuf>,
  },

  /// Extract synced packages into the destination
  Extract {
    #[arg(short, long)]
    target: Option<String>,

    #[arg(short, long)]
    package: Option<String>,
  },

  /// Publish a cached package to a remote store
  Upload {
    #[arg(short, long)]
    target: Option<String>,

    #[arg(short, long)]
    package: String,

    #[arg(short, long)]
    revision: u64,

    /// Remote store directory
    #[arg(long, value_name = "DIR")]
    remote: PathBuf,
  },

  /// Pin a published revision of a package in its revision file
  SetRevision {
    #[arg(short, long)]
    package: String,

    #[arg(short, long)]
    revision: u64,

    /// Remote store directory or base URL
    #[arg(long)]
    remote: String,

    /// Targets to pin (default: every configured target)
    #[arg(short, long)]
    target: Vec<String>,
  },

  /// Show cached packages and their archives
  List {
    #[arg(short, long)]
    target: Option<String>,
  },

  /// Run a build plan, skipping packages whose inputs are unchanged
  Build {
    /// Build plan file
    #[arg(long, value_name = "FILE")]
    plan: PathBuf,

    /// Work directory for outputs and memo files
    #[arg(long, value_name = "DIR", default_value = "build")]
    work_dir: PathBuf,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> Result<()> {
  let output = cli.output;
  let load_config = || {
    cmd::load_config(
      cli.config.as_deref(),
      ConfigOverrides {
        cache_dir: cli.cache_dir.clone(),
        dest_dir: cli.dest_dir.clone(),
        revisions_dir: None,
      },
    )
  };

  match cli.command {
    Commands::Archive {
      target,
      package,
      url_prefix,
      tar_src_dir,
      extract_dir,
      files,
    } => cmd::cmd_archive(
      &load_config()?,
      cmd::ArchiveArgs {
        target,
        package,
        url_prefix,
        tar_src_dir,
        extract_dir,
        files,
      },
      output,
    ),
    Commands::Sync { target, package, from } => cmd::cmd_sync(&load_config()?, target, package, from, output),
    Commands::Extract { target, package } => cmd::cmd_extract(&load_config()?, target, package, output),
    Commands::Upload {
      target,
      package,
      revision,
      remote,
    } => cmd::cmd_upload(&load_config()?, target, &package, revision, &remote, output),
    Commands::SetRevision {
      package,
      revision,
      remote,
      target,
    } => cmd::cmd_set_revision(&load_config()?, &package, revision, &remote, target, output),
    Commands::List { target } => cmd::cmd_list(&load_config()?, target.as_deref(), output),
    Commands::Build { plan, work_dir } => cmd::cmd_build(&plan, &work_dir, output),
  }
}
