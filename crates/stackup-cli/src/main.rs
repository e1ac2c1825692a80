//! Stackup - application-server provisioning
//!
//! Usage:
//!   stackup install --app-dir ... --pkg-dir ... --app-port ...
//!   stackup find <dir> <prefix>     # Resolve a versioned artifact
//!   stackup tree <path>             # Show a tree with permissions
//!   stackup remove <path>           # Tear down a locked deployment
//!   stackup preset tomcat7          # Print a built-in stack descriptor

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stackup_core::artifact::find_artifact;
use stackup_core::config::{StackConfig, StackPreset, to_toml};
use stackup_core::fs::{chmod_read_write, delete_subtree, render_tree};
use stackup_core::metadata::{METADATA_FILE, Metadata};
use stackup_core::pipeline::{ProvisionRequest, ProvisioningPipeline};
use stackup_core::ProvisionError;

#[derive(Parser)]
#[command(name = "stackup", version)]
#[command(about = "Application-server provisioning", long_about = None)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision a deployment root
    Install(Box<InstallArgs>),

    /// Find the single `<prefix>*.<extension>` file in a directory
    Find {
        /// Directory to search (not recursive)
        dir: PathBuf,
        /// Identifier prefix, e.g. `postgresql`
        prefix: String,
        #[arg(long, short, default_value = "jar")]
        extension: String,
    },

    /// Print a directory tree with permissions
    Tree { path: PathBuf },

    /// Make a tree writable again, then delete it
    #[command(alias = "rm")]
    Remove { path: PathBuf },

    /// Print a built-in stack descriptor as TOML
    Preset {
        #[arg(default_value_t = StackPreset::Tomcat8)]
        stack: StackPreset,
    },
}

#[derive(Args)]
struct InstallArgs {
    /// Deployment root to populate
    #[arg(long, env = "app_dir")]
    app_dir: PathBuf,

    /// Plugin root holding the runtime archive, libraries and assets
    #[arg(long, env = "plugin_dir", default_value = ".")]
    plugin_dir: PathBuf,

    /// Package root holding the application archive
    #[arg(long, env = "pkg_dir")]
    pkg_dir: PathBuf,

    /// HTTP port of the instance
    #[arg(long, env = "app_port")]
    app_port: u16,

    /// Directory holding metadata.json (default: <pkg-dir>/.genapp)
    #[arg(long, env = "genapp_dir")]
    genapp_dir: Option<PathBuf>,

    /// Built-in stack used when no descriptor is found
    #[arg(long, default_value_t = StackPreset::Tomcat8)]
    stack: StackPreset,

    /// Stack descriptor (default: <plugin-dir>/stack.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the provisioned tree with permissions
    #[arg(long)]
    dump: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "stackup=debug,stackup_core=debug"
    } else {
        "stackup=info,stackup_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Install(args) => run_install(*args),
        Commands::Find {
            dir,
            prefix,
            extension,
        } => {
            let found = find_artifact(&dir, &prefix, &extension).map_err(with_kind)?;
            println!("{}", found.display());
            Ok(())
        }
        Commands::Tree { path } => {
            print!("{}", render_tree(&path).map_err(with_kind)?);
            Ok(())
        }
        Commands::Remove { path } => run_remove(&path),
        Commands::Preset { stack } => {
            print!("{}", to_toml(&stack.config()).map_err(with_kind)?);
            Ok(())
        }
    }
}

fn run_install(args: InstallArgs) -> Result<()> {
    let deployment_root = absolute(&args.app_dir)?;
    let plugin_root = absolute(&args.plugin_dir)?;
    let package_root = absolute(&args.pkg_dir)?;
    let control_data_root = match args.genapp_dir {
        Some(dir) => absolute(&dir)?,
        None => {
            let dir = package_root.join(".genapp");
            info!("'genapp_dir' not set, using {}", dir.display());
            dir
        }
    };

    let config = StackConfig::resolve(args.config.as_deref(), &plugin_root, args.stack)
        .map_err(with_kind)?;
    let metadata = Metadata::from_file(&control_data_root.join(METADATA_FILE)).map_err(with_kind)?;

    let request = ProvisionRequest {
        deployment_root,
        plugin_root,
        package_root,
        control_data_root,
        port: args.app_port,
    };
    let report = ProvisioningPipeline::new(config, request, &metadata)
        .run()
        .map_err(with_kind)?;

    println!(
        "Provisioned {} ({} steps, java {})",
        report.target.deployment_root.display(),
        report.completed.len(),
        report.java.version
    );
    for file in &report.generated {
        println!("  wrote {}", file.display());
    }
    if args.dump {
        print!(
            "{}",
            render_tree(&report.target.deployment_root).map_err(with_kind)?
        );
    }
    Ok(())
}

fn run_remove(path: &Path) -> Result<()> {
    // A symlinked root is removed as a link; its target keeps its modes.
    let is_link = std::fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false);
    if !is_link {
        chmod_read_write(path).map_err(with_kind)?;
    }
    delete_subtree(path).map_err(with_kind)?;
    println!("Removed {}", path.display());
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .with_context(|| format!("Failed to resolve path: {}", path.display()))
}

/// Prefix the failure class so the exit message names it.
fn with_kind(err: ProvisionError) -> anyhow::Error {
    let kind = err.kind();
    let context = match err.step() {
        Some(step) => format!("{kind} during {step}"),
        None => kind.to_string(),
    };
    anyhow::Error::new(err).context(context)
}
