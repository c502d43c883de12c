use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use xpkg::repo::Repo;
use xpkg::repo::manager::{InstallOutcome, RepoManager};
use xpkg::runtime::{RealRuntime, Runtime};

/// xpkg - module package repository manager
///
/// Installs, removes, and lists namespace-scoped module packages kept in a
/// local repository directory.
///
/// Examples:
///   xpkg install pkg3.zip   # Install a package archive
///   xpkg remove pkg3        # Remove an installed package
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Repository root directory (overrides default; also via XPKG_REPO)
    #[arg(
        long = "repo",
        short = 'r',
        env = "XPKG_REPO",
        value_name = "PATH",
        global = true
    )]
    repo_root: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install a package archive or a single module file
    Install(InstallArgs),

    /// Remove an installed package
    Remove(RemoveArgs),

    /// List installed packages
    List,

    /// List the module files installed for a namespace
    Modules(ModulesArgs),
}

#[derive(clap::Args, Debug)]
struct InstallArgs {
    /// Path to a package archive (.zip/.xar) or a standalone module file
    #[arg(value_name = "PATH")]
    source: PathBuf,
}

#[derive(clap::Args, Debug)]
struct RemoveArgs {
    /// Package identifier (name-version) or bare package name
    #[arg(value_name = "PACKAGE")]
    package: String,
}

#[derive(clap::Args, Debug)]
struct ModulesArgs {
    /// Namespace URI
    #[arg(value_name = "NAMESPACE")]
    namespace: String,
}

fn repo_root(runtime: &impl Runtime, cli_root: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(root) = cli_root {
        return Ok(root);
    }
    runtime
        .home_dir()
        .map(|home| home.join(".xpkg"))
        .context("Could not determine home directory; pass --repo")
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = RealRuntime;

    let repo = Repo::new(repo_root(&runtime, cli.repo_root)?);
    repo.load(&runtime)?;
    let manager = RepoManager::new(&runtime, &repo);

    match cli.command {
        Commands::Install(args) => match manager.install(&args.source)? {
            InstallOutcome::Package(id) => println!("{id}"),
            InstallOutcome::Module(path) => println!("{}", path.display()),
        },
        Commands::Remove(args) => manager.delete(&args.package)?,
        Commands::List => {
            for id in repo.package_ids() {
                let dir = repo.location(&id)?;
                println!("{id}\t{dir}");
            }
        }
        Commands::Modules(args) => {
            for module in manager.resolve_modules(&args.namespace) {
                println!("{}\t{}", module.pkg_id, module.path.display());
            }
        }
    }
    Ok(())
}
