use anyhow::Result;
use clap::Parser;
use modman::commands;
use modman::config::ConfigOverrides;
use modman::runtime::{RealRuntime, Runtime};
use std::path::PathBuf;
use std::sync::Arc;

/// modman - mod manager for Quest games
///
/// Installs, enables, disables and removes `.qmod` archives, resolving and
/// downloading their dependencies.
///
/// If the MODMAN_TOKEN environment variable is set, it is sent as a bearer
/// token with every download.
///
/// Examples:
///   modman install ./Noodle.qmod    # Install an archive and its dependencies
///   modman uninstall noodle         # Disable a mod, keeping its archive
#[derive(Parser, Debug)]
#[command(author, version = env!("MODMAN_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data root directory (defaults to ~/.modman; also via MODMAN_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "MODMAN_ROOT",
        value_name = "PATH",
        global = true
    )]
    root: Option<PathBuf>,

    /// Package id of the host application
    #[arg(
        long = "host-package",
        env = "MODMAN_HOST_PACKAGE",
        value_name = "ID",
        global = true
    )]
    host_package: Option<String>,

    /// Version of the host application
    #[arg(
        long = "host-version",
        env = "MODMAN_HOST_VERSION",
        value_name = "VERSION",
        global = true
    )]
    host_version: Option<String>,

    /// Directory mod files are installed into
    #[arg(long = "mods-dir", env = "MODMAN_MODS_DIR", value_name = "PATH", global = true)]
    mods_dir: Option<PathBuf>,

    /// Directory library files are installed into
    #[arg(long = "libs-dir", env = "MODMAN_LIBS_DIR", value_name = "PATH", global = true)]
    libs_dir: Option<PathBuf>,

    /// URL of the core mod index
    #[arg(long = "core-index", env = "MODMAN_CORE_INDEX", value_name = "URL", global = true)]
    core_index: Option<String>,

    /// Shell command that restarts the host application
    #[arg(long = "restart-command", env = "MODMAN_RESTART_COMMAND", global = true)]
    restart_command: Option<String>,

    /// More output (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// List downloaded mods
    List,

    /// Reload the archives directory
    Scan,

    /// Install a downloaded mod by id, or an archive by path
    Install(InstallArgs),

    /// Download an archive and install it
    InstallUrl(InstallUrlArgs),

    /// Disable or delete a mod
    Uninstall(UninstallArgs),

    /// Enable a disabled mod, disable an enabled one
    Toggle(ToggleArgs),

    /// Check core mods for the host version
    Core(CoreArgs),
}

#[derive(clap::Args, Debug)]
struct InstallArgs {
    /// Mod id or path to a .qmod archive
    #[arg(value_name = "ID|PATH")]
    target: String,
}

#[derive(clap::Args, Debug)]
struct InstallUrlArgs {
    /// File name to store the download under
    #[arg(value_name = "FILE_NAME")]
    file_name: String,

    #[arg(value_name = "URL")]
    url: String,
}

#[derive(clap::Args, Debug)]
struct UninstallArgs {
    #[arg(value_name = "ID")]
    id: String,

    /// Delete the archive as well
    #[arg(long)]
    delete: bool,

    /// Remove even if the mod is protected
    #[arg(long, short = 'f')]
    force: bool,
}

#[derive(clap::Args, Debug)]
struct ToggleArgs {
    #[arg(value_name = "ID")]
    id: String,
}

#[derive(clap::Args, Debug)]
struct CoreArgs {
    /// Install missing and outdated core mods
    #[arg(long)]
    install: bool,

    /// Do not restart the host after installing
    #[arg(long = "no-restart")]
    no_restart: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            root: self.root.clone(),
            host_package: self.host_package.clone(),
            host_version: self.host_version.clone(),
            core_index_url: self.core_index.clone(),
            mods_dir: self.mods_dir.clone(),
            libs_dir: self.libs_dir.clone(),
            restart_command: self.restart_command.clone(),
        }
    }
}

fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_filter(cli.verbose)),
    )
    .init();

    let runtime: Arc<dyn Runtime> = Arc::new(RealRuntime);
    let manager = commands::open(runtime, cli.overrides()).await?;

    match cli.command {
        Commands::List => commands::list(&manager).await?,
        Commands::Scan => commands::scan(&manager).await?,
        Commands::Install(args) => commands::install(&manager, &args.target).await?,
        Commands::InstallUrl(args) => {
            commands::install_url(&manager, &args.file_name, &args.url).await?
        }
        Commands::Uninstall(args) => {
            commands::uninstall(&manager, &args.id, args.delete, args.force).await?
        }
        Commands::Toggle(args) => commands::toggle(&manager, &args.id).await?,
        Commands::Core(args) => commands::core(&manager, args.install, !args.no_restart).await?,
    }
    Ok(())
}
