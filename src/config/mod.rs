pub mod migrate;
pub mod settings;

use clap::{Args, Parser, Subcommand};

pub use settings::Settings;

pub const DEFAULT_DBTYPE: &str = "production";
pub const PROMPT: &str = "prompt";
pub const DEFAULT_LOCALFILE: &str = "default";

#[derive(Debug, Clone, Parser)]
#[command(name = "capatross", version)]
#[command(
    about = "Post logs from a capistrano deploy to the deployment server, and fetch database snapshots"
)]
pub struct CliConfig {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Setup capatross on this host
    Setup {
        /// Force an overwrite of any existing capatross settings
        #[arg(short, long)]
        force: bool,
    },
    /// About capatross
    About,
    /// List local deploys
    List,
    /// Post or repost the logdata from the specified local deploy
    Post {
        /// The capatross deploy id to post/repost (use 'list' to show known deploys)
        #[arg(short, long)]
        log: String,
    },
    /// Post all unposted deploys
    Sync,
    /// Show settings
    Showsettings,
    /// Get information about a database dump for an application
    Dumpinfo(DumpArgs),
    /// Request a database dump
    Dodump(DumpArgs),
    /// Request a database copy from production to development
    Docopy(AppArgs),
    /// Download data snapshots from the server for the specified application
    Downloaddata(SnapshotArgs),
    /// Downloads and imports a data snapshot for the specified application
    Getdata(SnapshotArgs),
    /// Imports a data snapshot for the specified application if the file exists
    Importdata(SnapshotArgs),
}

#[derive(Debug, Clone, Args)]
pub struct AppArgs {
    /// Application name
    #[arg(short = 'a', long = "appname", visible_alias = "application", default_value = PROMPT)]
    pub appname: String,
}

#[derive(Debug, Clone, Args)]
pub struct DumpArgs {
    #[command(flatten)]
    pub app: AppArgs,

    /// Database type
    #[arg(short = 't', long, default_value = DEFAULT_DBTYPE)]
    pub dbtype: String,
}

#[derive(Debug, Clone, Args)]
pub struct SnapshotArgs {
    #[command(flatten)]
    pub dump: DumpArgs,

    /// Full path and name of the file you want to download to (defaults to a file in /tmp)
    #[arg(short = 'f', long, default_value = DEFAULT_LOCALFILE)]
    pub localfile: String,
}

impl SnapshotArgs {
    /// `None` when the default /tmp location should be derived.
    pub fn localfile_override(&self) -> Option<&str> {
        Some(self.localfile.as_str()).filter(|f| *f != DEFAULT_LOCALFILE && !f.is_empty())
    }
}
