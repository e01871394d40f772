//! CLI argument parsing for the enhancer.
//!
//! Every command works on one project directory. The project manifest and the
//! enhancer config default to files under `<project>/.penhance/`.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Manifest file name under `<project>/.penhance/`.
pub const MANIFEST_FILE_NAME: &str = "project.json";

#[derive(Parser, Debug)]
#[command(
    name = "penhance",
    version,
    about = "Build-time persistence bytecode enhancement",
    after_help = "Commands:\n  init                  Write a config enabling every unit of the manifest\n  enhance               Discover persistence metadata and run the enhancer per unit\n  list                  List descriptor and annotated class files per unit\n  toggle [--on|--off]   Flip the enhancer's enabled flag\n  backends              List registered enhancer backends\n\nLogging:\n  PENHANCE_LOG=debug penhance enhance --project .",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Init(InitArgs),
    Enhance(EnhanceArgs),
    List(ListArgs),
    Toggle(ToggleArgs),
    Backends(BackendsArgs),
}

/// Locations shared by every command.
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Project root directory
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub project: PathBuf,

    /// Project manifest (defaults to <project>/.penhance/project.json)
    #[arg(long, value_name = "PATH")]
    pub manifest: Option<PathBuf>,

    /// Enhancer config (defaults to <project>/.penhance/config.json)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl ProjectArgs {
    pub fn manifest_path(&self) -> PathBuf {
        self.manifest
            .clone()
            .unwrap_or_else(|| self.project.join(".penhance").join(MANIFEST_FILE_NAME))
    }

    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| persist_enhance::config::default_config_path(&self.project))
    }
}

#[derive(Parser, Debug)]
#[command(about = "Write an enhancer config for the project")]
pub struct InitArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Overwrite an existing config
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Run discovery and enhancement over the affected units")]
pub struct EnhanceArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Restrict the build to these units, in this order
    #[arg(long, value_name = "UNIT", value_delimiter = ',')]
    pub units: Vec<String>,

    /// Emit a machine-readable summary
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "List discovered metadata per unit")]
pub struct ListArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Enable or disable the enhancer")]
pub struct ToggleArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Force the enhancer on
    #[arg(long, conflicts_with = "off")]
    pub on: bool,

    /// Force the enhancer off
    #[arg(long)]
    pub off: bool,
}

#[derive(Parser, Debug)]
#[command(about = "List registered enhancer backends")]
pub struct BackendsArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
}
