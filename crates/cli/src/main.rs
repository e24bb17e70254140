use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use romscope::commands::{
    add_rom_command, analyze_command, disasm_command, header_command, init_project_command,
    list_roms_command, list_runs_command, project_info_command, regions_command, AnalyzeArgs,
};
use romscope::init_logging;

/// Region classifier and 65816 disassembler for console ROM images.
///
/// This CLI is a thin wrapper around `romscope-core`. All substantive logic
/// lives in the library so it can be tested and reused from other frontends.
#[derive(Parser, Debug)]
#[command(name = "romscope", version, about = "ROM region classifier and 65816 disassembler", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// Which image to analyse and how.
#[derive(Args, Debug)]
struct ImageArgs {
    /// Project root directory. Defaults to the current working directory.
    #[arg(long, default_value = ".")]
    root: String,

    /// Path to a ROM image outside any project.
    #[arg(long, conflicts_with = "rom")]
    path: Option<String>,

    /// Name of a ROM registered in the project.
    #[arg(long)]
    rom: Option<String>,

    /// Analysis profile (.yaml, .yml or .json).
    #[arg(long)]
    profile: Option<String>,

    /// Force the mapping mode (lorom, hirom, exhirom) instead of detecting it.
    #[arg(long)]
    mode: Option<String>,
}

impl From<ImageArgs> for AnalyzeArgs {
    fn from(a: ImageArgs) -> Self {
        AnalyzeArgs { root: a.root, path: a.path, rom: a.rom, profile: a.profile, mode: a.mode }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a new romscope project at the given root.
    ///
    /// Creates `.romscope/` with the project config and database, plus the
    /// `profiles` and `outputs` directories.
    InitProject {
        #[arg(long, default_value = ".")]
        root: String,

        /// Project name. Derived from the root directory when omitted.
        #[arg(long)]
        name: Option<String>,
    },

    /// Show basic information about an existing project.
    ProjectInfo {
        #[arg(long, default_value = ".")]
        root: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Register a ROM image in the project database.
    AddRom {
        #[arg(long, default_value = ".")]
        root: String,

        /// Path to the ROM image.
        #[arg(long)]
        path: String,

        /// Name used to refer to the ROM. Defaults to the file stem.
        #[arg(long)]
        name: Option<String>,

        /// Skip SHA-256 computation.
        #[arg(long, default_value_t = false)]
        skip_hash: bool,
    },

    /// List ROMs registered in the project database.
    ListRoms {
        #[arg(long, default_value = ".")]
        root: String,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show the mapping decision, internal header and vectors of an image.
    Header {
        #[arg(long, default_value = ".")]
        root: String,

        #[arg(long, conflicts_with = "rom")]
        path: Option<String>,

        #[arg(long)]
        rom: Option<String>,

        #[arg(long)]
        mode: Option<String>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Classify every byte of an image and discover its code.
    ///
    /// Runs on registered ROMs are recorded in the project database.
    Analyze {
        #[command(flatten)]
        image: ImageArgs,

        /// Print the full project model as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Also write the project model as JSON to this file.
        #[arg(long)]
        out: Option<String>,
    },

    /// Print assembly listings of discovered functions.
    Disasm {
        #[command(flatten)]
        image: ImageArgs,

        /// Only this function, by label name or address (e.g. `$00:8000`).
        #[arg(long)]
        function: Option<String>,
    },

    /// List recorded analysis runs.
    ListRuns {
        #[arg(long, default_value = ".")]
        root: String,

        /// Only runs of this ROM.
        #[arg(long)]
        rom: Option<String>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show the regions stored by the latest successful run of a ROM.
    Regions {
        #[arg(long, default_value = ".")]
        root: String,

        #[arg(long)]
        rom: String,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::InitProject { root, name } => init_project_command(&root, name)?,
        Command::ProjectInfo { root, json } => project_info_command(&root, json)?,
        Command::AddRom { root, path, name, skip_hash } => add_rom_command(&root, &path, name, skip_hash)?,
        Command::ListRoms { root, json } => list_roms_command(&root, json)?,
        Command::Header { root, path, rom, mode, json } => {
            header_command(&root, path.as_deref(), rom.as_deref(), mode.as_deref(), json)?
        }
        Command::Analyze { image, json, out } => analyze_command(&image.into(), json, out.as_deref())?,
        Command::Disasm { image, function } => disasm_command(&image.into(), function.as_deref())?,
        Command::ListRuns { root, rom, json } => list_runs_command(&root, rom.as_deref(), json)?,
        Command::Regions { root, rom, json } => regions_command(&root, &rom, json)?,
    }

    Ok(())
}
