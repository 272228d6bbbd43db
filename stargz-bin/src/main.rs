use std::path::PathBuf;

use anyhow::Context;
use structopt::clap::AppSettings::*;
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;

#[derive(Debug, StructOpt)]
pub struct ArchiveArgs {
    #[structopt(name = "archive", parse(from_os_str), help = "Path to the archive")]
    pub path: PathBuf,

    #[structopt(long, help = "Map the archive into memory instead of reading it")]
    pub mmap: bool,
}

#[derive(Debug, StructOpt)]
enum Commands {
    #[structopt(name = "ls", visible_alias = "list", about = "List the node tree of an archive")]
    List {
        #[structopt(flatten)]
        archive: ArchiveArgs,

        #[structopt(help = "Directory to start from [default: the root]")]
        path: Option<String>,
    },

    #[structopt(name = "stat", about = "Show the attributes of one entry")]
    Stat {
        #[structopt(flatten)]
        archive: ArchiveArgs,

        path: String,

        #[structopt(long, help = "Print the attributes as JSON")]
        json: bool,
    },

    #[structopt(name = "cat", about = "Write the content of a file to stdout")]
    Cat {
        #[structopt(flatten)]
        archive: ArchiveArgs,

        path: String,

        #[structopt(long, default_value = "0", help = "Byte offset to start reading at")]
        offset: u64,

        #[structopt(long, help = "Number of bytes to read [default: to the end]")]
        length: Option<u64>,
    },

    #[structopt(name = "info", about = "Show archive metadata and statistics")]
    Info {
        #[structopt(flatten)]
        archive: ArchiveArgs,
    },
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "stargz",
    about = "Inspect seekable compressed archives through their table of contents.",
    settings = &[SubcommandRequiredElseHelp, DisableHelpSubcommand, VersionlessSubcommands]
)]
struct CliOpts {
    #[structopt(
        short,
        long,
        parse(from_occurrences),
        global = true,
        help = "Show verbose output; repeat for more"
    )]
    verbose: u8,

    #[structopt(subcommand)]
    cmd: Commands,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let opts = CliOpts::from_args();
    init_logging(opts.verbose);

    match opts.cmd {
        Commands::List { archive, path } => commands::list(&archive, path.as_deref())
            .with_context(|| format!("Listing `{}`", archive.path.display())),
        Commands::Stat {
            archive,
            path,
            json,
        } => commands::stat(&archive, &path, json)
            .with_context(|| format!("Inspecting `{}`", path)),
        Commands::Cat {
            archive,
            path,
            offset,
            length,
        } => commands::cat(&archive, &path, offset, length)
            .with_context(|| format!("Reading `{}`", path)),
        Commands::Info { archive } => commands::info(&archive)
            .with_context(|| format!("Summarizing `{}`", archive.path.display())),
    }
}
