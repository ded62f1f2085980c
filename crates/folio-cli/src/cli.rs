use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use folio_xref::SaveMode;

#[derive(Parser)]
#[command(
    name = "folio",
    about = "Inspect and rewrite the object store of structured documents",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Session settings (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Summarize a document's version, trailer and object table
    Info(InfoArgs),
    /// Print one indirect object
    Show(ShowArgs),
    /// Save a document again in the chosen layout
    Rewrite(RewriteArgs),
    /// Free an object and save
    Remove(RemoveArgs),
    /// Copy an object and everything it references from another document
    Graft(GraftArgs),
    /// Free every object unreachable from the trailer and save
    Prune(PruneArgs),
}

/// Save layout shared by the mutating commands.
#[derive(Args, Clone, Debug)]
pub struct ModeArgs {
    /// standard, incremental or linearized (default from config)
    #[arg(short, long)]
    pub mode: Option<SaveMode>,
}

#[derive(Args)]
pub struct InfoArgs {
    pub path: PathBuf,
}

#[derive(Args)]
pub struct ShowArgs {
    pub path: PathBuf,
    pub number: u32,
}

#[derive(Args)]
pub struct RewriteArgs {
    pub path: PathBuf,
    /// Write here instead of replacing the input
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub mode: ModeArgs,
}

#[derive(Args)]
pub struct RemoveArgs {
    pub path: PathBuf,
    pub number: u32,
    #[command(flatten)]
    pub mode: ModeArgs,
}

#[derive(Args)]
pub struct GraftArgs {
    /// Document receiving the copy
    pub target: PathBuf,
    /// Document to copy from
    pub source: PathBuf,
    /// Object number in the source
    pub number: u32,
    #[command(flatten)]
    pub mode: ModeArgs,
}

#[derive(Args)]
pub struct PruneArgs {
    pub path: PathBuf,
    #[command(flatten)]
    pub mode: ModeArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["folio", "info", "a.pdf", "--format", "json", "-v"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Command::Info(_)));
    }

    #[test]
    fn parses_save_mode() {
        let cli = Cli::try_parse_from(["folio", "remove", "a.pdf", "4", "--mode", "incremental"])
            .unwrap();
        let Command::Remove(args) = cli.command else {
            panic!("expected remove");
        };
        assert_eq!(args.number, 4);
        assert_eq!(args.mode.mode, Some(SaveMode::Incremental));
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["folio", "prune", "a.pdf", "--mode", "fast"]).is_err());
    }

    #[test]
    fn graft_takes_three_positionals() {
        let cli = Cli::try_parse_from(["folio", "graft", "dst.pdf", "src.pdf", "12"]).unwrap();
        let Command::Graft(args) = cli.command else {
            panic!("expected graft");
        };
        assert_eq!(args.target, PathBuf::from("dst.pdf"));
        assert_eq!(args.source, PathBuf::from("src.pdf"));
        assert_eq!(args.number, 12);
        assert_eq!(args.mode.mode, None);
    }
}
