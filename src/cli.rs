use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "lsif-bundle",
    version,
    about = "Inspect and incrementally merge code intelligence bundles",
    after_help = r#"Examples:
  git diff --name-status v1 v2 | lsif-bundle merge --base v1.db --patch v2-patch.db --output v2.db --changes -
  lsif-bundle stats --bundle v2.db
  lsif-bundle definitions --bundle v2.db --path src/lib.rs --line 10 --character 4
  lsif-bundle referencing --bundle v2.db --path src/lib.rs --path src/util.rs
"#
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Merge a patch bundle into a copy of a base bundle.
    Merge {
        #[arg(long)]
        base: PathBuf,
        #[arg(long)]
        patch: PathBuf,
        /// Destination; replaced atomically once the merge commits.
        #[arg(long)]
        output: PathBuf,
        /// File with `git diff --name-status` output, or `-` for stdin.
        #[arg(long)]
        changes: PathBuf,
    },
    /// Print meta, counts and content digests of a bundle.
    Stats {
        #[arg(long)]
        bundle: PathBuf,
    },
    /// Definitions of the symbol at a position.
    Definitions {
        #[command(flatten)]
        at: PositionArgs,
    },
    /// References of the symbol at a position.
    References {
        #[command(flatten)]
        at: PositionArgs,
    },
    /// Documents that use definitions located in the given paths.
    Referencing {
        #[arg(long)]
        bundle: PathBuf,
        #[arg(long = "path", required = true)]
        paths: Vec<String>,
    },
}

#[derive(clap::Args)]
pub struct PositionArgs {
    #[arg(long)]
    pub bundle: PathBuf,
    #[arg(long)]
    pub path: String,
    /// Zero-based line.
    #[arg(long)]
    pub line: u32,
    /// Zero-based character offset.
    #[arg(long)]
    pub character: u32,
}
