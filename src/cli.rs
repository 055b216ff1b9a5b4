use clap::{Args, Parser, Subcommand};

/// Download public stories, highlights and spotlights for a profile
#[derive(Parser)]
#[command(name = "storyfetch")]
#[command(about = "Fetch profile media and bundle it into zip archives", long_about = None)]
pub struct Cli {
    /// Maximum simultaneous media downloads (overrides config)
    #[arg(short, long, global = true)]
    pub concurrency: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List highlight and spotlight album titles
    Albums {
        handle: String,
    },
    /// Download the current story
    Stories {
        handle: String,
        /// Skip building a zip archive
        #[arg(long)]
        no_zip: bool,
    },
    /// Download highlight albums
    Highlights {
        handle: String,
        #[command(flatten)]
        opts: AlbumOpts,
    },
    /// Download spotlight albums
    Spotlights {
        handle: String,
        #[command(flatten)]
        opts: AlbumOpts,
    },
}

#[derive(Args)]
pub struct AlbumOpts {
    /// Album title to download; all albums when omitted
    #[arg(short, long)]
    pub album: Option<String>,
    /// Skip building a zip archive
    #[arg(long)]
    pub no_zip: bool,
}
