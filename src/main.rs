mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{AlbumOpts, Cli, Commands};
use storyfetch::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("storyfetch=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    if let Some(n) = cli.concurrency { config.concurrency = n.max(1); }
    let sf = Storyfetch::new(config)?;

    match cli.command {
        Commands::Albums { handle } => {
            let Some(collections) = sf.collections(&handle).await else {
                eprintln!("No data found or can't access the user's page.");
                return Ok(());
            };
            print_albums("Highlights", &collections, collections.highlights());
            print_albums("Spotlights", &collections, collections.spotlights());
        }
        Commands::Stories { handle, no_zip } => {
            run(&sf, &handle, Selection::Stories, !no_zip).await?;
        }
        Commands::Highlights { handle, opts } => {
            run(&sf, &handle, Selection::Highlights(album_choice(&opts)), !opts.no_zip).await?;
        }
        Commands::Spotlights { handle, opts } => {
            run(&sf, &handle, Selection::Spotlights(album_choice(&opts)), !opts.no_zip).await?;
        }
    }
    Ok(())
}

fn album_choice(opts: &AlbumOpts) -> AlbumChoice {
    match &opts.album {
        Some(name) if !name.eq_ignore_ascii_case("all") => AlbumChoice::Named(name.clone()),
        _ => AlbumChoice::All,
    }
}

fn print_albums(label: &str, collections: &Collections, titles: Vec<String>) {
    println!("{label}:");
    if titles.is_empty() {
        println!("  (none)");
    }
    for t in titles {
        let count = collections.get(&t).map(|u| u.len()).unwrap_or(0);
        println!("  {t} ({count})");
    }
}

async fn run(sf: &Storyfetch, handle: &str, selection: Selection, offer_archive: bool) -> Result<()> {
    match sf.download(handle, &selection, offer_archive).await? {
        Outcome::NoProfile => eprintln!("No data found or can't access the user's page."),
        Outcome::NothingSelected => eprintln!("No media found for {}.", selection.purpose()),
        Outcome::Downloaded { files, archive } => {
            println!("Downloaded {} file(s):", files.len());
            for f in &files {
                println!("  [{}] {}", f.kind.as_str(), f.path.display());
            }
            if let Some(zip) = archive {
                println!("Archive: {}", zip.display());
            }
        }
    }
    Ok(())
}
