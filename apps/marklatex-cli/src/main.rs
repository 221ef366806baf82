//! MarkLatex command-line front end
//!
//! Edits the marks sidecar of a PDF and exports marked copies.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "marklatex")]
#[command(version, about = "Overlay text marks on PDF pages and export them")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export a PDF with its marks baked in
    Export {
        pdf: PathBuf,
        /// Output path (default: <name>_marked.pdf next to the source)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Export every marked PDF under a folder into a grouped layout
    Batch { root: PathBuf },
    /// Print text wrapped the way a mark would be
    Wrap {
        text: String,
        #[arg(short, long, default_value_t = 30)]
        width: usize,
    },
    /// List the marks stored for a PDF
    List { pdf: PathBuf },
    /// Add a mark
    Add {
        pdf: PathBuf,
        /// Page number, starting at 1
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        page: u32,
        #[arg(long, allow_hyphen_values = true)]
        x: f64,
        #[arg(long, allow_hyphen_values = true)]
        y: f64,
        text: String,
        #[arg(long)]
        font: Option<String>,
        #[arg(long)]
        size: Option<u32>,
        #[arg(long)]
        width: Option<u32>,
    },
    /// Change the text or style of a mark
    Edit {
        pdf: PathBuf,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        page: u32,
        /// Position of the mark on the page, as shown by `list`
        #[arg(long)]
        index: usize,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        font: Option<String>,
        #[arg(long)]
        size: Option<u32>,
        #[arg(long)]
        width: Option<u32>,
    },
    /// Move a mark
    Move {
        pdf: PathBuf,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        page: u32,
        #[arg(long)]
        index: usize,
        #[arg(long, allow_hyphen_values = true)]
        x: f64,
        #[arg(long, allow_hyphen_values = true)]
        y: f64,
    },
    /// Delete a mark
    Delete {
        pdf: PathBuf,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        page: u32,
        #[arg(long)]
        index: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays clean on stdout
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Export { pdf, out } => commands::export(&config, &pdf, out),
        Command::Batch { root } => commands::batch(&config, &root),
        Command::Wrap { text, width } => {
            println!("{}", commands::wrap(&text, width));
            Ok(())
        }
        Command::List { pdf } => {
            print!("{}", commands::list(&config, &pdf));
            Ok(())
        }
        Command::Add {
            pdf,
            page,
            x,
            y,
            text,
            font,
            size,
            width,
        } => commands::add(
            &config,
            &pdf,
            page - 1,
            (x, y),
            text,
            commands::StyleOverrides { font, size, width },
        ),
        Command::Edit {
            pdf,
            page,
            index,
            text,
            font,
            size,
            width,
        } => commands::edit(
            &config,
            &pdf,
            page - 1,
            index,
            text,
            commands::StyleOverrides { font, size, width },
        ),
        Command::Move {
            pdf,
            page,
            index,
            x,
            y,
        } => commands::move_mark(&config, &pdf, page - 1, index, (x, y)),
        Command::Delete { pdf, page, index } => commands::delete(&config, &pdf, page - 1, index),
    }
}
