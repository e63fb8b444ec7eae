#![forbid(unsafe_code)]

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use mdsync_core::{
    EditorConfig, EditorSession, FsPersistence, HtmlConverter, MarkupConverter, NoPicker,
    RecentFiles, compute_stats, extract_headings,
};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "mdsync", about = "Headless front end for the mdsync editor engine", version)]
struct Cli {
    /// Log engine activity at debug level (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print line, word and character counts.
    Stats {
        /// Path to a markdown file. Use `-` to read from stdin.
        path: PathBuf,
    },
    /// Render markdown to the HTML shown by the rich editor.
    Render { path: PathBuf },
    /// Convert markdown to HTML and back, printing the markdown the rich
    /// editor would commit.
    Roundtrip { path: PathBuf },
    /// List headings with their anchor ids.
    Outline { path: PathBuf },
    /// List recently opened files, most recent first.
    Recent,
    /// Append a line to a markdown file through an editor session.
    Append { path: PathBuf, text: String },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn read_source(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        use std::io::Read as _;

        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read markdown from stdin")?;
        return Ok(buf);
    }
    fs::read_to_string(path)
        .with_context(|| format!("failed to read markdown from {}", path.display()))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EditorConfig> {
    match path {
        Some(path) => EditorConfig::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => EditorConfig::load().context("failed to load config"),
    }
}

fn recent_files(config: &EditorConfig) -> Option<RecentFiles> {
    RecentFiles::default_location().map(|store| RecentFiles::new(store, config.recent.limit))
}

async fn append(config: EditorConfig, path: PathBuf, text: String) -> anyhow::Result<()> {
    let mut persistence = FsPersistence::new(NoPicker);
    if let Some(recent) = recent_files(&config) {
        persistence = persistence.with_recent(recent);
    }
    let session = EditorSession::new(Arc::new(persistence), config);

    if !session.open_path(&path).await {
        bail!(session.last_error().unwrap_or_else(|| "open failed".to_owned()));
    }

    let mut content = session.store().content();
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(&text);
    content.push('\n');
    session.store().set_content(content);

    if !session.save().await {
        bail!(session.last_error().unwrap_or_else(|| "save failed".to_owned()));
    }
    debug!(path = %path.display(), "appended text");
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Stats { path } => {
            let stats = compute_stats(&read_source(&path)?);
            println!("lines: {}", stats.line_count);
            println!("words: {}", stats.word_count);
            println!("characters: {}", stats.character_count);
        }
        Command::Render { path } => {
            print!("{}", HtmlConverter::new().to_markup(&read_source(&path)?));
        }
        Command::Roundtrip { path } => {
            let converter = HtmlConverter::new();
            let markup = converter.to_markup(&read_source(&path)?);
            println!("{}", converter.to_markdown(&markup));
        }
        Command::Outline { path } => {
            for heading in extract_headings(&read_source(&path)?) {
                let indent = "  ".repeat(usize::from(heading.level.saturating_sub(1)));
                println!("{indent}- {} (#{})", heading.text, heading.id);
            }
        }
        Command::Recent => {
            let config = load_config(cli.config.as_deref())?;
            let Some(recent) = recent_files(&config) else {
                bail!("could not determine config directory");
            };
            for path in recent.load().context("failed to read recent files")? {
                println!("{}", path.display());
            }
        }
        Command::Append { path, text } => {
            let config = load_config(cli.config.as_deref())?;
            append(config, path, text).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["mdsync", "outline", "notes.md", "--verbose"]);
        assert!(cli.is_ok());
        let Ok(cli) = cli else { return };
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Outline { path } if path == PathBuf::from("notes.md")));
    }

    #[test]
    fn append_requires_text() {
        assert!(Cli::try_parse_from(["mdsync", "append", "notes.md"]).is_err());
    }

    #[test]
    fn reads_source_from_file() {
        let Ok(dir) = tempfile::tempdir() else { return };
        let path = dir.path().join("a.md");
        fs::write(&path, "# Title\n").ok();
        assert_eq!(read_source(&path).ok().as_deref(), Some("# Title\n"));
    }
}
