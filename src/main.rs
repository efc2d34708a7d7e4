use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use pdfchat::chat::{
    AzureChatProvider, CURSOR, ChatEngine, RenderEvent, RenderSink, Role, Session, Transcript,
    VectorIndex,
};
use pdfchat::config::{AzureCredentials, Config, DEFAULT_CONFIG_PATH};
use pdfchat::db::Db;
use pdfchat::embedder::Embedder;
use pdfchat::embedder::azure::AzureEmbedder;
use pdfchat::indexer::{IndexReport, Indexer, TextSplitter, document_key};

#[derive(Parser)]
#[command(name = "pdfchat", version, about = "Chat with a PDF from the terminal")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: String,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index a PDF, then ask questions interactively
    Chat { pdf: PathBuf },
    /// Index a PDF and answer a single question
    Ask { pdf: PathBuf, question: String },
    /// Index a PDF and print what was stored
    Index {
        pdf: PathBuf,
        /// Re-embed even if the stored copy is current
        #[arg(long)]
        force: bool,
    },
    /// Remove a PDF from the persistent index (`db_path`)
    Forget { pdf: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // 1. Environment and config
    if let Ok(path) = dotenvy::dotenv() {
        debug!(path = %path.display(), "loaded .env");
    }
    let config = Config::load(&cli.config)?;
    config.validate()?;

    match cli.command {
        Command::Chat { pdf } => {
            let (session, engine) = open_session(&config, &pdf).await?;
            run_repl(session, engine).await
        }
        Command::Ask { pdf, question } => {
            let (mut session, engine) = open_session(&config, &pdf).await?;
            let mut sink = TerminalSink::new(std::io::stdout());
            engine.handle_turn(&mut session, &question, &mut sink).await?;
            Ok(())
        }
        Command::Index { pdf, force } => {
            let (_, _, report) = build_index(&config, &pdf, force).await?;
            print_report(&pdf, &report);
            Ok(())
        }
        Command::Forget { pdf } => forget(&config, &pdf),
    }
}

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,pdfchat={default_level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn build_index(
    config: &Config,
    pdf: &Path,
    force: bool,
) -> Result<(Arc<TokioMutex<Db>>, Arc<dyn Embedder>, IndexReport)> {
    // 2. Embedder
    let credentials = AzureCredentials::embeddings_from_env()?;
    let embedder: Arc<dyn Embedder> = Arc::new(AzureEmbedder::new(
        credentials,
        &config.embedding.deployment,
        config.embedding.dimensions,
        config.chat.request_timeout(),
    )?);

    // 3. Vector store
    let dimensions = embedder.dimensions();
    let db = match &config.db_path {
        Some(path) => Db::open(path, dimensions),
        None => Db::open_in_memory(dimensions),
    }
    .context("Failed to open vector store")?;
    let db = Arc::new(TokioMutex::new(db));

    // 4. Index the document
    let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap);
    let mut indexer = Indexer::new(
        db.clone(),
        embedder.as_ref(),
        splitter,
        config.embedding.batch_size,
    )
    .with_progress(true);
    let report = indexer.index_pdf(pdf, force).await?;

    Ok((db, embedder, report))
}

fn forget(config: &Config, pdf: &Path) -> Result<()> {
    let Some(db_path) = &config.db_path else {
        anyhow::bail!("no db_path configured; the in-memory index is never kept");
    };
    let db = Db::open(db_path, config.embedding.dimensions).context("Failed to open vector store")?;
    if db.delete_document(&document_key(pdf))? {
        eprintln!("{}: removed from {db_path}", pdf.display());
    } else {
        eprintln!("{}: not in {db_path}", pdf.display());
    }
    Ok(())
}

async fn open_session(config: &Config, pdf: &Path) -> Result<(Session, ChatEngine)> {
    let (db, embedder, report) = build_index(config, pdf, false).await?;
    print_report(pdf, &report);

    // 5. Chat model
    let provider = AzureChatProvider::new(AzureCredentials::chat_from_env()?, &config.chat)?;
    let engine = ChatEngine::new(Arc::new(provider), config.chat.deployment.clone())
        .with_top_k(config.search_top_k);

    let index = VectorIndex::new(db, embedder, pdf);
    let session = Session::with_index(pdf, Arc::new(index));
    if let Some(document) = session.document() {
        info!(document = %document.display(), model = engine.model(), "session ready");
    }
    Ok((session, engine))
}

fn print_report(pdf: &Path, report: &IndexReport) {
    if report.skipped {
        eprintln!("{}: unchanged, using the stored index", pdf.display());
    } else {
        eprintln!(
            "{}: {} pages, {} chunks indexed",
            pdf.display(),
            report.pages,
            report.chunks
        );
    }
}

async fn run_repl(mut session: Session, engine: ChatEngine) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sink = TerminalSink::new(std::io::stdout());

    println!("Ask a question about the document. /history shows the conversation, /quit leaves.");
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/history" => {
                print_history(session.transcript());
                continue;
            }
            _ => {}
        }

        // The failure is already part of the rendered answer
        if let Err(e) = engine.handle_turn(&mut session, &line, &mut sink).await {
            debug!(error = %e, "turn failed");
        }
    }
    Ok(())
}

fn print_history(transcript: &Transcript) {
    if transcript.is_empty() {
        println!("(no messages yet)");
        return;
    }
    for turn in transcript.turns() {
        println!(
            "[{}] {}: {}",
            turn.created_at.format("%H:%M:%S"),
            turn.role,
            turn.content
        );
    }
}

/// Renders a streaming answer in place on a terminal.
///
/// Partial renders only print the newly flushed suffix, with the cursor
/// glyph kept at the end; the glyph is erased with a backspace before the
/// next write.
struct TerminalSink<W: Write> {
    out: W,
    printed: usize,
    cursor_shown: bool,
    spinner: Option<ProgressBar>,
}

impl<W: Write> TerminalSink<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            printed: 0,
            cursor_shown: false,
            spinner: None,
        }
    }

    fn stop_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    fn write_delta(&mut self, text: &str) {
        if self.cursor_shown {
            let _ = self.out.write_all(b"\x08 \x08");
            self.cursor_shown = false;
        }
        match text.get(self.printed..) {
            Some(delta) => {
                let _ = self.out.write_all(delta.as_bytes());
            }
            None => {
                let _ = write!(self.out, "\n{text}");
            }
        }
        self.printed = text.len();
    }
}

impl<W: Write> RenderSink for TerminalSink<W> {
    fn on_event(&mut self, event: RenderEvent) {
        match event {
            // The user's line is already on screen
            RenderEvent::Message(turn) if turn.role == Role::User => {}
            RenderEvent::Message(turn) => {
                let _ = writeln!(self.out, "{}", turn.content);
            }
            RenderEvent::Searching => {
                self.stop_spinner();
                let spinner = ProgressBar::new_spinner();
                if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
                    spinner.set_style(style);
                }
                spinner.set_message("Searching context...");
                spinner.enable_steady_tick(Duration::from_millis(100));
                self.spinner = Some(spinner);
            }
            RenderEvent::Partial(text) => {
                self.stop_spinner();
                let body = text.strip_suffix(CURSOR).unwrap_or(&text);
                self.write_delta(body);
                let _ = self.out.write_all(CURSOR.as_bytes());
                self.cursor_shown = true;
            }
            RenderEvent::Final(text) => {
                self.stop_spinner();
                self.write_delta(&text);
                let _ = writeln!(self.out);
                self.printed = 0;
            }
        }
        let _ = self.out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(events: Vec<RenderEvent>) -> String {
        let mut sink = TerminalSink::new(Vec::new());
        for event in events {
            sink.on_event(event);
        }
        String::from_utf8(sink.out).unwrap()
    }

    #[test]
    fn test_terminal_sink_prints_suffixes() {
        let out = rendered(vec![
            RenderEvent::Searching,
            RenderEvent::Partial(format!("Hello {CURSOR}")),
            RenderEvent::Partial(format!("Hello big {CURSOR}")),
            RenderEvent::Final("Hello big world".into()),
        ]);
        assert_eq!(out, "Hello ▌\x08 \x08big ▌\x08 \x08world\n");
    }

    #[test]
    fn test_terminal_sink_resets_between_answers() {
        let out = rendered(vec![
            RenderEvent::Final("first".into()),
            RenderEvent::Final("second".into()),
        ]);
        assert_eq!(out, "first\nsecond\n");
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["pdfchat", "-vv", "index", "report.pdf", "--force"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, DEFAULT_CONFIG_PATH);
        assert!(matches!(cli.command, Command::Index { force: true, .. }));

        let cli = Cli::try_parse_from(["pdfchat", "forget", "old.pdf"]).unwrap();
        assert!(matches!(cli.command, Command::Forget { .. }));

        let cli = Cli::try_parse_from(["pdfchat", "ask", "report.pdf", "What is on page 2?"]).unwrap();
        match cli.command {
            Command::Ask { question, .. } => assert_eq!(question, "What is on page 2?"),
            _ => panic!("expected ask"),
        }
    }
}
