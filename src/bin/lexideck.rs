//! lexideck CLI: operator interface to the flashcard pipeline.

use clap::{Parser, Subcommand};
use lexideck::config::Config;
use lexideck::model::{WordEntry, WordState};
use lexideck::telemetry::{TelemetryConfig, init_telemetry};
use lexideck::workbench::Workbench;
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lexideck", about = "Turn vocabulary words into illustrated Anki flashcards")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add words (one per line) and generate their content
    Add {
        /// Words to add; read from --file or stdin when omitted
        words: Vec<String>,
        /// File with one word per line
        #[arg(long)]
        file: Option<PathBuf>,
        /// Only store the words, do not generate yet
        #[arg(long)]
        no_generate: bool,
    },
    /// List stored words
    List {
        /// Filter by status
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one word in full
    Show {
        /// Word ID (full UUID or prefix)
        id: String,
    },
    /// Generate content for every pending word
    Generate,
    /// Re-run generation for one word
    Regenerate {
        /// Word ID (full UUID or prefix)
        id: String,
    },
    /// Approve a generated word for export
    Approve {
        /// Word ID (full UUID or prefix)
        id: String,
    },
    /// Exclude a word from export
    Reject {
        /// Word ID (full UUID or prefix)
        id: String,
    },
    /// Delete one word
    Delete {
        /// Word ID (full UUID or prefix)
        id: String,
    },
    /// Delete all words, or all words with a given status
    Clear {
        #[arg(long)]
        status: Option<String>,
    },
    /// Show queue and Anki connectivity
    Status,
    /// Create Anki cards for every ready word
    Export,
    /// Ask Anki to sync with AnkiWeb
    Sync,
    /// Show the active prompt templates
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "lexideck".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let bench = Workbench::from_config(&config)?;

    match cli.command {
        Command::Add {
            words,
            file,
            no_generate,
        } => cmd_add(&bench, words, file, no_generate).await,
        Command::List { status } => cmd_list(&bench, status).await,
        Command::Show { id } => cmd_show(&bench, &id).await,
        Command::Generate => {
            let queued = bench.resume_pending().await?;
            println!("Generating {queued} word(s)...");
            bench.wait_idle().await;
            print_summary(&bench).await
        }
        Command::Regenerate { id } => {
            let id = bench.resolve(&id).await?;
            let status = bench.regenerate(id).await?;
            println!("Queued ({} pending, {} active)", status.pending, status.active);
            bench.wait_idle().await;
            cmd_show(&bench, &id.0.to_string()).await
        }
        Command::Approve { id } => {
            let entry = bench.approve(bench.resolve(&id).await?).await?;
            println!("Approved: {} ({})", entry.word, entry.id);
            Ok(())
        }
        Command::Reject { id } => {
            let entry = bench.reject(bench.resolve(&id).await?).await?;
            println!("Rejected: {} ({})", entry.word, entry.id);
            Ok(())
        }
        Command::Delete { id } => {
            let entry = bench.delete(bench.resolve(&id).await?).await?;
            println!("Deleted: {} ({})", entry.word, entry.id);
            Ok(())
        }
        Command::Clear { status } => {
            let removed = match status {
                Some(s) => bench.clear_by_status(parse_status(&s)?).await?,
                None => bench.clear_all().await?,
            };
            println!("Removed {removed} word(s)");
            Ok(())
        }
        Command::Status => cmd_status(&bench).await,
        Command::Export => cmd_export(&bench).await,
        Command::Sync => {
            bench.sync().await?;
            println!("Anki sync completed");
            Ok(())
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(bench.prompt_config())?);
            Ok(())
        }
    }
}

fn parse_status(s: &str) -> anyhow::Result<WordState> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("invalid status: {s}"))
}

async fn cmd_add(
    bench: &Workbench,
    words: Vec<String>,
    file: Option<PathBuf>,
    no_generate: bool,
) -> anyhow::Result<()> {
    let text = if !words.is_empty() {
        words.join("\n")
    } else if let Some(path) = file {
        std::fs::read_to_string(path)?
    } else {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    };

    // --no-generate leaves entries pending for a later `generate`.
    let added = if no_generate {
        bench.add_words(&text).await?
    } else {
        bench.submit_words(&text).await?
    };
    println!("Added {} word(s)", added.len());

    if !no_generate && !added.is_empty() {
        bench.wait_idle().await;
        print_summary(bench).await?;
    }
    Ok(())
}

async fn print_summary(bench: &Workbench) -> anyhow::Result<()> {
    let entries = bench.entries().await?;
    let count = |s: WordState| entries.iter().filter(|e| e.status == s).count();
    println!(
        "{} generated, {} failed, {} pending, {} approved, {} rejected",
        count(WordState::Generated),
        count(WordState::GenerationFailed),
        count(WordState::Pending),
        count(WordState::Approved),
        count(WordState::Rejected),
    );
    Ok(())
}

async fn cmd_list(bench: &Workbench, status: Option<String>) -> anyhow::Result<()> {
    let filter = status.as_deref().map(parse_status).transpose()?;
    let entries: Vec<WordEntry> = bench
        .entries()
        .await?
        .into_iter()
        .filter(|e| filter.is_none_or(|s| e.status == s))
        .collect();

    if entries.is_empty() {
        println!("No words found.");
        return Ok(());
    }

    println!(
        "{:<8}  {:<20}  {:<17}  {:<5}  ADDED",
        "ID", "WORD", "STATUS", "IMAGE"
    );
    println!("{}", "-".repeat(72));
    for entry in &entries {
        println!(
            "{:<8}  {:<20}  {:<17}  {:<5}  {}",
            entry.id,
            truncate(&entry.word, 20),
            entry.status,
            if entry.has_image() { "yes" } else { "-" },
            entry.added_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!("\n{} word(s)", entries.len());
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max - 1).chain(std::iter::once('…')).collect()
    }
}

async fn cmd_show(bench: &Workbench, id: &str) -> anyhow::Result<()> {
    let entry = bench.get(bench.resolve(id).await?).await?;

    println!("ID:          {}", entry.id.0);
    println!("Word:        {}", entry.word);
    println!("Status:      {}", entry.status);
    println!("Added:       {}", entry.added_at);
    println!("Definition:  {}", or_dash(&entry.definition));
    println!("Example:     {}", or_dash(&entry.example));
    println!("Image scene: {}", or_dash(&entry.image_prompt));
    let image = if entry.image_url.starts_with("data:") {
        format!("inline ({} bytes encoded)", entry.image_url.len())
    } else {
        or_dash(&entry.image_url).to_string()
    };
    println!("Image:       {image}");
    if let Some(ref err) = entry.image_error {
        println!("Image error: {err}");
    }
    Ok(())
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() { "-" } else { s }
}

async fn cmd_status(bench: &Workbench) -> anyhow::Result<()> {
    let queue = bench.queue_status();
    let anki = bench.flashcard_status().await;

    println!(
        "Queue:   {} pending, {} active, {} total",
        queue.pending, queue.active, queue.total
    );
    if anki.connected {
        println!(
            "Anki:    connected (AnkiConnect v{}), deck \"{}\"",
            anki.version.map(|v| v.to_string()).unwrap_or("?".to_string()),
            anki.deck_name
        );
    } else {
        println!("Anki:    not connected. {}", anki.message);
        if let Some(err) = anki.error {
            println!("Error:   {err}");
        }
    }
    Ok(())
}

async fn cmd_export(bench: &Workbench) -> anyhow::Result<()> {
    let report = bench.export().await?;

    for detail in &report.details {
        println!(
            "{:<20}  {:<7}  image: {}",
            truncate(&detail.word, 20),
            match detail.status {
                lexideck::export::ExportStatus::Success => "added",
                lexideck::export::ExportStatus::Failed => "FAILED",
            },
            if detail.has_image { "yes" } else { "no" }
        );
    }
    for err in &report.errors {
        eprintln!("{err}");
    }
    println!("{}", report.message);
    if report.failed > 0 {
        anyhow::bail!("{} of {} cards failed", report.failed, report.total);
    }
    Ok(())
}
