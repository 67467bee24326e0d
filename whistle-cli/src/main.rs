//! Whistle CLI - rulebook assistant for referees
//!
//! # Commands
//!
//! ```bash
//! # Segment a document and show the fragments
//! whistle segment data/rules.txt
//! whistle segment --format flat --label Comment data/comments.txt
//!
//! # Create collections and load the rulebook (once)
//! whistle init
//! whistle fill --rules data/official_rules.pdf --comments data/comments.txt
//!
//! # Ask questions
//! whistle ask "When is a foul awarded?"
//! whistle chat
//!
//! # Everything in process, nothing persisted
//! whistle --memory chat
//! ```
//!
//! Settings come from `whistle.toml` and `WHISTLE_*` environment variables.
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use whistle_lib::{
    answer::{Orchestrator, FAILURE_NOTICE},
    config::Settings,
    embed::{Embedder, FastEmbedder},
    ingest::{self, FillOutcome},
    llm::OpenAiClient,
    segment::{FlatSegmenter, NumberedSegmenter, Segmenter},
    store::{ChromaBackend, FragmentStore, MemoryBackend, VectorBackend},
};

#[derive(Parser)]
#[command(name = "whistle")]
#[command(about = "Answer referee questions from the official rulebook")]
#[command(version)]
struct Cli {
    /// Path to the TOML settings file
    #[arg(short, long, global = true, env = "WHISTLE_CONFIG")]
    config: Option<PathBuf>,

    /// Keep the vector store in memory instead of using Chroma
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment a document and print its fragments
    Segment {
        /// Input file (.pdf or text)
        input: PathBuf,

        /// Document format
        #[arg(short, long, value_enum, default_value_t = Format::Numbered)]
        format: Format,

        /// Paragraph label for flat documents
        #[arg(long, default_value = "Comment")]
        label: String,
    },

    /// Embed text and show vector info
    Embed {
        /// Text to embed
        text: String,

        /// Treat as query (uses query prompt prefix)
        #[arg(short, long)]
        query: bool,
    },

    /// Create missing collections
    Init,

    /// Fill the rules collection if it is empty
    Fill {
        /// Rulebook to load (defaults to data.rules_path)
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Comments file to load (defaults to data.comments_path)
        #[arg(long)]
        comments: Option<PathBuf>,
    },

    /// Answer a single question
    Ask {
        /// The question
        question: String,

        /// Override the number of fragments retrieved
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Answer questions read line by line from stdin
    Chat,

    /// Show document counts per collection
    Stats,

    /// Delete every record in a collection
    Clear {
        /// Collection to clear (defaults to the rules collection)
        collection: Option<String>,
    },

    /// Check that the vector store is reachable
    Health,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    /// Numbered rulebook paragraphs (1., 1.1., ...)
    Numbered,
    /// Heading + statements blocks separated by blank lines
    Flat,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;

    // constructing the embedder and backends is cheap; nothing connects yet
    let embedder = FastEmbedder::new(&settings.embedding)?;
    if cli.memory {
        let store = FragmentStore::from_settings(embedder, MemoryBackend::new(), &settings);
        // an in-memory store starts empty every run
        if matches!(cli.command, Commands::Ask { .. } | Commands::Chat) {
            fill(&store, &settings, None, None)?;
        }
        run(cli.command, store, &settings)
    } else {
        let backend = ChromaBackend::new(&settings.chroma)?;
        let store = FragmentStore::from_settings(embedder, backend, &settings);
        run(cli.command, store, &settings)
    }
}

fn run<E: Embedder, B: VectorBackend>(
    command: Commands,
    store: FragmentStore<E, B>,
    settings: &Settings,
) -> Result<()> {
    match command {
        Commands::Segment {
            input,
            format,
            label,
        } => segment(&input, format, &label)?,

        Commands::Embed { text, query } => embed(store.embedder(), &text, query)?,

        Commands::Init => {
            println!("{}", store.healthcheck()?);
            let created = store.ensure_collections()?;
            if created.is_empty() {
                println!("All collections already exist");
            } else {
                println!("Created collections: {}", created.join(", "));
            }
        }

        Commands::Fill { rules, comments } => {
            fill(&store, settings, rules, comments)?;
        }

        Commands::Ask { question, k } => {
            store.ensure_collections()?;
            let orchestrator = orchestrator(store, settings, k)?;
            // the error is logged by the orchestrator; only the notice is shown
            let reply = orchestrator
                .handle_question(&question)
                .map_err(|_| anyhow!(FAILURE_NOTICE))?;
            println!("{reply}");
        }

        Commands::Chat => {
            store.ensure_collections()?;
            let orchestrator = orchestrator(store, settings, None)?;
            chat(&orchestrator)?;
        }

        Commands::Stats => {
            store.ensure_collections()?;
            for (collection, count) in store.stats()? {
                println!("{collection}: {count}");
            }
        }

        Commands::Clear { collection } => {
            store.ensure_collections()?;
            let collection = collection.unwrap_or_else(|| store.rules_collection().to_string());
            let removed = store.clear(&collection)?;
            println!("Removed {removed} records from '{collection}'");
        }

        Commands::Health => {
            println!("{}", store.healthcheck()?);
        }
    }

    Ok(())
}

fn segment(input: &Path, format: Format, label: &str) -> Result<()> {
    let text = ingest::load_document(input)?;
    let fragments = match format {
        Format::Numbered => NumberedSegmenter.segment(&text),
        Format::Flat => FlatSegmenter::new(label).segment(&text),
    };

    println!("Segmented '{}' into {} fragments:\n", input.display(), fragments.len());
    for fragment in &fragments {
        println!("--- {} [{}] ---", fragment.paragraph, fragment.full_path());
        let preview: String = fragment.content.chars().take(200).collect();
        let ellipsis = if fragment.content.chars().count() > 200 { "..." } else { "" };
        println!("{preview}{ellipsis}\n");
    }
    Ok(())
}

fn embed(embedder: &impl Embedder, text: &str, query: bool) -> Result<()> {
    println!("Loading {} (first run downloads the model)...", embedder.model_name());

    let embedding = if query {
        println!("Embedding as query: {text}");
        embedder.embed_query(text)?
    } else {
        println!("Embedding as document: {text}");
        embedder
            .embed_documents(&[text])?
            .into_iter()
            .next()
            .context("embedder returned no vectors")?
    };

    println!("\nEmbedding stats:");
    println!("  Dimensions: {}", embedding.len());
    println!("  First 5 values: {:?}", &embedding[..embedding.len().min(5)]);
    println!("  Min: {:.4}", embedding.iter().cloned().fold(f32::INFINITY, f32::min));
    println!("  Max: {:.4}", embedding.iter().cloned().fold(f32::NEG_INFINITY, f32::max));
    Ok(())
}

fn fill<E: Embedder, B: VectorBackend>(
    store: &FragmentStore<E, B>,
    settings: &Settings,
    rules: Option<PathBuf>,
    comments: Option<PathBuf>,
) -> Result<()> {
    let rules = rules.unwrap_or_else(|| settings.data.rules_path.clone());
    let comments = comments.unwrap_or_else(|| settings.data.comments_path.clone());

    match ingest::fill_collection(store, &rules, &comments, &settings.data.comment_label)? {
        FillOutcome::Filled { fragments } => println!("Loaded {fragments} fragments"),
        FillOutcome::AlreadyPopulated { count } => {
            println!("Collection already holds {count} documents, nothing to do")
        }
    }
    Ok(())
}

fn orchestrator<E: Embedder, B: VectorBackend>(
    store: FragmentStore<E, B>,
    settings: &Settings,
    k: Option<usize>,
) -> Result<Orchestrator<FragmentStore<E, B>, OpenAiClient>> {
    let llm = OpenAiClient::new(&settings.llm)?;
    let mut orchestrator = Orchestrator::from_settings(store, llm, settings);
    if let Some(k) = k {
        orchestrator = orchestrator.with_top_k(k.max(1));
    }
    Ok(orchestrator)
}

fn chat<E: Embedder, B: VectorBackend>(
    orchestrator: &Orchestrator<FragmentStore<E, B>, OpenAiClient>,
) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    println!("Ask a question about the rules (Ctrl-D to quit).");
    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }

        println!("{}\n", orchestrator.reply(question));
    }
    Ok(())
}
