use std::cmp;
use std::error::Error;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use atty::Stream;
use clap::{Parser, Subcommand};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;
use wordlens_rs::{
    DefinitionTable, Dictionary, EngineConfig, LexiconBuilder, LookupFailure, LookupResult,
    LookupStatus, ProvisionState, builder,
};

#[derive(Parser, Debug)]
#[command(name = "wordlens-rs", about = "Look up words in an offline WordNet lexicon", version)]
pub struct Cli {
    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    /// JSON configuration file.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding the extracted database.
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Directory to search for the compressed artifact (repeatable).
    #[arg(long = "artifact-dir", global = true, value_name = "DIR")]
    artifact_dirs: Vec<PathBuf>,

    /// Database version to provision.
    #[arg(long, global = true, value_name = "VERSION")]
    db_version: Option<String>,

    /// Accent passed to the speech synthesizer (e.g. us, gb).
    #[arg(long, global = true)]
    accent: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show definitions, relations and pronunciation for each term.
    Lookup {
        #[arg(required = true)]
        terms: Vec<String>,
    },
    /// List lemmas with a spelling close to the term.
    Suggest {
        term: String,
        /// Maximum number of suggestions to return.
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Print a random lemma.
    Random,
    /// Locate and extract the database, reporting each step.
    Provision,
    /// Build a database from a JSONL synset dump.
    Pack {
        #[arg(long, value_name = "FILE")]
        input: PathBuf,
        #[arg(long, value_name = "DIR")]
        output: PathBuf,
        /// Write the uncompressed `lexicon.db` instead of the zstd artifact.
        #[arg(long)]
        raw: bool,
    },
}

impl Cli {
    fn engine_config(&self) -> Result<EngineConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)?,
            None => EngineConfig::default(),
        };
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if !self.artifact_dirs.is_empty() {
            config.artifact_dirs = self.artifact_dirs.clone();
        }
        if let Some(version) = &self.db_version {
            config.db_version = version.clone();
        }
        if let Some(accent) = &self.accent {
            config.pronunciation.accent = accent.clone();
        }
        Ok(config)
    }
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing();
    let config = cli.engine_config()?;

    if let Command::Pack { input, output, raw } = &cli.command {
        return handle_pack(&config.db_version, input, output, *raw, cli.json);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let (dictionary, results) = Dictionary::new(config, tokio::runtime::Handle::current());
        match cli.command {
            Command::Lookup { terms } => handle_lookup(&dictionary, results, terms, cli.json).await,
            Command::Suggest { term, limit } => {
                startup(&dictionary).await?;
                handle_suggest(&dictionary, &term, limit, cli.json)
            }
            Command::Random => {
                startup(&dictionary).await?;
                handle_random(&dictionary, cli.json)
            }
            Command::Provision => {
                let transitions = startup(&dictionary).await?;
                handle_provision(&dictionary, &transitions, cli.json)
            }
            Command::Pack { .. } => Ok(()),
        }
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn startup(dictionary: &Dictionary) -> Result<Vec<ProvisionState>, Box<dyn Error>> {
    Ok(dictionary.spawn_startup().await??)
}

async fn handle_lookup(
    dictionary: &Dictionary,
    mut results: UnboundedReceiver<LookupResult>,
    terms: Vec<String>,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    startup(dictionary).await?;

    let mut payload = Vec::new();
    for term in terms {
        let ticket = dictionary.submit(term.as_str());
        let status = tokio::select! {
            status = ticket.wait() => status,
            _ = tokio::signal::ctrl_c() => {
                dictionary.cancel_active();
                eprintln!("Lookup of {term:?} cancelled.");
                return Ok(());
            }
        };
        if status == LookupStatus::Cancelled {
            continue;
        }
        let Some(result) = results.recv().await else {
            break;
        };
        if as_json {
            payload.push(serde_json::to_value(&result)?);
        } else {
            print_result(dictionary, &result);
        }
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    }
    Ok(())
}

fn handle_suggest(
    dictionary: &Dictionary,
    term: &str,
    limit: usize,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let limit = cmp::max(1, limit);
    let suggestions = dictionary.suggest(term, limit);

    if as_json {
        let payload = json!({
            "term": term,
            "limit": limit,
            "results": suggestions,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if suggestions.is_empty() {
        println!("No lemmas resemble \"{term}\".");
        return Ok(());
    }
    let width = suggestions
        .iter()
        .map(|suggestion| suggestion.lemma.len())
        .max()
        .unwrap_or(4)
        .max("LEMMA".len());
    println!("Suggestions for \"{term}\":");
    println!("{:<width$}  {}", "LEMMA", "SCORE", width = width);
    println!("{:-<width$}  {}", "", "-----", width = width);
    for suggestion in &suggestions {
        println!(
            "{:<width$}  {:.2}",
            suggestion.lemma,
            suggestion.score,
            width = width
        );
    }
    Ok(())
}

fn handle_random(dictionary: &Dictionary, as_json: bool) -> Result<(), Box<dyn Error>> {
    let lemma = dictionary
        .random_lemma()
        .ok_or("The dictionary contains no lemmas")?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&json!({ "lemma": lemma }))?);
    } else {
        println!("{lemma}");
    }
    Ok(())
}

fn handle_provision(
    dictionary: &Dictionary,
    transitions: &[ProvisionState],
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    if as_json {
        let payload = json!({
            "version": dictionary.store().version(),
            "lemmas": dictionary.lemma_count(),
            "transitions": transitions,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    for state in transitions {
        match state {
            ProvisionState::Uninitialized => println!("- checking for an extracted database"),
            ProvisionState::Searching => println!("- searching for the compressed artifact"),
            ProvisionState::Extracting { artifact } => {
                println!("- extracting {}", artifact.display())
            }
            ProvisionState::Ready { database } => println!("- ready: {}", database.display()),
            ProvisionState::Failed { reason } => println!("- failed: {reason:?}"),
        }
    }
    println!(
        "Database {} with {} lemmas.",
        dictionary.store().version().unwrap_or_default(),
        dictionary.lemma_count()
    );
    Ok(())
}

fn handle_pack(
    version: &str,
    input: &Path,
    output: &Path,
    raw: bool,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let mut lexicon = LexiconBuilder::new(version);
    let synsets = lexicon.add_jsonl_file(input)?;
    let data = lexicon.finish()?;

    std::fs::create_dir_all(output)?;
    let path = if raw {
        let path = output.join("lexicon.db");
        builder::write_database(&data, &path)?;
        path
    } else {
        builder::write_artifact(&data, output)?
    };

    if as_json {
        let payload = json!({
            "version": version,
            "synsets": synsets,
            "path": path,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("Packed {synsets} synsets into {}", path.display());
    }
    Ok(())
}

fn print_result(dictionary: &Dictionary, result: &LookupResult) {
    match (&result.status, &result.definitions) {
        (LookupStatus::Success, Some(definitions)) => {
            render_markdown(&definitions_markdown(result, definitions));
        }
        (LookupStatus::Failure(LookupFailure::NoDefinitionFound), _) => {
            println!("{}: {}", result.term, LookupFailure::NoDefinitionFound.message());
            let suggestions = dictionary.suggest(&result.term, 5);
            if !suggestions.is_empty() {
                let lemmas: Vec<&str> = suggestions.iter().map(|s| s.lemma.as_str()).collect();
                println!("Did you mean: {}?", lemmas.join(", "));
            }
        }
        (LookupStatus::Failure(reason), _) => {
            println!("{:?}: {}", result.query, reason.message());
        }
        _ => {}
    }
}

fn definitions_markdown(result: &LookupResult, definitions: &DefinitionTable) -> String {
    let mut text = format!("# {}", result.term);
    if let Some(ipa) = &result.pronunciation {
        let _ = write!(text, "  `{ipa}`");
    }
    text.push('\n');

    for (pos, entries) in definitions.populated() {
        let _ = writeln!(text, "\n## {pos}\n");
        for (index, entry) in entries.iter().enumerate() {
            let _ = writeln!(text, "{}. **{}** {}", index + 1, entry.matched_lemma, entry.definition);
            for example in entry.examples.iter().take(3) {
                let _ = writeln!(text, "   * *\"{example}\"*");
            }
            for (label, words) in entry.relations.lists() {
                if let Some(list) = format_list(words, 6) {
                    let _ = writeln!(text, "   * {label}: {list}");
                }
            }
        }
    }
    text
}

fn format_list(items: &[String], limit: usize) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    let truncated = items.len() > limit;
    let display = if truncated { &items[..limit] } else { items };
    let mut text = display.join(", ");
    if truncated {
        text.push_str(", …");
    }
    Some(text)
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn render_markdown(body: &str) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return;
    }
    if stdout_is_tty() {
        let skin = MadSkin::default();
        let formatted = FmtText::from(&skin, trimmed, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{trimmed}\n");
    }
}
