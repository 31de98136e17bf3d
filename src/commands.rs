use anyhow::{Context, Result, bail};
use console::style;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::chat::{
    AssistantReply, ChatSession, NO_CASES_FOUND, Retriever, TranscriptEntry, TurnError,
};
use crate::config::{Config, EmbeddingBackend};
use crate::database::{Database, SimilaritySearch, VectorStore};
use crate::embeddings::{OllamaClient, build_embedder};
use crate::ingest::{DocumentLoader, IngestOptions, IngestionReport, Ingestor};
use crate::llm::GroqClient;

/// One line typed at the chat prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Question(String),
    NewChat,
    History,
    ToggleSources,
    Help,
    Exit,
    Blank,
    Unknown(String),
}

impl ChatInput {
    #[inline]
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Blank;
        }
        if !line.starts_with('/') {
            return Self::Question(line.to_string());
        }

        match line.to_ascii_lowercase().as_str() {
            "/new" => Self::NewChat,
            "/history" => Self::History,
            "/sources" => Self::ToggleSources,
            "/help" => Self::Help,
            "/exit" | "/quit" => Self::Exit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

/// Run the ingestion pipeline over `directory` and print the report
#[inline]
pub async fn ingest_documents(
    config_dir: &Path,
    directory: &Path,
    pattern: &str,
    options: IngestOptions,
) -> Result<IngestionReport> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    let loader = DocumentLoader::new(directory, pattern)?;
    let embedder = build_embedder(&config)?;
    let store = VectorStore::new(&config)
        .await
        .context("Failed to open vector store")?;
    let manifest = Database::initialize_from_config_dir(config.get_base_dir())
        .await
        .context("Failed to open ingestion manifest")?;

    println!(
        "{} {} matching {}",
        style("📥 Ingesting").bold().cyan(),
        style(directory.display()).cyan(),
        style(pattern).cyan()
    );
    if options.reset {
        println!("   Existing records will be cleared first");
    }

    let mut ingestor = Ingestor::new(embedder, store, manifest, config.chunking.clone());
    let report = ingestor.run(&loader, options).await?;
    let total_records = ingestor.store().count_records().await?;

    print_ingestion_report(&report, total_records);
    Ok(report)
}

fn print_ingestion_report(report: &IngestionReport, total_records: usize) {
    println!();
    println!("{}", style("Ingestion complete").bold().green());
    println!("  Documents seen: {}", report.documents_seen());
    println!("  Ingested: {}", style(report.documents_ingested).green());
    println!("  Unchanged: {}", report.documents_unchanged);
    println!("  Chunks written: {}", report.chunks_written);
    println!("  Records in store: {}", total_records);

    if !report.skipped.is_empty() {
        println!("  Skipped: {}", style(report.skipped.len()).yellow());
        for skipped in &report.skipped {
            println!("    {} {}", style("⚠").yellow(), skipped);
        }
    }
}

/// Wire up one chat session from the configuration.
///
/// Fails before any network call when no API key is configured.
#[inline]
pub async fn build_session(config: &Config) -> Result<ChatSession> {
    let model = GroqClient::new(&config.llm).context("Cannot start the chat")?;
    let embedder = build_embedder(config)?;
    let store = VectorStore::new(config)
        .await
        .context("Failed to open vector store")?;

    if !store.table_exists().await? {
        warn!("Vector store is empty; answers will not cite any cases");
        eprintln!(
            "{}",
            style("No cases have been ingested yet. Run 'legal-rag ingest' first.").yellow()
        );
    }

    let store: Arc<dyn SimilaritySearch> = Arc::new(store);
    let retriever = Retriever::new(embedder, store, config.retrieval.top_k);

    info!("Chat session ready with model {}", config.llm.model);
    Ok(ChatSession::new(
        Arc::new(retriever),
        Arc::new(model),
        &config.retrieval,
    ))
}

/// Interactive terminal chat
#[inline]
pub async fn run_chat(config_dir: &Path, show_sources: bool) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    let mut session = build_session(&config).await?;
    let mut show_sources = show_sources;

    println!("{}", style("⚖️  Legal Assistant").bold().cyan());
    println!("Ask about a legal case. Type /help for commands.");
    println!();

    let attended = console::user_attended();

    while let Some(line) = read_chat_line(attended)? {
        match ChatInput::parse(&line) {
            ChatInput::Blank => {}
            ChatInput::Exit => break,
            ChatInput::Help => print_help(),
            ChatInput::NewChat => {
                session.new_chat();
                println!("{}", style("Started a new chat.").dim());
            }
            ChatInput::History => print_transcript(session.transcript(), show_sources),
            ChatInput::ToggleSources => {
                show_sources = !show_sources;
                println!(
                    "{}",
                    style(format!(
                        "Sources are now {}.",
                        if show_sources { "shown" } else { "hidden" }
                    ))
                    .dim()
                );
            }
            ChatInput::Unknown(command) => {
                println!("{} {}", style("Unknown command:").yellow(), command);
            }
            ChatInput::Question(question) => {
                let spinner = generating_spinner();
                let outcome = session.submit(&question).await;
                spinner.finish_and_clear();

                match outcome {
                    Ok(reply) => print_reply(&reply, show_sources),
                    Err(TurnError::Remote(e)) => {
                        println!("{} {}", style("Error:").red().bold(), e);
                    }
                    Err(TurnError::Fatal(e)) => {
                        error!("Ending chat: {}", e);
                        bail!("The language model rejected the request: {}", e);
                    }
                }
            }
        }
    }

    println!("Goodbye.");
    Ok(())
}

/// Answer a single question through a fresh session
#[inline]
pub async fn ask_once(config_dir: &Path, question: &str, show_sources: bool) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    let mut session = build_session(&config).await?;

    let spinner = generating_spinner();
    let outcome = session.submit(question).await;
    spinner.finish_and_clear();

    let reply = outcome.context("Failed to answer the question")?;
    print_reply(&reply, show_sources);
    Ok(())
}

/// Show configuration, store and service status
#[inline]
pub async fn show_status(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    println!("{}", style("📊 Legal Assistant Status").bold().cyan());
    println!();
    println!("Config file: {}", config.config_file_path().display());

    println!();
    println!("{}", style("Case Database:").bold().yellow());
    match VectorStore::new(&config).await {
        Ok(store) => match store.count_records().await {
            Ok(count) => {
                println!("  Vector records: {}", count);
                if let Some(dimension) = store.dimension() {
                    println!("  Vector dimension: {}", dimension);
                }
            }
            Err(e) => println!("  ❌ Failed to count records: {}", e),
        },
        Err(e) => println!("  ❌ Failed to open vector store: {}", e),
    }

    match Database::initialize_from_config_dir(config.get_base_dir()).await {
        Ok(manifest) => match manifest.list_documents().await {
            Ok(documents) => {
                println!("  Ingested documents: {}", documents.len());
                for document in &documents {
                    println!(
                        "    📄 {} ({} chunks, {})",
                        document.source,
                        document.chunk_count,
                        document.ingested_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
            Err(e) => println!("  ❌ Failed to read manifest: {}", e),
        },
        Err(e) => println!("  ❌ Failed to open manifest: {}", e),
    }

    println!();
    println!("{}", style("Embedding Service:").bold().yellow());
    match config.embedding.backend {
        EmbeddingBackend::Ollama => {
            let health = OllamaClient::new(&config).and_then(|client| client.health_check());
            match health {
                Ok(()) => println!(
                    "  ✅ Ollama healthy ({}:{}, model {})",
                    config.ollama.host, config.ollama.port, config.ollama.model
                ),
                Err(e) => println!("  ❌ Ollama unavailable: {}", e),
            }
        }
        EmbeddingBackend::Ngram => println!(
            "  ✅ Built-in n-gram embedder ({} dimensions)",
            config.embedding.ngram_dimension
        ),
    }

    println!();
    println!("{}", style("Language Model:").bold().yellow());
    println!("  Model: {}", config.llm.model);
    match config.llm.masked_api_key() {
        Some(masked) => println!("  ✅ API key configured ({})", masked),
        None => println!("  ❌ No API key configured"),
    }

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'legal-rag ingest <dir>' to add case files");
    println!("   • Use 'legal-rag chat' to start a conversation");

    Ok(())
}

/// Next line of user input, or `None` once input is closed
fn read_chat_line(attended: bool) -> Result<Option<String>> {
    if attended {
        return match Input::<String>::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()
        {
            Ok(line) => Ok(Some(line)),
            Err(e) => {
                info!("Input closed: {}", e);
                Ok(None)
            }
        };
    }

    let mut line = String::new();
    let read = std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok((read > 0).then_some(line))
}

fn generating_spinner() -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }

    let spinner = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner} {msg}").expect("style template is valid"),
    );
    spinner.set_message("Consulting the case database...");
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

fn print_help() {
    println!("{}", style("Commands:").bold());
    println!("  /new      start a new chat and forget the conversation");
    println!("  /history  show the conversation so far");
    println!("  /sources  toggle display of retrieved cases");
    println!("  /help     show this help");
    println!("  /exit     leave (also /quit)");
}

fn print_reply(reply: &AssistantReply, show_sources: bool) {
    println!();
    if let Some(notice) = retrieval_notice(reply) {
        println!("{}", style(notice).yellow());
    }
    println!("{} {}", style("Assistant:").bold().green(), reply.answer);
    if show_sources {
        print_sources(reply);
    }
    println!();
}

/// Shown regardless of `/sources` when the case database could not be searched
fn retrieval_notice(reply: &AssistantReply) -> Option<String> {
    reply
        .retrieval_error
        .as_ref()
        .map(|reason| format!("{NO_CASES_FOUND} ({reason})"))
}

fn print_sources(reply: &AssistantReply) {
    if reply.sources.is_empty() {
        println!("{}", style("  (no cases retrieved)").dim());
        return;
    }

    println!("{}", style("  Sources:").dim());
    for (i, case) in reply.sources.iter().enumerate() {
        println!(
            "{}",
            style(format!(
                "  [{}] {} (chunk {}, score {:.3})",
                i + 1,
                case.source,
                case.chunk_index,
                case.score
            ))
            .dim()
        );
    }
}

fn print_transcript(transcript: &[TranscriptEntry], show_sources: bool) {
    if transcript.is_empty() {
        println!("{}", style("No messages yet.").dim());
        return;
    }

    for entry in transcript {
        match entry {
            TranscriptEntry::User(question) => {
                println!("{} {}", style("You:").bold().cyan(), question);
            }
            TranscriptEntry::Assistant(reply) => print_reply(reply, show_sources),
            TranscriptEntry::Error(message) => {
                println!("{} {}", style("Error:").red().bold(), message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn slash_commands_are_recognised() {
        assert_eq!(ChatInput::parse("/new"), ChatInput::NewChat);
        assert_eq!(ChatInput::parse("/history"), ChatInput::History);
        assert_eq!(ChatInput::parse(" /Sources "), ChatInput::ToggleSources);
        assert_eq!(ChatInput::parse("/help"), ChatInput::Help);
        assert_eq!(ChatInput::parse("/exit"), ChatInput::Exit);
        assert_eq!(ChatInput::parse("/quit"), ChatInput::Exit);
    }

    #[test]
    fn failed_retrieval_is_announced_in_the_reply() {
        let mut reply = AssistantReply {
            answer: "General guidance.".to_string(),
            sources: Vec::new(),
            retrieval_error: Some("Database error: connection refused".to_string()),
        };
        assert_eq!(
            retrieval_notice(&reply).as_deref(),
            Some(
                "No relevant cases found in the case database. (Database error: connection refused)"
            )
        );

        reply.retrieval_error = None;
        assert_eq!(retrieval_notice(&reply), None);
    }

    #[test]
    fn other_input_is_a_question_or_unknown() {
        assert_eq!(ChatInput::parse("   "), ChatInput::Blank);
        assert_eq!(
            ChatInput::parse("  Is a verbal contract binding?  "),
            ChatInput::Question("Is a verbal contract binding?".to_string())
        );
        assert_eq!(
            ChatInput::parse("/delete"),
            ChatInput::Unknown("/delete".to_string())
        );
    }

    #[tokio::test]
    #[serial]
    async fn session_requires_an_api_key() {
        // SAFETY: serialized with the other tests that touch the process environment
        unsafe { std::env::remove_var(crate::config::API_KEY_ENV_VAR) };

        let temp_dir = tempfile::TempDir::new().expect("temp dir");
        let mut config = Config::with_base_dir(temp_dir.path());
        config.llm.api_key = Some("  ".to_string());

        let error = build_session(&config)
            .await
            .err()
            .expect("session creation fails");
        assert!(format!("{:#}", error).contains("API key"));
    }
}
