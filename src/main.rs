use anyhow::Result;
use clap::{Parser, Subcommand};
use legal_rag::commands::{ask_once, ingest_documents, run_chat, show_status};
use legal_rag::config::{get_config_dir, run_interactive_config, show_config};
use legal_rag::ingest::IngestOptions;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "legal-rag")]
#[command(about = "A legal case assistant that answers questions from an ingested case database")]
#[command(version)]
struct Cli {
    /// Base directory for configuration and data (default: ~/.legal-rag)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the language model and embedding service
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Load case files from a directory into the vector store
    Ingest {
        /// Directory containing the case files
        #[arg(default_value = "data")]
        dir: PathBuf,
        /// Glob matched against file names
        #[arg(long, default_value = "*.pdf")]
        pattern: String,
        /// Re-ingest files even if they have not changed
        #[arg(long)]
        force: bool,
        /// Clear all stored records before ingesting
        #[arg(long)]
        reset: bool,
    },
    /// Start an interactive chat
    Chat {
        /// Show the retrieved cases under each answer
        #[arg(long)]
        sources: bool,
    },
    /// Ask a single question and print the answer
    Ask {
        question: String,
        /// Show the retrieved cases under the answer
        #[arg(long)]
        sources: bool,
    },
    /// Show configuration, store and service status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = get_config_dir(cli.config_dir.as_deref())?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Ingest {
            dir,
            pattern,
            force,
            reset,
        } => {
            ingest_documents(&config_dir, &dir, &pattern, IngestOptions { force, reset }).await?;
        }
        Commands::Chat { sources } => {
            run_chat(&config_dir, sources).await?;
        }
        Commands::Ask { question, sources } => {
            ask_once(&config_dir, &question, sources).await?;
        }
        Commands::Status => {
            show_status(&config_dir).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn ingest_defaults() {
        let cli = Cli::try_parse_from(["legal-rag", "ingest"]).expect("parses");

        let Commands::Ingest {
            dir,
            pattern,
            force,
            reset,
        } = cli.command
        else {
            panic!("expected ingest command");
        };
        assert_eq!(dir, PathBuf::from("data"));
        assert_eq!(pattern, "*.pdf");
        assert!(!force);
        assert!(!reset);
        assert!(cli.config_dir.is_none());
    }

    #[test]
    fn ingest_with_options() {
        let cli = Cli::try_parse_from([
            "legal-rag",
            "ingest",
            "cases",
            "--pattern",
            "*.txt",
            "--force",
            "--reset",
        ])
        .expect("parses");

        let Commands::Ingest {
            dir,
            pattern,
            force,
            reset,
        } = cli.command
        else {
            panic!("expected ingest command");
        };
        assert_eq!(dir, PathBuf::from("cases"));
        assert_eq!(pattern, "*.txt");
        assert!(force);
        assert!(reset);
    }

    #[test]
    fn config_dir_is_global() {
        let cli = Cli::try_parse_from(["legal-rag", "status", "--config-dir", "/tmp/legal"])
            .expect("parses");

        assert!(matches!(cli.command, Commands::Status));
        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/legal")));
    }

    #[test]
    fn chat_sources_flag() {
        let cli = Cli::try_parse_from(["legal-rag", "chat", "--sources"]).expect("parses");

        assert!(matches!(cli.command, Commands::Chat { sources: true }));
    }

    #[test]
    fn ask_requires_a_question() {
        let err = Cli::try_parse_from(["legal-rag", "ask"])
            .err()
            .expect("missing question is rejected");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);

        let cli = Cli::try_parse_from(["legal-rag", "ask", "Is a verbal contract binding?"])
            .expect("parses");
        let Commands::Ask { question, sources } = cli.command else {
            panic!("expected ask command");
        };
        assert_eq!(question, "Is a verbal contract binding?");
        assert!(!sources);
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["legal-rag", "config", "--show"]).expect("parses");

        assert!(matches!(cli.command, Commands::Config { show: true }));
    }

    #[test]
    fn invalid_command() {
        let err = Cli::try_parse_from(["legal-rag", "serve"])
            .err()
            .expect("unknown subcommand is rejected");
        assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn help_message() {
        let err = Cli::try_parse_from(["legal-rag", "--help"])
            .err()
            .expect("help short-circuits parsing");
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }
}
