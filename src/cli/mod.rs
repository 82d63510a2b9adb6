//! # Command Line Interface
//!
//! `configmanager` CLI: retrieve values for explicit tokens, rewrite a string
//! or file input in place, and (eventually) insert values back into stores.
//! Global flags configure the separators shared by every subcommand.

pub mod output;

use crate::config::SELF_NAME;
use crate::ConfigManager;
use anyhow::Context;
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

static LOGGING_INITIALISED: OnceCell<()> = OnceCell::new();

#[derive(Parser)]
#[command(name = "configmanager")]
#[command(about = "configmanager CLI for retrieving config or secret variables")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Separator to use to mark the concrete store and the key within it
    #[arg(short = 's', long, global = true, default_value = "://")]
    pub token_separator: String,

    /// Separator to use to mark a key look up in a map, e.g.
    /// AWSSECRETS:///token/map|key1
    #[arg(short = 'k', long, global = true, default_value = "|")]
    pub key_separator: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Retrieves a value for the token(s) specified
    #[command(visible_aliases = ["r", "fetch", "get"])]
    Retrieve {
        /// Token pointing to a config/secret variable; can be specified
        /// multiple times
        #[arg(short = 't', long = "token", required = true)]
        tokens: Vec<String>,

        /// Path to write the replaced config/secret variables to; the special
        /// value stdout returns the output on standard out
        #[arg(short = 'p', long, default_value = "./app.env")]
        path: String,
    },

    /// Retrieves all found token values in a string or file input
    #[command(name = "string-input", visible_aliases = ["fromstr", "getfromstr"])]
    StringInput {
        /// Path to a file whose contents will be read in, or a literal string
        /// to search for tokens
        #[arg(short = 'i', long)]
        input: String,

        /// Path to write the replaced output to; the special value stdout
        /// returns the output on standard out
        #[arg(short = 'p', long, default_value = "./app.env")]
        path: String,

        /// Expand $VAR references from the environment before token discovery
        /// (strict: unset or empty variables are fatal)
        #[arg(long)]
        enable_envsubst: bool,
    },

    /// Inserts value(s) into the backing store for the token(s) specified
    #[command(visible_aliases = ["i", "send", "put"])]
    Insert {
        /// KEY=VALUE pair to insert; can be specified multiple times
        #[arg(short = 't', long = "item", required = true)]
        items: Vec<String>,
    },
}

/// Parse arguments and run the selected subcommand
pub async fn run_cli(cancel: CancellationToken) -> anyhow::Result<()> {
    let cli = Cli::parse();

    initialise_logging(cli.verbose)?;

    let manager = ConfigManager::new()
        .with_token_separator(&cli.token_separator)
        .with_key_separator(&cli.key_separator)
        .with_cancellation(cancel);

    match cli.command {
        Commands::Retrieve { tokens, path } => handle_retrieve(manager, tokens, path).await,
        Commands::StringInput { input, path, enable_envsubst } => {
            handle_string_input(manager.with_env_subst(enable_envsubst), input, path).await
        }
        Commands::Insert { .. } => anyhow::bail!("not yet implemented"),
    }
}

async fn handle_retrieve(
    manager: ConfigManager,
    tokens: Vec<String>,
    path: String,
) -> anyhow::Result<()> {
    let manager = manager.with_output_path(&path);
    let replaced = manager.retrieve(&tokens).await?;

    let mut out = output::writer(&path)
        .with_context(|| format!("failed to open output path {}", path))?;
    output::write_export_lines(&mut out, &replaced, manager.config())
        .context("failed writing export lines")?;
    Ok(())
}

async fn handle_string_input(
    manager: ConfigManager,
    input: String,
    path: String,
) -> anyhow::Result<()> {
    // the input flag accepts either a path on disk or the content itself
    let content = if Path::new(&input).is_file() {
        tokio::fs::read_to_string(&input)
            .await
            .with_context(|| format!("failed to read input file {}", input))?
    } else {
        input
    };

    let replaced = manager.retrieve_replaced_string(&content).await?;

    let mut out = output::writer(&path)
        .with_context(|| format!("failed to open output path {}", path))?;
    output::write_string(&mut out, &replaced).context("failed writing output")?;
    Ok(())
}

fn initialise_logging(verbose: bool) -> anyhow::Result<()> {
    LOGGING_INITIALISED.get_or_init(|| {
        let filter = if verbose {
            EnvFilter::new(format!("{}=debug", SELF_NAME))
        } else {
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("{}=info", SELF_NAME)))
        };

        // try_init so a subscriber set elsewhere (e.g. tests) is not an error
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_structure_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_retrieve_parses_repeated_tokens() {
        let cli = Cli::parse_from([
            "configmanager",
            "retrieve",
            "-t",
            "AWSSECRETS:///a",
            "-t",
            "AWSSECRETS:///b",
            "-p",
            "stdout",
        ]);
        match cli.command {
            Commands::Retrieve { tokens, path } => {
                assert_eq!(tokens.len(), 2);
                assert_eq!(path, "stdout");
            }
            _ => panic!("expected retrieve subcommand"),
        }
    }

    #[test]
    fn test_global_separator_flags() {
        let cli = Cli::parse_from([
            "configmanager",
            "string-input",
            "-i",
            "some input",
            "-s",
            "#",
            "-k",
            "!",
        ]);
        assert_eq!(cli.token_separator, "#");
        assert_eq!(cli.key_separator, "!");
        match cli.command {
            Commands::StringInput { input, path, enable_envsubst } => {
                assert_eq!(input, "some input");
                assert_eq!(path, "./app.env");
                assert!(!enable_envsubst);
            }
            _ => panic!("expected string-input subcommand"),
        }
    }

    #[test]
    fn test_retrieve_requires_tokens() {
        let result = Cli::try_parse_from(["configmanager", "retrieve"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_subcommand_aliases() {
        let cli = Cli::parse_from(["configmanager", "fetch", "-t", "VAULT://a"]);
        assert!(matches!(cli.command, Commands::Retrieve { .. }));
        let cli = Cli::parse_from(["configmanager", "fromstr", "-i", "x"]);
        assert!(matches!(cli.command, Commands::StringInput { .. }));
    }
}
