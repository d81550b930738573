use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Translate a single piece of text
    Translate {
        /// Text to translate
        #[arg(short, long)]
        text: String,

        /// Target language code (e.g. zh-CN, ja, fr)
        #[arg(long)]
        to: String,

        /// Source language code
        #[arg(long, default_value = "auto")]
        from: String,

        /// Backend to use (openai, custom)
        #[arg(short, long, default_value = "openai")]
        backend: String,
    },

    /// Translate a file line by line as a background batch job
    Batch {
        /// Input text file, one chunk per non-empty line
        #[arg(short, long)]
        input: PathBuf,

        /// Target language code
        #[arg(long)]
        to: String,

        /// Source language code
        #[arg(long, default_value = "auto")]
        from: String,

        /// Backend to use (openai, custom)
        #[arg(short, long, default_value = "openai")]
        backend: String,

        /// Write translations here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Guess the language of a text
    Detect {
        #[arg(short, long)]
        text: String,
    },

    /// Show recent translations
    History {
        /// Maximum number of entries
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Remove all history entries
        #[arg(long)]
        clear: bool,
    },

    /// Manage the translation cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// List registered backends and whether they respond
    Backends {
        /// Check each enabled backend with a short translation
        #[arg(long)]
        check: bool,
    },

    /// Write a default configuration file
    InitConfig {
        #[arg(short, long, default_value = "config.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Show the number of cached translations
    Info,

    /// Remove all cached translations
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_translate_command() {
        let args = Args::parse_from([
            "relingo", "translate", "--text", "Hello", "--to", "zh-CN",
        ]);
        match args.command {
            Commands::Translate { text, to, from, backend } => {
                assert_eq!(text, "Hello");
                assert_eq!(to, "zh-CN");
                assert_eq!(from, "auto");
                assert_eq!(backend, "openai");
            }
            _ => panic!("expected translate command"),
        }
    }

    #[test]
    fn test_parse_cache_clear() {
        let args = Args::parse_from(["relingo", "-v", "cache", "clear"]);
        assert!(args.verbose);
        assert!(matches!(args.command, Commands::Cache { action: CacheAction::Clear }));
    }
}
