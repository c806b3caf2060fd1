use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "kvgraph",
    about = "kvgraph: entity graphs on key-value stores",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Parse, build, or derive store keys
    Key(KeyArgs),
    /// Show the effective mapper configuration
    Config(ConfigArgs),
    /// Run a sample object graph through an in-memory store
    Demo(DemoArgs),
}

#[derive(Args)]
pub struct KeyArgs {
    #[command(subcommand)]
    pub action: KeyAction,
}

#[derive(Subcommand)]
pub enum KeyAction {
    /// Split a raw key into prefix, id, and suffix
    Parse { raw: String },
    /// Build a key from its parts
    Format {
        id: String,
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        suffix: Option<String>,
    },
    /// Show the id counter key for a raw key
    Counter { raw: String },
}

#[derive(Args)]
pub struct ConfigArgs {
    /// TOML file to read; defaults apply when omitted
    #[arg(long)]
    pub path: Option<PathBuf>,
}

#[derive(Args)]
pub struct DemoArgs {
    /// Number of books to add
    #[arg(long, default_value = "3")]
    pub books: usize,
    /// Backup namespace
    #[arg(long, default_value = "demo")]
    pub namespace: String,
    /// TOML mapper configuration
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_key_parse() {
        let cli = Cli::try_parse_from(["kvgraph", "key", "parse", "Order:1:lines"]).unwrap();
        if let Command::Key(KeyArgs { action: KeyAction::Parse { raw } }) = cli.command {
            assert_eq!(raw, "Order:1:lines");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_key_format() {
        let cli =
            Cli::try_parse_from(["kvgraph", "key", "format", "7", "--prefix", "Order"]).unwrap();
        let Command::Key(KeyArgs { action }) = cli.command else { panic!("wrong command") };
        if let KeyAction::Format { id, prefix, suffix } = action {
            assert_eq!(id, "7");
            assert_eq!(prefix, Some("Order".into()));
            assert!(suffix.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_demo_defaults() {
        let cli = Cli::try_parse_from(["kvgraph", "demo"]).unwrap();
        if let Command::Demo(args) = cli.command {
            assert_eq!(args.books, 3);
            assert_eq!(args.namespace, "demo");
            assert!(args.config.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::try_parse_from(["kvgraph", "config", "--format", "json", "-v"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Command::Config(_)));
    }
}
