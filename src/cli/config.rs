// CLI configuration
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Sonde - media container metadata inspector
#[derive(Parser, Debug)]
#[command(name = "sonde")]
#[command(about = "Inspect Ogg, FLAC and other media containers", long_about = None)]
#[command(version)]
#[command(propagate_version = true)]
pub struct Config {
    /// Output format
    #[arg(short, long, value_enum, default_value = "pretty", global = true)]
    pub format: OutputFormat,

    /// Quiet mode (suppress progress messages)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Analysis options as a JSON file
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Skip Ogg page checksum verification
    #[arg(long, global = true)]
    pub no_crc: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    #[default]
    Pretty,
    /// Compact JSON
    Json,
    /// Key-value pairs
    KeyValue,
    /// Table format
    Table,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the full metadata record of each file
    Read {
        /// Media file path(s)
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Top-level record fields to display (comma-separated)
        #[arg(long)]
        fields: Option<String>,

        /// Output to file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Identify the format of each file
    Detect {
        /// Media file path(s)
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },

    /// Show an audio summary and the diagnostics of each file
    Info {
        /// Media file path(s)
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Also list every Ogg page header or FLAC block
        #[arg(short, long)]
        detailed: bool,
    },

    /// Export embedded cover art
    ExportCover {
        /// Media file path
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output directory for the image
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Rewrite the Vorbis comment of a FLAC file
    Write {
        /// FLAC file path
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Field to set, as KEY=VALUE (repeatable)
        #[arg(short, long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Field to remove (repeatable)
        #[arg(short, long = "remove", value_name = "KEY")]
        remove: Vec<String>,

        /// Drop every existing field before applying --set
        #[arg(long)]
        clear: bool,
    },

    /// Analyze every matching file under a directory
    Batch {
        /// Directory path
        #[arg(short, long)]
        directory: PathBuf,

        /// File pattern (e.g. "*.ogg", "*.flac")
        #[arg(short, long, default_value = "*")]
        pattern: String,
    },
}

/// Split a `KEY=VALUE` argument
pub fn parse_assignment(raw: &str) -> Option<(&str, &str)> {
    let (key, value) = raw.split_once('=')?;
    let key = key.trim();
    (!key.is_empty()).then_some((key, value))
}

/// Parse a comma-separated field list
pub fn parse_fields(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(parse_assignment("TITLE=Song"), Some(("TITLE", "Song")));
        assert_eq!(parse_assignment("NOTE=a=b"), Some(("NOTE", "a=b")));
        assert_eq!(parse_assignment("=x"), None);
        assert_eq!(parse_assignment("TITLE"), None);
    }

    #[test]
    fn test_parse_fields() {
        assert_eq!(parse_fields("format, audio,,tags"), vec!["format", "audio", "tags"]);
    }

    #[test]
    fn test_cli_parses() {
        let config = Config::try_parse_from(["sonde", "-vv", "--format", "key-value", "detect", "a.ogg"]).unwrap();
        assert_eq!(config.verbose, 2);
        assert_eq!(config.format, OutputFormat::KeyValue);
        assert!(matches!(config.command, Commands::Detect { ref files } if files.len() == 1));
    }
}
