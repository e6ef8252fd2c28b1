//! Command-line interface definitions for PropTech Intel.
//!
//! Global options can be given as flags or environment variables.

use clap::{Parser, Subcommand};

/// Command-line arguments for the `proptech_intel` binary.
///
/// # Examples
///
/// ```sh
/// # Relevant articles from every configured source
/// proptech_intel articles -n 5
///
/// # Analyze text under a competitor label
/// echo "Acme launches a rental app" | proptech_intel analyze --label Acme
///
/// # Full report, also written to ./reports/<date>/<edition>.json
/// proptech_intel intel -j ./reports
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML settings file
    #[arg(short, long, env = "PROPTECH_INTEL_CONFIG")]
    pub config: Option<String>,

    /// OpenAI API key; overrides the settings file
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Print relevant articles (backfilled to at least three)
    Articles {
        /// Maximum relevant articles
        #[arg(short = 'n', long, default_value_t = 5)]
        max: usize,

        /// Print everything scraped, unfiltered, with `max` per source
        #[arg(long)]
        all: bool,
    },

    /// Scrape a single configured source
    Source {
        name: String,

        #[arg(short = 'n', long, default_value_t = 5)]
        max: usize,
    },

    /// List configured sources
    Sources,

    /// Analyze text; reads stdin when no text is given
    Analyze {
        /// Competitor name, or the industry label for industry-wide analysis
        #[arg(short, long)]
        label: String,

        content: Option<String>,

        /// Skip the persistent result cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Check API credentials and connectivity
    TestConnection,

    /// Scrape, filter and analyze, printing an intelligence report
    Intel {
        #[arg(short = 'n', long, default_value_t = 15)]
        max: usize,

        /// Also write the report under this directory
        #[arg(short, long)]
        json_output_dir: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_articles_defaults() {
        let cli = Cli::parse_from(["proptech_intel", "articles"]);
        assert_eq!(cli.command, Command::Articles { max: 5, all: false });
    }

    #[test]
    fn test_cli_global_config() {
        let cli = Cli::parse_from(["proptech_intel", "-c", "/etc/intel.yaml", "articles", "-n", "9", "--all"]);
        assert_eq!(cli.config.as_deref(), Some("/etc/intel.yaml"));
        assert_eq!(cli.command, Command::Articles { max: 9, all: true });
    }

    #[test]
    fn test_cli_analyze() {
        let cli = Cli::parse_from([
            "proptech_intel",
            "analyze",
            "--label",
            "PropTech Industry",
            "Smart building news",
        ]);
        assert_eq!(
            cli.command,
            Command::Analyze {
                label: "PropTech Industry".to_string(),
                content: Some("Smart building news".to_string()),
                no_cache: false,
            }
        );
    }

    #[test]
    fn test_cli_intel_short_flags() {
        let cli = Cli::parse_from(["proptech_intel", "intel", "-n", "8", "-j", "/tmp/reports"]);
        assert_eq!(
            cli.command,
            Command::Intel {
                max: 8,
                json_output_dir: Some("/tmp/reports".to_string()),
            }
        );
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["proptech_intel"]).is_err());
        assert!(Cli::try_parse_from(["proptech_intel", "source"]).is_err());
        assert!(Cli::try_parse_from(["proptech_intel", "test-connection"]).is_ok());
    }
}
