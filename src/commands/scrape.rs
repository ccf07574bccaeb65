use crate::commands::common::{CommonArgs, write_atomically};
use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use github_exporter::Result;
use github_exporter::harvest::{Harvester, Snapshot};
use github_exporter::metrics;
use ohno::IntoAppError;

/// How a snapshot is written out
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Prometheus text exposition
    Prometheus,
    /// The snapshot as JSON
    Json,
}

#[derive(Parser, Debug)]
pub struct ScrapeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Write the output to this file instead of to the terminal
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<Utf8PathBuf>,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "prometheus")]
    pub format: OutputFormat,
}

pub async fn scrape(args: &ScrapeArgs) -> Result<()> {
    let config = args.common.prepare()?;
    let harvester = Harvester::new(config)?;

    let snapshot = harvester.scrape().await?;
    let text = render(&snapshot, args.format)?;

    match &args.output {
        Some(path) => write_atomically(path, &text),
        None => {
            print!("{text}");
            Ok(())
        }
    }
}

pub fn render(snapshot: &Snapshot, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Prometheus => {
            let mut text = String::new();
            metrics::generate(snapshot, &mut text)?;
            Ok(text)
        }
        OutputFormat::Json => {
            let mut text = serde_json::to_string_pretty(snapshot).into_app_err("serializing snapshot")?;
            text.push('\n');
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_empty_snapshot() {
        let snapshot = Snapshot::default();

        let text = render(&snapshot, OutputFormat::Prometheus).unwrap();
        assert!(text.ends_with("github_exporter_last_scrape_success 1\n"));

        let json = render(&snapshot, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["scrape_errors"], 0);
        assert!(value["rate_limit"].is_null());
    }
}
