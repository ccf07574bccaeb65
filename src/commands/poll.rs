use crate::commands::common::{CommonArgs, write_atomically};
use crate::commands::scrape::{OutputFormat, render};
use camino::Utf8PathBuf;
use clap::Parser;
use core::time::Duration;
use github_exporter::Result;
use github_exporter::harvest::Harvester;
use github_exporter::metrics;
use ohno::bail;
use tokio::time::{MissedTickBehavior, interval};

const LOG_TARGET: &str = "      poll";

#[derive(Parser, Debug)]
pub struct PollArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// File rewritten after every cycle, e.g. for the node exporter's textfile collector
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Utf8PathBuf,

    /// Seconds between the start of consecutive cycles
    #[arg(long, value_name = "SECONDS", default_value_t = 60)]
    pub interval: u64,

    /// Stop after this many cycles [default: run forever]
    #[arg(long, value_name = "COUNT")]
    pub cycles: Option<u64>,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "prometheus")]
    pub format: OutputFormat,
}

/// Run scrape cycles on a fixed schedule.
///
/// A cycle that fails is logged and its output replaced by the scrape-failure gauge; the next
/// cycle starts clean. A cycle that overruns the interval delays the next one rather than
/// overlapping it.
pub async fn poll(args: &PollArgs) -> Result<()> {
    if args.interval == 0 {
        bail!("--interval must be at least 1 second");
    }

    let config = args.common.prepare()?;
    let harvester = Harvester::new(config)?;

    let mut ticker = interval(Duration::from_secs(args.interval));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut completed = 0;
    while args.cycles.is_none_or(|cycles| completed < cycles) {
        let _ = ticker.tick().await;

        let text = match harvester.scrape().await {
            Ok(snapshot) => render(&snapshot, args.format)?,
            Err(e) => {
                log::error!(target: LOG_TARGET, "scrape cycle failed: {e:#}");
                failure_output(args.format)?
            }
        };

        if let Err(e) = write_atomically(&args.output, &text) {
            log::error!(target: LOG_TARGET, "{e:#}");
        }

        completed += 1;
    }

    Ok(())
}

fn failure_output(format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Prometheus => {
            let mut text = String::new();
            metrics::generate_failure(&mut text)?;
            Ok(text)
        }
        OutputFormat::Json => Ok("null\n".to_string()),
    }
}
