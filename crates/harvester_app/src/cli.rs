use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use engine_logging::LogDestination;
use harvester_engine::HarvestSettings;
use log::LevelFilter;

#[derive(Debug, Parser)]
#[command(name = "harvester", version, about = "Resumable batch harvester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Harvest the work list, resuming from the last recorded batch.
    Run,
    /// Give every label in the batch error listings one more attempt.
    RetryErrors,
    /// Print the resume offset and pending labels.
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ParserKind {
    Json,
    Html,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogTarget {
    Terminal,
    File,
    Both,
}

impl From<LogTarget> for LogDestination {
    fn from(target: LogTarget) -> Self {
        match target {
            LogTarget::Terminal => LogDestination::Terminal,
            LogTarget::File => LogDestination::File,
            LogTarget::Both => LogDestination::Both,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// RON settings file; flags below override it.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Directory for ledgers, error listings and the log file.
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    pub name: Option<String>,
    #[arg(long, global = true)]
    pub label_key: Option<String>,
    /// Work list, one label per line.
    #[arg(long, global = true)]
    pub items: Option<PathBuf>,
    /// Search URL containing `{label}`.
    #[arg(long, global = true)]
    pub search_url: Option<String>,
    /// Directory receiving one JSON file per record (default: <state-dir>/records).
    #[arg(long, global = true)]
    pub output: Option<PathBuf>,
    #[arg(long, global = true, value_enum, default_value_t = ParserKind::Json)]
    pub parser: ParserKind,
    /// Body text identifying a block page.
    #[arg(long, global = true)]
    pub block_marker: Option<String>,
    #[arg(long, global = true, value_enum, default_value_t = LogTarget::Terminal)]
    pub log: LogTarget,
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[arg(long, global = true)]
    pub batch_size: Option<usize>,
    #[arg(long, global = true)]
    pub request_delay: Option<f64>,
    #[arg(long, global = true)]
    pub search_delay: Option<f64>,
    #[arg(long, global = true)]
    pub jitter: Option<f64>,
}

impl CommonArgs {
    /// Settings file (or defaults) with command-line overrides applied.
    pub fn settings(&self) -> anyhow::Result<HarvestSettings> {
        let mut settings = match &self.config {
            Some(path) => HarvestSettings::load(path)
                .with_context(|| format!("loading settings from {}", path.display()))?,
            None => HarvestSettings::default(),
        };
        if let Some(dir) = &self.state_dir {
            settings.base_dir = dir.clone();
        }
        if let Some(name) = &self.name {
            settings.name = name.clone();
        }
        if let Some(label_key) = &self.label_key {
            settings.label_key = label_key.clone();
        }
        if let Some(batch_size) = self.batch_size {
            settings.batch_size = batch_size;
        }
        if let Some(delay) = self.request_delay {
            settings.request_delay_secs = delay;
        }
        if let Some(delay) = self.search_delay {
            settings.search_delay_secs = delay;
        }
        if let Some(jitter) = self.jitter {
            settings.jitter_max_secs = jitter;
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn flags_override_the_settings_file() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("ciyu.ron");
        std::fs::write(
            &config,
            r#"(name: "ciyu", batch_size: 500, jitter_max_secs: 0.3)"#,
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "harvester",
            "run",
            "--config",
            config.to_str().unwrap(),
            "--batch-size",
            "20",
            "--state-dir",
            "/tmp/ciyu",
        ])
        .unwrap();
        assert_eq!(cli.command, Command::Run);

        let settings = cli.common.settings().unwrap();
        assert_eq!(settings.name, "ciyu");
        assert_eq!(settings.batch_size, 20);
        assert_eq!(settings.jitter_max_secs, 0.3);
        assert_eq!(settings.base_dir, PathBuf::from("/tmp/ciyu"));
    }

    #[test]
    fn invalid_override_is_rejected() {
        let cli = Cli::try_parse_from(["harvester", "status", "--batch-size", "0"]).unwrap();
        assert!(cli.common.settings().is_err());
    }

    #[test]
    fn parser_and_log_choices() {
        let cli =
            Cli::try_parse_from(["harvester", "retry-errors", "--parser", "html", "--log", "both"])
                .unwrap();
        assert_eq!(cli.command, Command::RetryErrors);
        assert_eq!(cli.common.parser, ParserKind::Html);
        assert_eq!(LogDestination::from(cli.common.log), LogDestination::Both);
        assert!(Cli::try_parse_from(["harvester", "run", "--parser", "xml"]).is_err());
    }
}
