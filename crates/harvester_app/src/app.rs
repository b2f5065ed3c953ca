use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use engine_logging::{engine_info, engine_warn};
use harvester_engine::{
    retry_error_listings, status, Collaborators, Harvester, HarvestSettings, HtmlMetaParser,
    HttpResolver, HttpSettings, JsonDirSink, JsonRecordParser, LineFileSource, RecordParser,
    RunExit,
};
use tokio_util::sync::CancellationToken;

use crate::cli::{Cli, Command, CommonArgs, ParserKind};

pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let settings = cli.common.settings()?;
    engine_logging::initialize(cli.common.log.into(), cli.common.level(), &settings.base_dir);

    match cli.command {
        Command::Status => {
            print_status(&settings);
            Ok(ExitCode::SUCCESS)
        }
        Command::Run => {
            let collaborators = collaborators(&cli.common, &settings)?;
            let cancel = cancel_on_ctrl_c();
            let exit = Harvester::new(settings, collaborators).run(cancel).await;
            Ok(ExitCode::from(exit.code()))
        }
        Command::RetryErrors => {
            let collaborators = collaborators(&cli.common, &settings)?;
            let cancel = cancel_on_ctrl_c();
            let summary = retry_error_listings(&settings, &collaborators, &cancel).await?;
            println!(
                "retried {}: {} saved, {} failed, {} skipped ({})",
                summary.total,
                summary.succeeded,
                summary.failed,
                summary.skipped,
                settings.retry_results_path().display()
            );
            let exit = if cancel.is_cancelled() {
                RunExit::Interrupted
            } else {
                RunExit::Completed
            };
            Ok(ExitCode::from(exit.code()))
        }
    }
}

fn collaborators(args: &CommonArgs, settings: &HarvestSettings) -> anyhow::Result<Collaborators> {
    let search_url = args
        .search_url
        .clone()
        .context("--search-url is required")?;
    if !search_url.contains("{label}") {
        anyhow::bail!("--search-url must contain {{label}}");
    }
    let items = args
        .items
        .clone()
        .unwrap_or_else(|| settings.base_dir.join("items.txt"));
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| settings.base_dir.join("records"));

    let parser: Arc<dyn RecordParser> = match args.parser {
        ParserKind::Json => Arc::new(JsonRecordParser),
        ParserKind::Html => Arc::new(HtmlMetaParser),
    };
    let http = HttpSettings {
        search_url,
        block_marker: args.block_marker.clone(),
        ..HttpSettings::default()
    };
    let resolver = Arc::new(HttpResolver::new(http, parser).context("building http client")?);
    engine_info!("Records go to {}", output.display());

    Ok(Collaborators {
        source: Arc::new(LineFileSource::new(items)),
        searcher: resolver.clone(),
        detail: resolver,
        sink: Arc::new(JsonDirSink::new(output)),
    })
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            engine_warn!("Interrupt received, finishing up");
            token.cancel();
        }
    });
    cancel
}

fn print_status(settings: &HarvestSettings) {
    let report = status(settings);
    println!("domain:          {}", settings.name);
    println!("resume offset:   {}", report.resume_offset);
    println!("batches:         {}", report.batches_recorded);
    println!("pending labels:  {}", report.pending.len());
    for label in &report.pending {
        println!("  {label}");
    }
}
