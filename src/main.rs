use std::fs::File;
use std::io::Write;
use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::{info, warn};

use visitscope::{
    cli::{self, Command},
    config, export, logging,
    server::{self, AppState},
    service::{HistoryService, parse_date},
    timestamp,
};

fn main() -> Result<()> {
    let cli_opts = cli::parse();
    logging::init_logging(cli_opts.log_json);

    let loaded = config::load_config(cli_opts.config_path.as_deref())?;
    let mut cfg = loaded.config;
    if let Some(root) = cli_opts.profile_root.as_ref() {
        cfg.profile_root = root.to_string_lossy().into_owned();
    }

    info!(
        "starting visitscope {} config_hash={}",
        env!("CARGO_PKG_VERSION"),
        loaded.config_hash
    );

    let service = Arc::new(HistoryService::from_config(&cfg));

    let outcome = match cli_opts.command {
        Command::Serve { bind } => {
            let addr = bind.unwrap_or_else(|| cfg.bind_addr.clone());
            let state = Arc::new(AppState::new(Arc::clone(&service)));
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime
                .block_on(server::serve(state, &addr))
                .map_err(anyhow::Error::from)
        }
        Command::Dump { date, format, output } => {
            dump(&service, date.as_deref(), format.into(), output.as_deref())
        }
        Command::Profiles => list_profiles(&service),
    };

    service.shutdown();
    outcome
}

fn dump(
    service: &HistoryService,
    date: Option<&str>,
    format: export::ExportFormat,
    output: Option<&std::path::Path>,
) -> Result<()> {
    let date = date.map(parse_date).transpose()?;
    let result = service.fetch(date)?;
    if result.stores_discovered == 0 {
        bail!(visitscope::HistoryError::NoStoresFound);
    }
    for failure in &result.failures {
        warn!("skipped profile {}: {}", failure.profile, failure.error);
    }

    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut sink = export::build_sink(format, writer)?;
    let written = export::write_records(sink.as_mut(), &result.records)?;
    info!(
        "wrote {} records from {} of {} profiles",
        written, result.stores_succeeded, result.stores_discovered
    );
    Ok(())
}

fn list_profiles(service: &HistoryService) -> Result<()> {
    let profiles = service.discover()?;
    if profiles.is_empty() {
        bail!(visitscope::HistoryError::NoStoresFound);
    }
    let snapshot = service.aggregator().accessor().requires_snapshot_copy();
    let mut out = std::io::stdout().lock();
    for profile in profiles {
        let modified = std::fs::metadata(&profile.store_path)
            .and_then(|m| m.modified())
            .ok()
            .map(|t| {
                let local: chrono::DateTime<chrono::Local> = t.into();
                timestamp::format_native(timestamp::to_native(local.naive_local()))
            })
            .unwrap_or_else(|| "Unknown".to_string());
        writeln!(
            out,
            "{}\t{}\tmodified {}\tsnapshot={}",
            profile.name,
            profile.store_path.display(),
            modified,
            snapshot
        )?;
    }
    Ok(())
}
