use std::sync::Arc;

use chrono::Local;
use tokio_util::sync::CancellationToken;

use mex_core::{
    config::Config,
    export::Exporter,
    logging::{self, TracingObserver},
    pagination::Paginator,
    ports::ProgressObserver,
    retry::Retrier,
    utils::run_dir_name,
    workflow::{write_summary, Workflow},
    Error,
};
use mex_telegram::TelegramSource;

#[tokio::main]
async fn main() -> Result<(), Error> {
    logging::init("mex")?;

    let cfg = Config::load()?;
    let source = TelegramSource::connect(&cfg.telegram_bot_token)
        .await
        .map_err(|e| Error::External(format!("telegram connect failed: {e}")))?;

    // One timestamped folder per run so repeated runs never overwrite each other.
    let run_dir = cfg.export_dir.join(run_dir_name(&Local::now()));

    let observer: Arc<dyn ProgressObserver> = Arc::new(TracingObserver);
    let retrier = Retrier::new(cfg.retry).with_observer(observer.clone());
    let paginator = Paginator::new(cfg.pagination, retrier.clone()).with_observer(observer.clone());
    let exporter = Exporter::new(&run_dir, cfg.export_format, cfg.export_options);
    let workflow =
        Workflow::new(Arc::new(source), paginator, retrier, exporter).with_observer(observer);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling export");
                cancel.cancel();
            }
        }
    });

    println!("Exporting to directory: {}", run_dir.display());
    let results = workflow.export_groups(&cfg.export_groups, &cancel).await;

    for r in &results {
        match (&r.output_file_path, &r.error_message) {
            (Some(path), _) if r.success => println!(
                "  {} ({}) -> exported {} members to {}",
                r.source_name,
                r.source_id,
                r.member_count,
                path.display()
            ),
            (_, msg) => eprintln!(
                "  {} ({}) -> failed: {}",
                r.source_name,
                r.source_id,
                msg.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    let summary = write_summary(&run_dir, &results)?;
    println!("Summary written to {}", summary.display());

    let failed = results.iter().filter(|r| !r.success).count();
    if failed > 0 {
        return Err(Error::External(format!(
            "{failed} of {} exports failed",
            results.len()
        )));
    }
    Ok(())
}
