// CLI command implementations
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::{debug, error, info, warn};

use nowplaying::{MetadataDispatcher, Pipeline, PipelineOptions, PipelineReport, SourceServer, Termination};

use crate::cli::Config;

/// Listen for sources until Ctrl+C
pub fn listen(config: &Config) -> Result<()> {
    let dispatcher = config.sink_options().build().context("cannot set up track output")?;
    let server_config = config.server_config();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("cannot start the runtime")?;

    runtime.block_on(async move {
        let server = SourceServer::bind(server_config, Arc::new(dispatcher)).await?;
        let addr = server.local_addr().context("listener has no local address")?;
        info!("listening on port {} ({})", addr.port(), addr);
        if let Some(path) = &config.outfile {
            info!("tracks go to {}", path.display());
        }

        server
            .run(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("cannot wait for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
                info!("exiting");
            })
            .await?;
        Ok::<(), anyhow::Error>(())
    })
}

/// Run the pipeline over recorded streams, one file at a time
pub fn scan<P: AsRef<Path>>(config: &Config, files: &[P]) -> Result<()> {
    let dispatcher = config.sink_options().build().context("cannot set up track output")?;
    let options = config.pipeline_options();

    let mut failed = 0;
    for path in files {
        let path = path.as_ref();
        match scan_file(&dispatcher, options, path) {
            Ok(report) => log_scan(path, &report),
            Err(e) => {
                error!("{:#}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} file(s) could not be scanned", failed, files.len());
    }
    Ok(())
}

fn scan_file(
    dispatcher: &MetadataDispatcher,
    options: PipelineOptions,
    path: &Path,
) -> Result<PipelineReport> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    Ok(Pipeline::new(dispatcher, options).run(BufReader::new(file)))
}

fn log_scan(path: &Path, report: &PipelineReport) {
    let summary = &report.summary;
    match &report.termination {
        Termination::EndOfStream => info!(
            "{}: {} pages, {} track(s)",
            path.display(),
            summary.pages,
            summary.dispatched
        ),
        Termination::Failed(e) => warn!(
            "{}: stopped after {} bytes: {}",
            path.display(),
            summary.bytes,
            e
        ),
    }
    if let Ok(json) = serde_json::to_string(summary) {
        debug!("{}: {}", path.display(), json);
    }
}
