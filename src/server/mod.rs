// Source push endpoint
//
// Accepts connections from broadcast software, answers the handshake, and
// runs one ingestion pipeline per connection on a blocking thread. Shutting
// down closes every live socket, which breaks the pipelines out of their
// blocking reads.

pub mod handshake;

use std::future::Future;
use std::io::{self, BufReader, Cursor, Read};
use std::net::{IpAddr, Ipv4Addr, Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::dispatch::MetadataDispatcher;
use crate::pipeline::{Pipeline, PipelineOptions, PipelineReport, Termination};
use handshake::{HandshakeError, SourceRequest};

/// Port source clients are usually pointed at
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    /// Drop a source that sends nothing for this long
    pub idle_timeout: Option<Duration>,
    pub pipeline: PipelineOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            idle_timeout: None,
            pipeline: PipelineOptions::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot listen on {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
}

/// Listening endpoint; one pipeline per accepted source
pub struct SourceServer {
    listener: TcpListener,
    dispatcher: Arc<MetadataDispatcher>,
    config: ServerConfig,
}

impl SourceServer {
    pub async fn bind(config: ServerConfig, dispatcher: Arc<MetadataDispatcher>) -> Result<Self, ServerError> {
        let addr = SocketAddr::new(config.bind, config.port);
        let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind { addr, source })?;
        Ok(Self { listener, dispatcher, config })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` resolves, then close all sources and wait for them
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("connection from {}", peer);
                        connections.spawn(serve_connection(
                            stream,
                            peer,
                            Arc::clone(&self.dispatcher),
                            self.config.clone(),
                            stop_rx.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!("accept failed: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!("connection task failed: {}", e);
                    }
                }
            }
        }

        if !connections.is_empty() {
            info!("closing {} source connection(s)", connections.len());
        }
        let _ = stop_tx.send(true);
        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                error!("connection task failed: {}", e);
            }
        }
        Ok(())
    }
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<MetadataDispatcher>,
    config: ServerConfig,
    mut stop: watch::Receiver<bool>,
) {
    let stream = match into_blocking(stream) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("cannot serve {}: {}", peer, e);
            return;
        }
    };
    let closer = match stream.try_clone() {
        Ok(closer) => closer,
        Err(e) => {
            warn!("cannot serve {}: {}", peer, e);
            return;
        }
    };

    let mut task = tokio::task::spawn_blocking(move || handle_source(stream, peer, &dispatcher, &config));
    let finished = tokio::select! {
        joined = &mut task => Some(joined),
        _ = stop.changed() => None,
    };
    let joined = match finished {
        Some(joined) => joined,
        None => {
            let _ = closer.shutdown(Shutdown::Both);
            task.await
        }
    };

    match joined {
        Ok(Ok(report)) => log_report(peer, &report),
        Ok(Err(e)) => warn!("source {} rejected: {}", peer, e),
        Err(e) => error!("source {} handler failed: {}", peer, e),
    }
}

fn into_blocking(stream: tokio::net::TcpStream) -> io::Result<TcpStream> {
    let stream = stream.into_std()?;
    stream.set_nonblocking(false)?;
    Ok(stream)
}

/// Handshake, then run the pipeline over the rest of the connection
fn handle_source(
    mut stream: TcpStream,
    peer: SocketAddr,
    dispatcher: &MetadataDispatcher,
    config: &ServerConfig,
) -> Result<PipelineReport, HandshakeError> {
    stream.set_read_timeout(config.idle_timeout)?;
    let mut writer = stream.try_clone()?;

    let head = match handshake::read_request(&mut stream) {
        Ok(head) => head,
        Err(e @ HandshakeError::UnsupportedMethod(_)) => {
            handshake::reject(&mut writer)?;
            return Err(e);
        }
        Err(e) => return Err(e),
    };
    handshake::accept(&mut writer, &head.request)?;
    log_request(peer, &head.request);

    // bytes that arrived with the head are the start of the stream
    let reader = BufReader::new(Cursor::new(head.body).chain(stream));
    Ok(Pipeline::new(dispatcher, config.pipeline).run(reader))
}

fn log_request(peer: SocketAddr, request: &SourceRequest) {
    info!(
        "source connected from {} on {} ({})",
        peer,
        request.mount,
        request.user_agent().unwrap_or("unknown client")
    );
    match request.content_type() {
        Some(ct) if !ct.to_ascii_lowercase().contains("ogg") => {
            warn!("source {} announces {}, only Ogg Vorbis metadata can be read", peer, ct);
        }
        _ => {}
    }
}

fn log_report(peer: SocketAddr, report: &PipelineReport) {
    let summary = &report.summary;
    match &report.termination {
        Termination::EndOfStream => info!(
            "source {} disconnected after {} pages, {} track(s)",
            peer, summary.pages, summary.dispatched
        ),
        Termination::Failed(e) if e.is_transport() => info!(
            "source {} closed ({}) after {} pages, {} track(s)",
            peer, e, summary.pages, summary.dispatched
        ),
        Termination::Failed(e) => error!("source {} dropped: {}", peer, e),
    }
    if let Ok(json) = serde_json::to_string(summary) {
        debug!("source {} summary: {}", peer, json);
    }
}
