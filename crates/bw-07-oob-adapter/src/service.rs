//! OOB listener: accepts local clients and runs one session per connection.

use crate::adapters::{FrameReader, FrameWriter, DEFAULT_MAX_FRAME_BYTES};
use crate::domain::{Command, Frame, MAX_SEQNO};
use crate::session::Session;
use bw_06_message_pipeline::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Version string sent in the `helo` greeting.
pub const PROTOCOL_VERSION: &str = concat!("bw-oob/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct OobConfig {
    pub listen: String,
    pub max_frame_bytes: usize,
    /// Frames buffered per connection before producers wait on the writer.
    pub outbound_queue: usize,
}

impl Default for OobConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:28589".to_string(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            outbound_queue: 1024,
        }
    }
}

pub struct OobServer {
    listener: TcpListener,
    router: Arc<Router>,
    config: OobConfig,
}

impl OobServer {
    pub async fn bind(config: OobConfig, router: Arc<Router>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(&config.listen).await?;
        info!(addr = %listener.local_addr()?, "OOB listener bound");
        Ok(Self {
            listener,
            router,
            config,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept until `shutdown` flips to `true`.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let router = Arc::clone(&self.router);
                        let config = self.config.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, peer, router, config, shutdown).await;
                        });
                    }
                    Err(e) => error!(error = %e, "accept failed"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("OOB listener stopped");
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Arc<Router>,
    config: OobConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let (rd, wr) = stream.into_split();
    let (tx, mut rx) = mpsc::channel::<Frame>(config.outbound_queue);

    let writer = tokio::spawn(async move {
        let mut w = FrameWriter::new(BufWriter::new(wr));
        while let Some(frame) = rx.recv().await {
            if let Err(e) = w.write_frame(&frame).await {
                debug!(%peer, error = %e, "write failed");
                break;
            }
        }
    });

    let session = Session::new(router.create_client(), tx.clone());
    info!(%peer, client = %session.client().id(), "client connected");

    let helo = Frame::new(Command::Hello, rand::random::<u32>() & MAX_SEQNO)
        .header("version", PROTOCOL_VERSION);
    if tx.send(helo).await.is_err() {
        session.close();
        return;
    }
    drop(tx);

    let mut reader = FrameReader::new(BufReader::new(rd), config.max_frame_bytes);
    loop {
        tokio::select! {
            next = reader.read_next() => match next {
                Ok(Some(frame)) => session.handle(frame).await,
                Ok(None) => break,
                Err(e) => {
                    warn!(%peer, error = %e, "dropping connection on bad frame");
                    break;
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    session.close();
    // In-flight registry commands still hold the queue; the writer exits
    // once they finish.
    drop(writer);
    info!(%peer, "client disconnected");
}
