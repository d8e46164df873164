use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use wikigraph_core::ipc::{GraphRequest, GraphResponse};
use wikigraph_core::{GraphStore, TopicSource};

use crate::router;

/// Serve length-prefixed MessagePack requests on a Unix socket until shutdown.
pub async fn run_unix_server(
    socket_path: &str,
    store: Arc<GraphStore>,
    source: Arc<dyn TopicSource>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    tracing::info!("IPC Server listening on {}", socket_path);

    loop {
        tokio::select! {
            res = listener.accept() => {
                let (stream, _) = res?;
                tokio::spawn(serve_connection(stream, store.clone(), source.clone()));
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutting down IPC server...");
                break;
            }
        }
    }

    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    Ok(())
}

/// 4-byte little-endian length prefix + MessagePack payload per frame.
fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder().little_endian().new_codec()
}

async fn serve_connection(stream: UnixStream, store: Arc<GraphStore>, source: Arc<dyn TopicSource>) {
    let (read, write) = stream.into_split();
    let mut framed_read = FramedRead::new(read, frame_codec());
    let mut framed_write = FramedWrite::new(write, frame_codec());

    while let Some(frame) = framed_read.next().await {
        let bytes_mut = match frame {
            Ok(b) => b,
            Err(e) => {
                tracing::error!("Frame error: {}", e);
                break;
            }
        };

        let response = match rmp_serde::from_slice::<GraphRequest>(&bytes_mut) {
            Ok(request) => router::handle_request(request, &store, source.as_ref()).await,
            Err(e) => GraphResponse::err(format!("Deserialization error: {}", e)),
        };

        let resp_bytes = match rmp_serde::to_vec_named(&response) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!("Failed to serialize response: {}", e);
                break;
            }
        };
        if let Err(e) = framed_write.send(Bytes::from(resp_bytes)).await {
            tracing::error!("Failed to send response: {}", e);
            break;
        }
    }
}
