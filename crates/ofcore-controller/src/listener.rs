//! Accept loop and the per-connection reader and writer tasks.

use std::net::SocketAddr;
use std::sync::Arc;

use ofcore_frame::FrameWriter;
use ofcore_transport::{SwitchListener, SwitchReader, SwitchStream};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::connection::Connection;
use crate::controller::Controller;
use crate::error::Result;

/// Accepts switch connections and runs each one against a [`Controller`].
pub struct ControllerListener {
    listener: SwitchListener,
    controller: Controller,
}

impl ControllerListener {
    pub async fn bind(addr: SocketAddr, controller: Controller) -> Result<Self> {
        let listener = SwitchListener::bind(addr).await?;
        Ok(Self {
            listener,
            controller,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Accept one switch and spawn its tasks.
    pub async fn accept(&self) -> Result<Arc<Connection>> {
        let stream = self.listener.accept().await?;
        Ok(serve_connection(&self.controller, stream))
    }

    /// Accept until `shutdown` is cancelled, then close every live connection.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(stream) => {
                        serve_connection(&self.controller, stream);
                    }
                    Err(err) => warn!(error = %err, "accept failed"),
                },
            }
        }
        for conn in self.controller.connections() {
            conn.close();
        }
        info!("listener stopped");
        Ok(())
    }
}

/// Register `stream` with `controller` and spawn its reader and writer tasks.
pub fn serve_connection(controller: &Controller, stream: SwitchStream) -> Arc<Connection> {
    let conn = controller.register_connection(stream.id(), stream.peer_addr());
    let (reader, writer) = stream.into_split();
    info!(connection = %conn.id(), peer = %conn.peer_addr(), "switch connected");

    let writer_task = tokio::spawn(write_loop(
        controller.clone(),
        Arc::clone(&conn),
        FrameWriter::new(writer.into_inner()),
    ));
    tokio::spawn(read_loop(
        controller.clone(),
        Arc::clone(&conn),
        reader,
        writer_task,
    ));
    conn
}

async fn read_loop(
    controller: Controller,
    conn: Arc<Connection>,
    mut reader: SwitchReader,
    writer_task: JoinHandle<()>,
) {
    loop {
        tokio::select! {
            _ = conn.closed() => break,
            chunk = reader.read_chunk() => match chunk {
                Ok(Some(data)) => controller.handle_data(&conn, data).await,
                Ok(None) => {
                    debug!(connection = %conn.id(), "switch closed the connection");
                    break;
                }
                Err(err) => {
                    controller
                        .fail_connection(&conn, format!("read failed: {err}"))
                        .await;
                    break;
                }
            },
        }
    }

    conn.close();
    if let Err(err) = writer_task.await {
        error!(connection = %conn.id(), error = %err, "writer task failed");
    }
    controller.connection_closed(&conn).await;
}

async fn write_loop(
    controller: Controller,
    conn: Arc<Connection>,
    mut writer: FrameWriter<OwnedWriteHalf>,
) {
    loop {
        if let Some(item) = conn.pop_outbound() {
            if let Err(err) = writer.write_frame(&item.data).await {
                controller
                    .fail_connection(&conn, format!("write failed: {err}"))
                    .await;
                break;
            }
            controller.on_message_sent(&conn, item).await;
            continue;
        }
        if conn.is_closed() {
            break;
        }
        tokio::select! {
            _ = conn.outbound.notified() => {}
            _ = conn.closed() => {}
        }
    }

    if let Err(err) = writer.shutdown().await {
        debug!(connection = %conn.id(), error = %err, "shutdown after close");
    }
}
