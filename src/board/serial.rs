//! Serial transport: bridges the board's byte stream to line channels.
//!
//! The controller never touches the port directly. A reader task
//! delivers trimmed CR+LF-delimited inbound lines over one channel and
//! a writer task drains outbound lines from another, appending the
//! terminator. Everything above this module sees only the two channel
//! ends in [`TransportHandle`].

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_serial::SerialPortBuilderExt;

use super::BoardError;

/// The channel seam the controller drives the board through: outbound
/// lines (no terminator) in, trimmed inbound lines out. Dropping the
/// handle closes the link and ends both I/O tasks.
#[derive(Debug)]
pub struct TransportHandle {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Opens the serial port and spawns the reader and writer tasks.
pub fn open(path: &str, baud: u32) -> Result<TransportHandle, BoardError> {
    let stream = tokio_serial::new(path, baud)
        .open_native_async()
        .map_err(|source| BoardError::PortOpen {
            path: path.to_string(),
            source,
        })?;

    let (read_half, mut write_half) = tokio::io::split(stream);
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let mut reader = BufReader::new(read_half);
        let mut buffer = String::new();
        loop {
            buffer.clear();
            match reader.read_line(&mut buffer).await {
                Ok(0) => {
                    tracing::info!("serial connection closed by the board");
                    break;
                }
                Ok(_) => {
                    // Stray CRs from the CR+LF framing fall to trim.
                    let line = buffer.trim();
                    if line.is_empty() {
                        continue;
                    }
                    tracing::trace!(line, "serial rx");
                    if inbound_tx.send(line.to_string()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "serial read error");
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(line) = outbound_rx.recv().await {
            tracing::trace!(line = line.as_str(), "serial tx");
            let framed = format!("{line}\n");
            if let Err(e) = write_half.write_all(framed.as_bytes()).await {
                tracing::error!(error = %e, "serial write error");
                break;
            }
            if let Err(e) = write_half.flush().await {
                tracing::error!(error = %e, "serial flush error");
                break;
            }
        }
        tracing::debug!("serial writer task terminated");
    });

    Ok(TransportHandle {
        outbound: outbound_tx,
        inbound: inbound_rx,
    })
}
