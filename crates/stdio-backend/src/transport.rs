use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde_json::Value;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::Mutex;

use crate::error::TransportError;
use crate::proto::{Incoming, Notification, Request};

type Writer = Box<dyn AsyncWrite + Send + Unpin>;
type Reader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;

struct Io {
    writer: Writer,
    reader: Reader,
    line: String,
}

/// A line-delimited JSON-RPC connection.
///
/// A request holds the connection until its response arrives, so
/// concurrent callers are served one at a time.
pub struct Transport {
    name: String,
    next_id: AtomicU64,
    io: Mutex<Io>,
}

impl Transport {
    /// Creates a transport writing requests to `writer` and reading
    /// responses from `reader`. `name` is only used in logs.
    pub fn new<S, W, R>(name: S, writer: W, reader: R) -> Self
    where
        S: Into<String>,
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        Self {
            name: name.into(),
            next_id: AtomicU64::new(1),
            io: Mutex::new(Io {
                writer: Box::new(writer),
                reader: BufReader::new(reader),
                line: String::new(),
            }),
        }
    }

    /// Sends a request and waits for the response with the same id.
    ///
    /// Lines that are not JSON-RPC responses (log output, notifications,
    /// requests from the back-end) are skipped.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        let mut io = self.io.lock().await;
        write_line(&mut io.writer, &request).await?;
        trace!("[{}] sent request {id}: {method}", self.name);

        loop {
            let Io { reader, line, .. } = &mut *io;
            line.clear();
            let read = reader
                .read_line(line)
                .await
                .map_err(TransportError::io("read from the back-end"))?;
            if read == 0 {
                return Err(TransportError::Closed);
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let incoming = match serde_json::from_str::<Incoming>(trimmed) {
                Ok(incoming) => incoming,
                Err(_) => {
                    debug!("[{}] skipping non-JSON-RPC line: {trimmed}", self.name);
                    continue;
                }
            };
            if let Some(method) = &incoming.method {
                debug!("[{}] ignoring incoming message: {method}", self.name);
                continue;
            }
            // Errors the back-end could not tie to a request, e.g. parse
            // errors, carry a null id. Only our request is outstanding.
            if incoming.id.is_none() {
                if let Some(error) = incoming.error {
                    warn!(
                        "[{}] got an error without id while waiting for {id}: {}",
                        self.name, error.message
                    );
                    return Err(TransportError::Rpc(error));
                }
            }
            if incoming.id != Some(id) {
                debug!(
                    "[{}] skipping response for id {:?}",
                    self.name, incoming.id
                );
                continue;
            }

            return match (incoming.result, incoming.error) {
                (_, Some(error)) => Err(TransportError::Rpc(error)),
                (Some(result), None) => Ok(result),
                (None, None) => Err(TransportError::EmptyResponse),
            };
        }
    }

    /// Sends a notification, no response is expected.
    pub async fn notify(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), TransportError> {
        let notification = Notification {
            jsonrpc: "2.0",
            method,
            params,
        };
        let mut io = self.io.lock().await;
        write_line(&mut io.writer, &notification).await?;
        trace!("[{}] sent notification: {method}", self.name);
        Ok(())
    }

    /// Closes the writing side, which tells the back-end to exit.
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        let mut io = self.io.lock().await;
        io.writer
            .shutdown()
            .await
            .map_err(TransportError::io("close the back-end input"))
    }
}

async fn write_line<T: Serialize>(
    writer: &mut Writer,
    message: &T,
) -> Result<(), TransportError> {
    let mut json = serde_json::to_string(message)?;
    json.push('\n');
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(TransportError::io("write to the back-end"))?;
    writer
        .flush()
        .await
        .map_err(TransportError::io("flush the back-end input"))
}
