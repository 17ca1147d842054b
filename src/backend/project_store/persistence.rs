use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::backend::common::errors::{CoreError, CoreResult};
use crate::backend::common::json_file::write_json_document;

/// How the store writes its document after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistMode {
    /// Write synchronously inside the mutating call.
    Immediate,
    /// Coalesce writes on a background task; requires a tokio runtime.
    Debounced(Duration),
}

enum WriterMessage<T> {
    Write(T),
    Flush(oneshot::Sender<CoreResult<()>>),
}

/// Single background writer that keeps only the newest pending value and
/// writes it once the debounce window passes without another write.
pub(crate) struct DebouncedJsonWriter<T> {
    sender: mpsc::UnboundedSender<WriterMessage<T>>,
}

impl<T> DebouncedJsonWriter<T>
where
    T: Serialize + Send + 'static,
{
    pub fn spawn(path: PathBuf, debounce: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(path, debounce, receiver));
        DebouncedJsonWriter { sender }
    }

    pub fn schedule(&self, value: T) {
        if self.sender.send(WriterMessage::Write(value)).is_err() {
            tracing::warn!("store.persist.writer_gone");
        }
    }

    /// Writes any pending value now and reports the most recent failure, if
    /// one happened since the previous flush.
    pub async fn flush(&self) -> CoreResult<()> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(WriterMessage::Flush(reply))
            .map_err(|_| CoreError::Persistence("persistence writer has stopped".to_string()))?;
        response
            .await
            .map_err(|_| CoreError::Persistence("persistence writer has stopped".to_string()))?
    }
}

async fn run_writer<T: Serialize + Send + 'static>(
    path: PathBuf,
    debounce: Duration,
    mut receiver: mpsc::UnboundedReceiver<WriterMessage<T>>,
) {
    let mut pending: Option<T> = None;
    let mut last_error: Option<CoreError> = None;

    loop {
        let message = if pending.is_some() {
            match tokio::time::timeout(debounce, receiver.recv()).await {
                Ok(message) => message,
                Err(_) => {
                    if let Some(value) = pending.take() {
                        if let Err(error) = write_pending(&path, value).await {
                            tracing::warn!(path = %path.display(), %error, "store.persist.failed");
                            last_error = Some(error);
                        }
                    }
                    continue;
                }
            }
        } else {
            receiver.recv().await
        };

        match message {
            Some(WriterMessage::Write(value)) => pending = Some(value),
            Some(WriterMessage::Flush(reply)) => {
                let mut result = match last_error.take() {
                    Some(error) => Err(error),
                    None => Ok(()),
                };
                if let Some(value) = pending.take() {
                    if let Err(error) = write_pending(&path, value).await {
                        tracing::warn!(path = %path.display(), %error, "store.persist.failed");
                        result = Err(error);
                    }
                }
                let _ = reply.send(result);
            }
            None => {
                if let Some(value) = pending.take() {
                    if let Err(error) = write_pending(&path, value).await {
                        tracing::warn!(path = %path.display(), %error, "store.persist.failed");
                    }
                }
                return;
            }
        }
    }
}

async fn write_pending<T: Serialize + Send + 'static>(path: &Path, value: T) -> CoreResult<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_json_document(&path, &value))
        .await
        .map_err(|error| CoreError::Persistence(format!("persistence task failed: {error}")))?
}
