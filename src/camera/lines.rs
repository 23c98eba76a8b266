use async_trait::async_trait;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::debug;

use super::{CameraConfig, CameraError, DecodeStream, Decoder};

const LINE_BUFFER: usize = 64;

/// Decoder that treats each non-empty line of `reader` as a decoded payload.
///
/// The reader is consumed by the first session; later starts fail with
/// [`CameraError::NoDevice`].
pub struct LineDecoder<R> {
    reader: Option<R>,
    task: Option<JoinHandle<()>>,
}

impl<R> LineDecoder<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    /// Wraps `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            task: None,
        }
    }
}

#[async_trait]
impl<R> Decoder for LineDecoder<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn start(&mut self, config: &CameraConfig) -> Result<DecodeStream, CameraError> {
        let reader = self.reader.take().ok_or(CameraError::NoDevice)?;
        debug!(fps = config.fps, "line decoder ignores capture settings");

        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        self.task = Some(tokio::spawn(async move {
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let code = line.trim();
                if code.is_empty() {
                    continue;
                }
                if tx.send(code.to_string()).await.is_err() {
                    break;
                }
            }
        }));
        Ok(rx)
    }

    async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
