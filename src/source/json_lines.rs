use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::MessageSource;
use crate::message::Message;

/// Reads one JSON message per line, e.g. from a platform bridge piping
/// into stdin:
///
/// ```text
/// {"body":"hi","address":"+15551234567","date":"1700000000000","dateSent":"1700000000000"}
/// ```
pub struct JsonLinesSource<R> {
    reader: Mutex<Option<R>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<R> JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: Mutex::new(Some(reader)),
            task: Mutex::new(None),
        }
    }
}

impl JsonLinesSource<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R> MessageSource for JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    fn name(&self) -> &'static str {
        "json-lines"
    }

    async fn start(&self, sink: mpsc::Sender<Message>) -> Result<()> {
        let Some(reader) = self.reader.lock().await.take() else {
            anyhow::bail!("Message feed was already consumed");
        };

        let handle = tokio::spawn(async move {
            let mut lines = reader.lines();
            let mut line_no = 0u64;
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("Message feed ended");
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read message feed: {}", e);
                        break;
                    }
                };
                line_no += 1;

                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let message: Message = match serde_json::from_str(line) {
                    Ok(m) => m,
                    Err(e) => {
                        warn!("Skipping malformed message on line {}: {}", line_no, e);
                        continue;
                    }
                };

                if sink.send(message).await.is_err() {
                    break;
                }
            }
        });

        *self.task.lock().await = Some(handle);
        info!("Reading messages from JSON-lines feed");
        Ok(())
    }

    async fn stop(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const FEED: &[u8] = b"{\"body\":\"one\",\"address\":\"+1\",\"date\":\"1\",\"dateSent\":\"1\"}\n\
\n\
not json at all\n\
{\"body\":\"two\",\"address\":\"+2\",\"date\":\"2\",\"dateSent\":\"2\"}\n";

    #[tokio::test]
    async fn test_reads_valid_lines_and_skips_bad_ones() {
        let source = JsonLinesSource::new(FEED);
        let (tx, mut rx) = mpsc::channel(16);
        source.start(tx).await.unwrap();

        let mut bodies = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(msg) = rx.recv().await {
                bodies.push(msg.body);
            }
        })
        .await
        .unwrap();

        assert_eq!(bodies, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_second_start_fails() {
        let source = JsonLinesSource::new(FEED);
        let (tx, _rx) = mpsc::channel(16);
        source.start(tx.clone()).await.unwrap();
        assert!(source.start(tx).await.is_err());
        source.stop().await;
    }
}
