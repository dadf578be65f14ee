use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::MessageSource;
use crate::message::Message;

const MOCK_SENDER: &str = "+15555550100";

/// Emits a synthetic message every `interval` while started.
/// Stands in for a device that is not there.
pub struct MockSource {
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MockSource {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            task: Mutex::new(None),
        }
    }
}

fn synthetic_message(n: u64) -> Message {
    let now = Utc::now().timestamp_millis().to_string();
    Message::new(
        format!("Test message #{} from the mock source", n),
        MOCK_SENDER,
        now.clone(),
        now,
    )
}

#[async_trait]
impl MessageSource for MockSource {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn start(&self, sink: mpsc::Sender<Message>) -> Result<()> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            debug!("Mock source already running");
            return Ok(());
        }

        let interval = self.interval;
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            let mut n = 0;
            loop {
                ticker.tick().await;
                n += 1;
                if sink.send(synthetic_message(n)).await.is_err() {
                    debug!("Mock source receiver dropped");
                    break;
                }
            }
        }));

        info!("Mock source emitting every {:?}", interval);
        Ok(())
    }

    async fn stop(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
            info!("Mock source stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emits_until_stopped() {
        let source = MockSource::new(Duration::from_millis(10));
        let (tx, mut rx) = mpsc::channel(16);
        source.start(tx).await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.address, MOCK_SENDER);
        assert!(first.body.contains("#1"));
        assert!(second.body.contains("#2"));
        assert!(first.sent_at().is_some());

        source.stop().await;

        // Aborting the task drops the sender, which closes the channel
        let drained = tokio::time::timeout(Duration::from_secs(2), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok());
    }

    #[tokio::test]
    async fn test_stop_before_start_is_harmless() {
        let source = MockSource::new(Duration::from_secs(60));
        source.stop().await;
        assert_eq!(source.name(), "mock");
    }
}
