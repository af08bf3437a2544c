//! Drain coordination for the composed server.

use tokio::sync::broadcast;

/// Broadcast signal telling every listener task to stop accepting and drain.
///
/// Each serve task subscribes before it starts; a trigger reaches all of them.
#[derive(Debug, Clone)]
pub struct DrainSignal {
    tx: broadcast::Sender<()>,
}

impl DrainSignal {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the drain. Safe to call more than once.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Tasks still subscribed.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Resolve once the drain is triggered or the signal is dropped.
    pub async fn wait(mut rx: broadcast::Receiver<()>) {
        let _ = rx.recv().await;
    }
}

impl Default for DrainSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_reaches_every_subscriber() {
        let drain = DrainSignal::new();
        let a = tokio::spawn(DrainSignal::wait(drain.subscribe()));
        let b = tokio::spawn(DrainSignal::wait(drain.subscribe()));
        assert_eq!(drain.receiver_count(), 2);

        drain.trigger();

        tokio::time::timeout(Duration::from_secs(1), async {
            a.await.unwrap();
            b.await.unwrap();
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn dropping_the_signal_releases_waiters() {
        let drain = DrainSignal::new();
        let waiter = tokio::spawn(DrainSignal::wait(drain.subscribe()));
        drop(drain);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
