//! Event Publisher
//!
//! Fans transaction events out to live stream subscribers and to a bounded
//! delivery queue drained by a worker pool. Publishing never waits: a full
//! queue drops the event with a warning.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ledger_types::domain::TransactionEvent;
use ledger_types::ports::{CollaboratorError, EventSink};
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::config::{EngineConfig, RetryPolicy};

struct Inner {
    stream_tx: broadcast::Sender<TransactionEvent>,
    queue_tx: Option<mpsc::Sender<TransactionEvent>>,
    /// Events enqueued and not yet fully delivered
    in_flight: AtomicUsize,
    dropped: AtomicU64,
}

/// Cheap to clone; all clones feed the same stream and queue.
#[derive(Clone)]
pub struct EventPublisher {
    inner: Arc<Inner>,
}

impl EventPublisher {
    /// Spawns the delivery workers. Must be called inside a Tokio runtime.
    ///
    /// With no sinks only the live stream is fed.
    pub fn start(sinks: Vec<Arc<dyn EventSink>>, config: &EngineConfig) -> Self {
        let (stream_tx, _) = broadcast::channel(config.event_stream_capacity.max(1));

        let queue_tx = if sinks.is_empty() {
            None
        } else {
            let (tx, rx) = mpsc::channel(config.event_queue_capacity.max(1));
            Some((tx, rx))
        };

        let inner = Arc::new(Inner {
            stream_tx,
            queue_tx: queue_tx.as_ref().map(|(tx, _)| tx.clone()),
            in_flight: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
        });

        if let Some((_, rx)) = queue_tx {
            let rx = Arc::new(Mutex::new(rx));
            let sinks: Arc<[Arc<dyn EventSink>]> = sinks.into();
            let workers = config.event_workers.max(1);
            for worker in 0..workers {
                tokio::spawn(run_worker(
                    worker,
                    rx.clone(),
                    sinks.clone(),
                    Arc::downgrade(&inner),
                    config.event_retry,
                    config.collaborator_timeout,
                ));
            }
            info!(workers, sinks = sinks.len(), "event delivery started");
        }

        Self { inner }
    }

    /// Hands the event to subscribers and the delivery queue without waiting.
    pub fn publish(&self, event: TransactionEvent) {
        // No subscribers is not an error.
        let _ = self.inner.stream_tx.send(event.clone());

        let Some(queue) = &self.inner.queue_tx else {
            return;
        };
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        if let Err(err) = queue.try_send(event) {
            self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            let (reason, event) = match err {
                mpsc::error::TrySendError::Full(e) => ("queue full", e),
                mpsc::error::TrySendError::Closed(e) => ("queue closed", e),
            };
            warn!(
                receipt_code = %event.receipt_code,
                event_type = %event.event_type,
                reason,
                "dropping transaction event"
            );
        }
    }

    /// Live events from now on. Lagging subscribers skip what they missed.
    pub fn subscribe(&self) -> impl Stream<Item = TransactionEvent> + Send + 'static {
        BroadcastStream::new(self.inner.stream_tx.subscribe()).filter_map(|msg| match msg {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "event subscriber lagged");
                None
            }
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.stream_tx.receiver_count()
    }

    /// Events accepted for delivery and not yet finished.
    pub fn queue_depth(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Waits until the delivery queue drains. Returns false on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.queue_depth() > 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }
}

async fn run_worker(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<TransactionEvent>>>,
    sinks: Arc<[Arc<dyn EventSink>]>,
    inner: std::sync::Weak<Inner>,
    policy: RetryPolicy,
    call_timeout: Duration,
) {
    loop {
        let next = { rx.lock().await.recv().await };
        let Some(event) = next else {
            debug!(worker, "event queue closed, worker exiting");
            return;
        };

        for sink in sinks.iter() {
            deliver_with_retry(sink.as_ref(), &event, policy, call_timeout).await;
        }

        if let Some(inner) = inner.upgrade() {
            inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Delivers one event to one sink. Rejections are final; other failures
/// are retried with backoff until the policy gives up.
async fn deliver_with_retry(
    sink: &dyn EventSink,
    event: &TransactionEvent,
    policy: RetryPolicy,
    call_timeout: Duration,
) -> bool {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let result = match tokio::time::timeout(call_timeout, sink.deliver(event)).await {
            Ok(result) => result,
            Err(_) => Err(CollaboratorError::Timeout),
        };

        match result {
            Ok(()) => {
                debug!(sink = sink.name(), receipt_code = %event.receipt_code, attempt, "event delivered");
                return true;
            }
            Err(CollaboratorError::Rejected(reason)) => {
                warn!(sink = sink.name(), receipt_code = %event.receipt_code, %reason, "event rejected");
                return false;
            }
            Err(err) if attempt < attempts => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    sink = sink.name(),
                    receipt_code = %event.receipt_code,
                    attempt,
                    ?delay,
                    error = %err,
                    "event delivery failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                error!(
                    sink = sink.name(),
                    receipt_code = %event.receipt_code,
                    attempts,
                    error = %err,
                    "event delivery abandoned"
                );
            }
        }
    }
    false
}

/// Writes every event to the log.
#[derive(Debug, Default)]
pub struct LoggingSink;

#[async_trait]
impl EventSink for LoggingSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, event: &TransactionEvent) -> Result<(), CollaboratorError> {
        info!(
            event_type = %event.event_type,
            receipt_code = %event.receipt_code,
            amount = event.amount,
            currency = %event.currency,
            "transaction event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_types::domain::{EventMetadata, JournalDraft};
    use ledger_types::{AccountType, Currency, JournalStatus, TransactionType};

    /// Fails the first `failures` calls with `error`, then records events.
    struct FlakySink {
        failures: AtomicUsize,
        error: CollaboratorError,
        calls: AtomicUsize,
        delivered: std::sync::Mutex<Vec<String>>,
        delay: Duration,
    }

    impl FlakySink {
        fn new(failures: usize, error: CollaboratorError) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                error,
                calls: AtomicUsize::new(0),
                delivered: std::sync::Mutex::new(Vec::new()),
                delay: Duration::ZERO,
            }
        }

        fn delivered(&self) -> Vec<String> {
            self.delivered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventSink for FlakySink {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn deliver(&self, event: &TransactionEvent) -> Result<(), CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(self.error.clone());
            }
            self.delivered.lock().unwrap().push(event.receipt_code.clone());
            Ok(())
        }
    }

    fn config() -> EngineConfig {
        EngineConfig {
            event_queue_capacity: 16,
            event_workers: 2,
            event_retry: RetryPolicy {
                max_attempts: 4,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
            collaborator_timeout: Duration::from_millis(200),
            ..EngineConfig::default()
        }
    }

    fn event(n: u64) -> TransactionEvent {
        let draft = JournalDraft::new(
            format!("DP-2025-{:012}", n),
            TransactionType::Deposit,
            1000,
            Currency::KES,
        );
        TransactionEvent::from_journal(
            &draft.to_journal(JournalStatus::Completed),
            EventMetadata::new(AccountType::Real),
        )
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let sink = Arc::new(FlakySink::new(2, CollaboratorError::Unavailable("503".into())));
        let publisher = EventPublisher::start(vec![sink.clone()], &config());

        publisher.publish(event(1));
        assert!(publisher.wait_idle(Duration::from_secs(2)).await);

        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert_eq!(sink.delivered(), vec!["DP-2025-000000000001".to_string()]);
    }

    #[tokio::test]
    async fn test_rejections_are_not_retried() {
        let sink = Arc::new(FlakySink::new(1, CollaboratorError::Rejected("400".into())));
        let publisher = EventPublisher::start(vec![sink.clone()], &config());

        publisher.publish(event(1));
        assert!(publisher.wait_idle(Duration::from_secs(2)).await);

        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert!(sink.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let sink = Arc::new(FlakySink::new(10, CollaboratorError::Timeout));
        let publisher = EventPublisher::start(vec![sink.clone()], &config());

        publisher.publish(event(1));
        assert!(publisher.wait_idle(Duration::from_secs(2)).await);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let mut slow = FlakySink::new(0, CollaboratorError::Timeout);
        slow.delay = Duration::from_millis(50);
        let sink = Arc::new(slow);
        let config = EngineConfig {
            event_queue_capacity: 2,
            event_workers: 1,
            ..config()
        };
        let publisher = EventPublisher::start(vec![sink.clone()], &config);

        for n in 0..10 {
            publisher.publish(event(n));
        }
        assert!(publisher.dropped_count() >= 7);
        assert!(publisher.wait_idle(Duration::from_secs(2)).await);
        assert_eq!(
            sink.delivered().len() as u64 + publisher.dropped_count(),
            10
        );
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let publisher = EventPublisher::start(Vec::new(), &config());
        let mut stream = Box::pin(publisher.subscribe());
        assert_eq!(publisher.subscriber_count(), 1);

        publisher.publish(event(7));
        let received = stream.next().await.unwrap();
        assert_eq!(received.receipt_code, "DP-2025-000000000007");
        assert_eq!(received.event_type, "deposit.completed");
        assert_eq!(publisher.queue_depth(), 0);
    }
}
