use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Email-style notifications produced by the payment flows.
///
/// Delivery is best-effort and at-least-once: it happens on an independent
/// worker and failures never affect booking or payment state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Notification {
    /// "Complete your payment" reminder carrying the gateway checkout page.
    PaymentReminder {
        recipient: String,
        checkout_url: String,
    },
    /// Confirmation sent after a payment reaches `completed`.
    PaymentConfirmation { recipient: String, booking_id: Uuid },
}

impl Notification {
    fn recipient(&self) -> &str {
        match self {
            Notification::PaymentReminder { recipient, .. } => recipient,
            Notification::PaymentConfirmation { recipient, .. } => recipient,
        }
    }

    fn subject(&self) -> &'static str {
        match self {
            Notification::PaymentReminder { .. } => "Complete your booking payment",
            Notification::PaymentConfirmation { .. } => "Payment Successful",
        }
    }

    fn body(&self) -> String {
        match self {
            Notification::PaymentReminder { checkout_url, .. } => format!(
                "Please complete your payment by visiting the link: {}",
                checkout_url
            ),
            Notification::PaymentConfirmation { booking_id, .. } => format!(
                "Your payment for booking {} has been successfully completed.",
                booking_id
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Transport seam for outbound mail. Production wires an SMTP/provider-backed
/// implementation; tests inject a capturing stub.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotificationError>;
}

/// Default sender that records deliveries in the log stream only.
pub struct LoggingEmailSender;

#[async_trait]
impl EmailSender for LoggingEmailSender {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        _body: &str,
    ) -> Result<(), NotificationError> {
        info!(%recipient, subject, "delivering notification email");
        Ok(())
    }
}

/// Hands notifications to a bounded queue consumed by an independent worker.
///
/// `enqueue` never blocks the request path; when the queue is full the
/// notification is dropped with a warning.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<Notification>,
}

impl NotificationDispatcher {
    /// Creates the dispatcher and spawns its delivery worker.
    pub fn start(capacity: usize, sender: Arc<dyn EmailSender>) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        tokio::spawn(deliver_notifications(rx, sender));
        Self { tx }
    }

    /// Fire-and-forget enqueue; the HTTP response never waits on delivery.
    pub fn enqueue(&self, notification: Notification) {
        if let Err(err) = self.tx.try_send(notification) {
            warn!(error = %err, "notification queue full, dropping notification");
        }
    }
}

async fn deliver_notifications(
    mut rx: mpsc::Receiver<Notification>,
    sender: Arc<dyn EmailSender>,
) {
    info!("Starting notification delivery worker");

    while let Some(notification) = rx.recv().await {
        let recipient = notification.recipient().to_string();
        if let Err(err) = sender
            .send(&recipient, notification.subject(), &notification.body())
            .await
        {
            // Best-effort only; the originating transaction already committed.
            error!(%recipient, error = %err, "notification delivery failed");
        }
    }

    warn!("Notification delivery worker has ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    struct CaptureSender {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl EmailSender for CaptureSender {
        async fn send(
            &self,
            recipient: &str,
            subject: &str,
            _body: &str,
        ) -> Result<(), NotificationError> {
            self.sent
                .lock()
                .await
                .push((recipient.to_string(), subject.to_string()));
            Ok(())
        }
    }

    struct FailingSender;

    #[async_trait]
    impl EmailSender for FailingSender {
        async fn send(&self, _: &str, _: &str, _: &str) -> Result<(), NotificationError> {
            Err(NotificationError::Delivery("smtp down".into()))
        }
    }

    #[tokio::test]
    async fn enqueued_notifications_are_delivered() {
        let sender = Arc::new(CaptureSender {
            sent: Mutex::new(Vec::new()),
        });
        let dispatcher = NotificationDispatcher::start(8, sender.clone());

        dispatcher.enqueue(Notification::PaymentReminder {
            recipient: "guest@example.com".into(),
            checkout_url: "https://checkout.test/abc".into(),
        });
        dispatcher.enqueue(Notification::PaymentConfirmation {
            recipient: "guest@example.com".into(),
            booking_id: Uuid::new_v4(),
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let sent = sender.sent.lock().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].1, "Complete your booking payment");
        assert_eq!(sent[1].1, "Payment Successful");
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        let dispatcher = NotificationDispatcher::start(8, Arc::new(FailingSender));

        // Must not panic or surface an error to the caller.
        dispatcher.enqueue(Notification::PaymentReminder {
            recipient: "guest@example.com".into(),
            checkout_url: "https://checkout.test/abc".into(),
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        // Worker that never drains: use a zero-capacity-ish tiny channel by
        // pausing delivery behind a long sleep.
        struct SlowSender;

        #[async_trait]
        impl EmailSender for SlowSender {
            async fn send(&self, _: &str, _: &str, _: &str) -> Result<(), NotificationError> {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                Ok(())
            }
        }

        let dispatcher = NotificationDispatcher::start(1, Arc::new(SlowSender));
        for _ in 0..16 {
            dispatcher.enqueue(Notification::PaymentReminder {
                recipient: "guest@example.com".into(),
                checkout_url: "https://checkout.test/abc".into(),
            });
        }
        // Reaching this point without awaiting proves enqueue never blocked.
    }
}
