//! Notification intents and the dispatcher seam.
//!
//! The engine only decides *when* a notification is owed; delivery (SMS,
//! email) belongs to an external collaborator behind the trait. Intents are
//! emitted at most once per state transition because every caller gates on
//! the store's `changed` flag.

use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NotificationKind {
    AdvanceApproved,
    PaymentFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationIntent {
    pub kind: NotificationKind,
    pub recipient_contact: String,
    pub amount: i64,
    pub reference: String,
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, intent: NotificationIntent);
}

/// Default dispatcher: records the intent in the log stream. Swapped for a
/// real SMS/email bridge in deployments that have one.
#[derive(Debug, Clone, Default)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn dispatch(&self, intent: NotificationIntent) {
        tracing::info!(
            kind = ?intent.kind,
            recipient = %intent.recipient_contact,
            amount = intent.amount,
            reference = %intent.reference,
            "notification intent emitted"
        );
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Captures intents so tests can assert on exactly-once emission.
    #[derive(Debug, Default)]
    pub struct RecordingDispatcher {
        pub intents: Mutex<Vec<NotificationIntent>>,
    }

    #[async_trait]
    impl NotificationDispatcher for RecordingDispatcher {
        async fn dispatch(&self, intent: NotificationIntent) {
            self.intents.lock().expect("intents lock").push(intent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingDispatcher;
    use super::*;

    #[tokio::test]
    async fn recording_dispatcher_captures_intents() {
        let dispatcher = RecordingDispatcher::default();

        dispatcher
            .dispatch(NotificationIntent {
                kind: NotificationKind::AdvanceApproved,
                recipient_contact: "+22501020304".to_string(),
                amount: 75_000,
                reference: "P1".to_string(),
            })
            .await;

        let intents = dispatcher.intents.lock().unwrap();
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].kind, NotificationKind::AdvanceApproved);
        assert_eq!(intents[0].reference, "P1");
    }
}
