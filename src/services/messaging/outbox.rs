use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::Mailer;
use crate::models::{OutboxEntry, OutgoingEmail};

/// In-process mailbox of everything the clinic has sent. Each delivery is also broadcast to
/// live subscribers.
pub struct Outbox {
    from: String,
    entries: Mutex<Vec<OutboxEntry>>,
    tx: broadcast::Sender<OutboxEntry>,
}

impl Outbox {
    pub fn new(from: String) -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            from,
            entries: Mutex::new(Vec::new()),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutboxEntry> {
        self.tx.subscribe()
    }

    pub fn entries(&self) -> Vec<OutboxEntry> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    pub fn entries_since(&self, last_id: i64) -> Vec<OutboxEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.id > last_id)
            .collect()
    }
}

#[async_trait]
impl Mailer for Outbox {
    async fn deliver(&self, email: &OutgoingEmail) -> anyhow::Result<()> {
        anyhow::ensure!(
            !email.to.trim().is_empty(),
            "refusing {} email for run {} with no recipient",
            email.kind.as_str(),
            email.run_id
        );

        let entry = {
            let mut entries = self
                .entries
                .lock()
                .map_err(|_| anyhow::anyhow!("outbox lock poisoned"))?;
            let entry = OutboxEntry {
                id: entries.len() as i64 + 1,
                run_id: email.run_id,
                kind: email.kind.clone(),
                from: self.from.clone(),
                to: email.to.clone(),
                subject: email.subject.clone(),
                body: email.body.clone(),
                created_at: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            };
            entries.push(entry.clone());
            entry
        };

        tracing::info!(
            run_id = %entry.run_id,
            kind = entry.kind.as_str(),
            to = %entry.to,
            "email placed in outbox"
        );

        // Broadcast to SSE subscribers; ignore if no receivers
        let _ = self.tx.send(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::models::EmailKind;

    fn email(kind: EmailKind) -> OutgoingEmail {
        OutgoingEmail {
            run_id: Uuid::new_v4(),
            kind,
            to: "patientx@gmail.com".into(),
            subject: "Re: Appointment".into(),
            body: "body".into(),
        }
    }

    #[tokio::test]
    async fn test_deliver_records_and_broadcasts() {
        let outbox = Outbox::new("doctor@gmail.com".into());
        let mut rx = outbox.subscribe();

        outbox.deliver(&email(EmailKind::ProposedSlots)).await.unwrap();
        outbox.deliver(&email(EmailKind::Confirmation)).await.unwrap();

        let entries = outbox.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, 1);
        assert_eq!(entries[1].kind, EmailKind::Confirmation);
        assert_eq!(entries[1].from, "doctor@gmail.com");

        let first = rx.recv().await.unwrap();
        assert_eq!(first.id, 1);
    }

    #[tokio::test]
    async fn test_email_without_recipient_is_refused() {
        let outbox = Outbox::new("doctor@gmail.com".into());
        let mut blank = email(EmailKind::Confirmation);
        blank.to = "  ".into();

        let err = outbox.deliver(&blank).await.unwrap_err();
        assert!(err.to_string().contains("no recipient"));
        assert!(outbox.entries().is_empty());
    }

    #[tokio::test]
    async fn test_entries_since() {
        let outbox = Outbox::new("doctor@gmail.com".into());
        for _ in 0..3 {
            outbox.deliver(&email(EmailKind::ProposedSlots)).await.unwrap();
        }
        let ids: Vec<i64> = outbox.entries_since(1).iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }
}
