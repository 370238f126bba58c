pub mod outbox;

use async_trait::async_trait;

use crate::models::OutgoingEmail;

/// Hands finished emails to whatever delivers them.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, email: &OutgoingEmail) -> anyhow::Result<()>;
}
