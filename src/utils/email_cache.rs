use std::time::Duration;

use anyhow::Result;
use moka::future::Cache;

use crate::store::CredentialStore;

/// Emails known to be TAKEN. Absence means "ask the store".
pub struct EmailCache {
    inner: Cache<String, ()>,
}

impl EmailCache {
    pub fn new() -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(500_000) // tune based on memory
                .time_to_live(Duration::from_secs(86400)) // 24h TTL
                .build(),
        }
    }

    pub async fn mark_taken(&self, email: &str) {
        self.inner.insert(email.to_string(), ()).await;
    }

    pub async fn is_taken(&self, email: &str) -> bool {
        self.inner.get(email).await.is_some()
    }

    async fn batch_mark(&self, emails: &[String]) {
        let futures: Vec<_> = emails
            .iter()
            .map(|e| self.inner.insert(e.clone(), ()))
            .collect();

        futures::future::join_all(futures).await;
    }
}

impl Default for EmailCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Prime the cache with registered emails (batched).
pub async fn warmup_email_cache(
    cache: &EmailCache,
    store: &dyn CredentialStore,
    batch_size: usize,
) -> Result<()> {
    let emails = store.list_emails().await?;

    for batch in emails.chunks(batch_size.max(1)) {
        cache.batch_mark(batch).await;
    }

    log::info!("Email cache warmup complete: {} credentials", emails.len());
    Ok(())
}
