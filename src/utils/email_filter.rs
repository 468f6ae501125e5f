use std::sync::RwLock;

use anyhow::Result;
use autoscale_cuckoo_filter::CuckooFilter;

use crate::store::CredentialStore;

/// Expected capacity and false-positive rate.
/// Tune these based on real headcount.
const FILTER_CAPACITY: usize = 100_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

/// Probabilistic set of registered emails: a miss proves the email is free.
pub struct EmailFilter {
    inner: RwLock<CuckooFilter<String>>,
}

impl EmailFilter {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)),
        }
    }

    /// Check if an email might be registered (false positives possible)
    pub fn might_exist(&self, email: &str) -> bool {
        self.inner
            .read()
            .expect("email filter poisoned")
            .contains(&email.to_string())
    }

    pub fn insert(&self, email: &str) {
        self.inner
            .write()
            .expect("email filter poisoned")
            .add(&email.to_string());
    }

    fn insert_batch(&self, emails: &[String]) {
        let mut filter = self.inner.write().expect("email filter poisoned");

        for email in emails {
            filter.add(email);
        }
    }
}

impl Default for EmailFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Load every registered email into the filter, in batches.
pub async fn warmup_email_filter(
    filter: &EmailFilter,
    store: &dyn CredentialStore,
    batch_size: usize,
) -> Result<()> {
    let emails = store.list_emails().await?;
    let total = emails.len();

    for batch in emails.chunks(batch_size.max(1)) {
        filter.insert_batch(batch);
    }

    log::info!("Email filter warmup complete: {} credentials", total);
    Ok(())
}
