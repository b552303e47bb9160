use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::filter::{filter_items, FilterParams};
use crate::model::CombinedItem;

#[derive(Default)]
struct Published {
    items: Arc<Vec<CombinedItem>>,
    at:    Option<DateTime<Utc>>,
}

/// Latest published result set. Writers swap a whole new collection in;
/// readers hold an `Arc` to whichever collection was current when they asked.
#[derive(Default)]
pub struct ResultStore {
    latest: RwLock<Published>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, items: Vec<CombinedItem>) {
        let count = items.len();
        let fresh = Published { items: Arc::new(items), at: Some(Utc::now()) };
        *self.latest.write().await = fresh;
        info!("Published {count} combined items");
    }

    pub async fn snapshot(&self) -> Arc<Vec<CombinedItem>> {
        Arc::clone(&self.latest.read().await.items)
    }

    /// `None` until the first publish.
    pub async fn published_at(&self) -> Option<DateTime<Utc>> {
        self.latest.read().await.at
    }

    pub async fn filter_latest(&self, params: &FilterParams) -> Vec<CombinedItem> {
        let snap = self.snapshot().await;
        filter_items(&snap, params)
    }

    pub async fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        let snap = self.snapshot().await;
        serde_json::to_vec(&*snap)
    }
}
