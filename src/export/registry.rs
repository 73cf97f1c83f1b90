use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_CARD_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone)]
pub struct ShareCard {
    pub owner: Uuid,
    pub png: Bytes,
    pub file_name: String,
    created: Instant,
}

/// Rendered share cards, addressable by id until revoked or expired.
pub struct ShareCardRegistry {
    cards: DashMap<Uuid, ShareCard>,
    ttl: Duration,
}

impl Default for ShareCardRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CARD_TTL)
    }
}

impl ShareCardRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cards: DashMap::new(),
            ttl,
        }
    }

    fn sweep(&self) {
        let before = self.cards.len();
        self.cards.retain(|_, c| c.created.elapsed() < self.ttl);
        let swept = before.saturating_sub(self.cards.len());
        if swept > 0 {
            debug!(swept, "expired share cards dropped");
        }
    }

    pub fn register(&self, owner: Uuid, png: Bytes, file_name: String) -> Uuid {
        self.sweep();
        let id = Uuid::new_v4();
        self.cards.insert(
            id,
            ShareCard {
                owner,
                png,
                file_name,
                created: Instant::now(),
            },
        );
        id
    }

    /// The card, if it exists, belongs to `owner` and has not expired.
    pub fn get(&self, owner: Uuid, id: Uuid) -> Option<ShareCard> {
        self.cards
            .get(&id)
            .filter(|c| c.owner == owner && c.created.elapsed() < self.ttl)
            .map(|c| c.value().clone())
    }

    pub fn revoke(&self, owner: Uuid, id: Uuid) -> bool {
        self.cards.remove_if(&id, |_, c| c.owner == owner).is_some()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

pub fn card_url(id: Uuid) -> String {
    format!("/api/v1/share-cards/{}", id)
}
