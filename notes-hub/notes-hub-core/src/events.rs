use crate::access::AccessBitmask;
use crate::permission::Grantee;
use crate::principal::PageId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// A permission mutation that may change resolved access below `page`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Change {
    Granted {
        record: u64,
        page: PageId,
        grantee: Grantee,
        access: AccessBitmask,
    },
    Revoked {
        record: u64,
        page: PageId,
        grantee: Grantee,
    },
}

impl Change {
    pub fn page(&self) -> PageId {
        match self {
            Change::Granted { page, .. } | Change::Revoked { page, .. } => *page,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub change: Change,
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Lagged receivers surface as `Err` items.
    pub fn stream(&self) -> BroadcastStream<Event> {
        BroadcastStream::new(self.tx.subscribe())
    }

    pub fn send(&self, change: Change) {
        let _ = self.tx.send(Event {
            at: Utc::now(),
            change,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::UserId;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn subscribers_see_changes() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let mut stream = bus.stream();

        bus.send(Change::Revoked {
            record: 4,
            page: PageId(9),
            grantee: Grantee::User(UserId(200)),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.change.page(), PageId(9));
        let streamed = stream.next().await.unwrap().unwrap();
        assert_eq!(streamed.change, event.change);
    }

    #[test]
    fn sending_without_subscribers_is_fine() {
        EventBus::default().send(Change::Granted {
            record: 1,
            page: PageId(1),
            grantee: Grantee::User(UserId(3)),
            access: AccessBitmask::READ,
        });
    }

    #[test]
    fn serializes_flat() {
        let event = Event {
            at: Utc::now(),
            change: Change::Granted {
                record: 1,
                page: PageId(5),
                grantee: Grantee::User(UserId(3)),
                access: AccessBitmask::READ,
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "Granted");
        assert_eq!(value["page"], 5);
        assert_eq!(value["access"], 1);
        assert_eq!(value["grantee"]["user"], 3);
    }
}
