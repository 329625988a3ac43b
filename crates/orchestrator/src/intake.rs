//! Pending inbound messages, grouped by channel.

use std::{collections::BTreeMap, sync::Mutex};

use {
    tokio::sync::{Notify, futures::Notified},
    tracing::trace,
    trinity_channels::InboundSink,
    trinity_common::{ChannelId, Message},
};

#[cfg(feature = "metrics")]
use trinity_metrics::{counter, gauge, intake as intake_metrics};

/// Channel id → messages waiting for the next drain, in arrival order.
///
/// Written by transports, drained by the scheduler. The lock is only held
/// for a push or a swap, never across an await.
#[derive(Debug, Default)]
pub struct IntakeBuffer {
    channels: Mutex<BTreeMap<ChannelId, Vec<Message>>>,
    notify: Notify,
}

impl IntakeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `message` to its channel's batch. Never fails.
    pub fn enqueue(&self, message: Message) {
        let channel_id = message.channel_id;
        {
            let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
            channels.entry(channel_id).or_default().push(message);
            #[cfg(feature = "metrics")]
            gauge!(intake_metrics::PENDING_MESSAGES)
                .set(channels.values().map(Vec::len).sum::<usize>() as f64);
        }
        trace!(channel_id = %channel_id, "message enqueued");
        #[cfg(feature = "metrics")]
        counter!(intake_metrics::MESSAGES_ENQUEUED_TOTAL).increment(1);
        self.notify.notify_one();
    }

    /// Take every pending batch, leaving the buffer empty.
    ///
    /// Messages enqueued after the swap wait for the next drain.
    pub fn drain_all(&self) -> BTreeMap<ChannelId, Vec<Message>> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let drained = std::mem::take(&mut *channels);
        drop(channels);
        #[cfg(feature = "metrics")]
        gauge!(intake_metrics::PENDING_MESSAGES).set(0.0);
        drained
    }

    pub fn is_empty(&self) -> bool {
        self.channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .all(Vec::is_empty)
    }

    /// Total number of pending messages across channels.
    pub fn pending(&self) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Resolves after the next enqueue, or at once if one happened since the
    /// last wake-up.
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }
}

impl InboundSink for IntakeBuffer {
    fn on_message(&self, message: Message) {
        self.enqueue(message);
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::{sync::Arc, time::Duration},
    };

    #[test]
    fn groups_by_channel_in_arrival_order() {
        let intake = IntakeBuffer::new();
        intake.enqueue(Message::now(7, "general", "alice", "one"));
        intake.enqueue(Message::now(3, "dev", "bob", "two"));
        intake.enqueue(Message::now(7, "general", "carol", "three"));
        assert_eq!(intake.pending(), 3);

        let drained = intake.drain_all();
        let ids: Vec<u64> = drained.keys().map(|k| k.0).collect();
        assert_eq!(ids, vec![3, 7]);
        let general: Vec<&str> = drained[&ChannelId(7)]
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(general, vec!["one", "three"]);

        assert!(intake.is_empty());
        assert_eq!(intake.pending(), 0);
    }

    #[test]
    fn numeric_channel_order() {
        let intake = IntakeBuffer::new();
        intake.enqueue(Message::now(10, "b", "x", "m"));
        intake.enqueue(Message::now(9, "a", "x", "m"));
        let ids: Vec<u64> = intake.drain_all().keys().map(|k| k.0).collect();
        assert_eq!(ids, vec![9, 10]);
    }

    #[test]
    fn inbound_callback_enqueues() {
        let intake = Arc::new(IntakeBuffer::new());
        let sink: Arc<dyn InboundSink> = intake.clone();
        sink.on_inbound(
            "hello",
            "alice",
            "general",
            vec!["Trinity".into()],
            ChannelId(42),
            chrono::Utc::now(),
        );
        let drained = intake.drain_all();
        let msg = &drained[&ChannelId(42)][0];
        assert_eq!(msg.author, "alice");
        assert_eq!(msg.mentions, vec!["Trinity"]);
    }

    #[test]
    fn concurrent_enqueue_during_drains_loses_nothing() {
        let intake = Arc::new(IntakeBuffer::new());
        let writers: Vec<_> = (0..4u64)
            .map(|w| {
                let intake = Arc::clone(&intake);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        intake.enqueue(Message::now(w, "c", "u", i.to_string()));
                    }
                })
            })
            .collect();

        let mut seen = 0;
        while writers.iter().any(|w| !w.is_finished()) {
            seen += intake.drain_all().values().map(Vec::len).sum::<usize>();
        }
        for w in writers {
            w.join().unwrap();
        }
        seen += intake.drain_all().values().map(Vec::len).sum::<usize>();
        assert_eq!(seen, 1000);
    }

    #[tokio::test]
    async fn enqueue_wakes_waiter() {
        let intake = Arc::new(IntakeBuffer::new());
        let waiter = {
            let intake = Arc::clone(&intake);
            tokio::spawn(async move { intake.notified().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        intake.enqueue(Message::now(1, "c", "u", "wake"));
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
