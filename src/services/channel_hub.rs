//! In-process registry of loaded channels and the viewers connected to them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Kicked { reason: String },
}

#[derive(Debug)]
struct Member {
    name: String,
    tx: mpsc::UnboundedSender<ChannelEvent>,
}

#[derive(Debug)]
struct LiveChannel {
    registered: bool,
    members: HashMap<u64, Member>,
}

/// Handle returned by [`ChannelHub::join`].
#[derive(Debug)]
pub struct Membership {
    pub id: u64,
    pub channel: String,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSnapshot {
    pub registered: bool,
    pub members: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ChannelHub {
    channels: Mutex<HashMap<String, LiveChannel>>,
    next_member_id: AtomicU64,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, LiveChannel>> {
        // 临界区内不会 panic，中毒时直接取回数据
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds `member` to the channel, loading it first if nobody is connected.
    /// `registered` only applies when this join loads the channel.
    pub fn join(&self, channel: &str, member: &str, registered: bool) -> Membership {
        let key = channel.to_lowercase();
        let id = self.next_member_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut channels = self.lock();
        let live = channels.entry(key.clone()).or_insert_with(|| {
            tracing::debug!(channel = %key, "Loading channel");
            LiveChannel {
                registered,
                members: HashMap::new(),
            }
        });
        live.members.insert(
            id,
            Member {
                name: member.to_string(),
                tx,
            },
        );

        Membership {
            id,
            channel: key,
            events: rx,
        }
    }

    pub fn is_loaded(&self, channel: &str) -> bool {
        self.lock().contains_key(&channel.to_lowercase())
    }

    /// Removes a member. The channel unloads when its last member leaves.
    pub fn leave(&self, channel: &str, member_id: u64) {
        let key = channel.to_lowercase();
        let mut channels = self.lock();
        let Some(live) = channels.get_mut(&key) else {
            return;
        };
        live.members.remove(&member_id);
        if live.members.is_empty() {
            channels.remove(&key);
            tracing::debug!(channel = %key, "Channel empty, unloaded");
        }
    }

    /// Kicks everyone out of a loaded channel with `reason` and unloads it,
    /// so the next join reads the registration from the store again.
    /// Returns the number of members kicked, or `None` when the channel was
    /// not loaded.
    pub fn reload(&self, channel: &str, reason: &str) -> Option<usize> {
        let key = channel.to_lowercase();
        let mut live = self.lock().remove(&key)?;

        let kicked = live.members.len();
        for (_, member) in live.members.drain() {
            // 接收端已断开时忽略
            let _ = member.tx.send(ChannelEvent::Kicked {
                reason: reason.to_string(),
            });
            tracing::debug!(channel = %key, member = %member.name, reason, "Member kicked");
        }

        Some(kicked)
    }

    pub fn snapshot(&self, channel: &str) -> Option<ChannelSnapshot> {
        let channels = self.lock();
        let live = channels.get(&channel.to_lowercase())?;
        let mut members: Vec<String> = live.members.values().map(|m| m.name.clone()).collect();
        members.sort();
        Some(ChannelSnapshot {
            registered: live.registered,
            members,
        })
    }
}
