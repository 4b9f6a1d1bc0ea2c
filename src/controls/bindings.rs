use std::sync::{Mutex, MutexGuard};

use crate::hardware::{CHANNEL_COUNT, ChannelId};
use crate::system::audio::{Target, TargetId};

/// Channel to target associations for the running process.
///
/// Every channel has its own lock, so channels never wait on each other.
#[derive(Debug, Default)]
pub struct BindingRegistry {
    entries: [Mutex<Option<Target>>; CHANNEL_COUNT],
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel: ChannelId) -> Option<Target> {
        self.entry(channel).clone()
    }

    pub fn is_bound(&self, channel: ChannelId) -> bool {
        self.entry(channel).is_some()
    }

    /// Returns the previous binding.
    pub fn bind(&self, channel: ChannelId, target: Option<Target>) -> Option<Target> {
        std::mem::replace(&mut *self.entry(channel), target)
    }

    /// Unbinds `channel` if it is still bound to `target`. Returns whether it was.
    pub fn invalidate(&self, channel: ChannelId, target: &TargetId) -> bool {
        let mut entry = self.entry(channel);
        let matches = entry
            .as_ref()
            .map(|bound| &bound.id == target)
            .unwrap_or(false);
        if matches {
            *entry = None;
        }
        matches
    }

    pub fn snapshot(&self) -> [Option<Target>; CHANNEL_COUNT] {
        ChannelId::all().map(|channel| self.get(channel))
    }

    fn entry(&self, channel: ChannelId) -> MutexGuard<'_, Option<Target>> {
        self.entries[channel.index()]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
