//! In-memory notification inbox.
//!
//! Entries are kept newest first. Ids are unique: appending an id that is
//! already present replaces its content where it stands instead of adding a
//! second entry.

use alerta_shared::Notification;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct NotificationStore {
    entries: Vec<Notification>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the front. Returns false when the id was already present
    /// and the existing entry was updated instead.
    pub fn append(&mut self, notification: Notification) -> bool {
        if let Some(existing) = self.entries.iter_mut().find(|n| n.id == notification.id) {
            // Read state only moves forward.
            let read = existing.read || notification.read;
            *existing = notification;
            existing.read = read;
            return false;
        }
        self.entries.insert(0, notification);
        true
    }

    /// Returns whether an unread entry flipped to read.
    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.entries.iter_mut().find(|n| n.id == id) {
            Some(n) if !n.read => {
                n.read = true;
                true
            }
            _ => false,
        }
    }

    /// Returns how many entries flipped to read.
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for n in self.entries.iter_mut().filter(|n| !n.read) {
            n.read = true;
            changed += 1;
        }
        changed
    }

    pub fn remove(&mut self, id: &str) -> Option<Notification> {
        let index = self.entries.iter().position(|n| n.id == id)?;
        Some(self.entries.remove(index))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn unread_count(&self) -> usize {
        self.entries.iter().filter(|n| !n.read).count()
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.entries.iter().find(|n| n.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Notification> {
        self.entries.clone()
    }
}
