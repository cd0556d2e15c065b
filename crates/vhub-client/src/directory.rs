//! Conversation directory: the counterparts list with unread counts and the
//! current selection.
//!
//! Server refreshes are merged, never blindly applied. Unread increments that
//! arrive between [`ConversationDirectory::begin_refresh`] and
//! [`ConversationDirectory::apply_refresh`] are not part of the server's
//! answer, so they are kept on top of it.

use std::collections::HashMap;

use vhub_shared::types::{ConversationEntry, Message, UserId, UserRef};

use crate::error::ValidationError;

/// Where an incoming pushed message belongs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routing {
    /// The sender is the selected counterpart: append to the open thread.
    Thread,
    /// Counted as unread for the sender.
    Unread { count: u32, new_entry: bool },
}

#[derive(Debug, Default)]
pub struct ConversationDirectory {
    entries: Vec<ConversationEntry>,
    /// Unread increments since the in-flight refresh was issued.
    pending: HashMap<UserId, u32>,
    selected: Option<UserRef>,
}

impl ConversationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn get(&self, id: &UserId) -> Option<&ConversationEntry> {
        self.entries.iter().find(|e| &e.counterpart.id == id)
    }

    pub fn unread_count(&self, id: &UserId) -> u32 {
        self.get(id).map_or(0, |e| e.unread_count)
    }

    pub fn total_unread(&self) -> u32 {
        self.entries.iter().map(|e| e.unread_count).sum()
    }

    pub fn selected(&self) -> Option<&UserRef> {
        self.selected.as_ref()
    }

    pub fn is_selected(&self, id: &UserId) -> bool {
        self.selected.as_ref().is_some_and(|s| &s.id == id)
    }

    /// Start a new accumulation window for a refresh about to be issued.
    pub fn begin_refresh(&mut self) {
        self.pending.clear();
    }

    /// Merge a server listing. Server order is kept; entries only known
    /// locally (with increments since the refresh began, or currently
    /// selected) are appended after it.
    pub fn apply_refresh(&mut self, fresh: Vec<ConversationEntry>) {
        let previous = std::mem::take(&mut self.entries);
        let mut merged = Vec::with_capacity(fresh.len());

        for mut entry in fresh {
            let id = entry.counterpart.id.clone();
            if merged.iter().any(|e: &ConversationEntry| e.counterpart.id == id) {
                continue;
            }
            entry.unread_count += self.pending.get(&id).copied().unwrap_or(0);
            if entry.counterpart.display_name.is_empty() {
                if let Some(old) = previous.iter().find(|e| e.counterpart.id == id) {
                    entry.counterpart.display_name = old.counterpart.display_name.clone();
                }
            }
            merged.push(entry);
        }

        for old in previous {
            let id = &old.counterpart.id;
            if merged.iter().any(|e| &e.counterpart.id == id) {
                continue;
            }
            if self.pending.contains_key(id) || self.is_selected(id) {
                merged.push(old);
            }
        }

        if let Some(selected) = &self.selected {
            if let Some(entry) = merged.iter_mut().find(|e| e.counterpart.id == selected.id) {
                entry.unread_count = 0;
            }
        }

        self.entries = merged;
        self.pending.clear();
    }

    /// Select a counterpart from the directory and zero its unread count.
    pub fn select(&mut self, id: &UserId) -> Result<UserRef, ValidationError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| &e.counterpart.id == id)
            .ok_or_else(|| ValidationError::UnknownCounterpart(id.clone()))?;

        entry.unread_count = 0;
        let counterpart = entry.counterpart.clone();
        self.pending.remove(id);
        self.selected = Some(counterpart.clone());
        Ok(counterpart)
    }

    pub fn deselect(&mut self) -> Option<UserRef> {
        self.selected.take()
    }

    pub fn reset_unread(&mut self, id: &UserId) {
        if let Some(entry) = self.entries.iter_mut().find(|e| &e.counterpart.id == id) {
            entry.unread_count = 0;
        }
        self.pending.remove(id);
    }

    /// Route a pushed message: to the open thread when it comes from the
    /// selected counterpart, otherwise into the sender's unread count.
    pub fn on_message_received(&mut self, message: &Message) -> Routing {
        let sender = &message.sender;
        if self.is_selected(&sender.id) {
            return Routing::Thread;
        }

        *self.pending.entry(sender.id.clone()).or_insert(0) += 1;

        match self
            .entries
            .iter_mut()
            .find(|e| e.counterpart.id == sender.id)
        {
            Some(entry) => {
                entry.unread_count += 1;
                if entry.counterpart.display_name.is_empty() {
                    entry.counterpart.display_name = sender.display_name.clone();
                }
                Routing::Unread {
                    count: entry.unread_count,
                    new_entry: false,
                }
            }
            None => {
                self.entries.push(ConversationEntry {
                    counterpart: sender.clone(),
                    unread_count: 1,
                });
                Routing::Unread {
                    count: 1,
                    new_entry: true,
                }
            }
        }
    }
}
