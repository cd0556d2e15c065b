//! Message thread with the selected counterpart and its render model.

use std::collections::HashSet;

use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use serde::Serialize;
use tracing::debug;

use vhub_net::api::resolve_media_url;
use vhub_shared::constants::DEFAULT_API_URL;
use vhub_shared::types::{Media, MediaKind, Message, MessageId, UserId, UserRef};

/// Identifies one history request. A completion whose ticket is no longer
/// current belongs to a selection the user already left and is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTicket {
    pub counterpart: UserId,
    generation: u64,
}

#[derive(Debug, Default)]
pub struct MessageThread {
    counterpart: Option<UserRef>,
    generation: u64,
    messages: Vec<Message>,
    loading: bool,
    failed_media: HashSet<MessageId>,
}

impl MessageThread {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to `counterpart`, discarding the current content.
    pub fn open(&mut self, counterpart: UserRef) -> HistoryTicket {
        self.generation += 1;
        self.messages.clear();
        self.failed_media.clear();
        self.loading = true;
        let ticket = HistoryTicket {
            counterpart: counterpart.id.clone(),
            generation: self.generation,
        };
        self.counterpart = Some(counterpart);
        ticket
    }

    pub fn close(&mut self) {
        self.generation += 1;
        self.counterpart = None;
        self.messages.clear();
        self.failed_media.clear();
        self.loading = false;
    }

    pub fn is_current(&self, ticket: &HistoryTicket) -> bool {
        ticket.generation == self.generation
            && self
                .counterpart
                .as_ref()
                .is_some_and(|c| c.id == ticket.counterpart)
    }

    /// Replace the content with a loaded history. Returns `false` and leaves
    /// the thread untouched when the ticket is stale.
    pub fn apply_history(&mut self, ticket: &HistoryTicket, messages: Vec<Message>) -> bool {
        if !self.is_current(ticket) {
            debug!(
                counterpart = %ticket.counterpart.short(),
                count = messages.len(),
                "Discarding stale history"
            );
            return false;
        }
        self.messages = messages;
        self.loading = false;
        true
    }

    pub fn fail_history(&mut self, ticket: &HistoryTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.loading = false;
        true
    }

    /// Append to the end. Duplicates are not filtered.
    pub fn append(&mut self, message: Message) {
        if self.messages.iter().any(|m| m.id == message.id) {
            debug!(message = %message.id, "Appending duplicate message");
        }
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn counterpart(&self) -> Option<&UserRef> {
        self.counterpart.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Number of messages whose id already appeared earlier in the thread.
    pub fn duplicate_count(&self) -> usize {
        let mut seen = HashSet::new();
        self.messages.iter().filter(|m| !seen.insert(&m.id)).count()
    }

    /// Record that the media of `message_id` failed to load. It renders as a
    /// link from now on. Returns `false` for unknown or media-less messages.
    pub fn media_failed(&mut self, message_id: &MessageId) -> bool {
        let has_media = self
            .messages
            .iter()
            .any(|m| &m.id == message_id && m.media.is_some());
        if has_media {
            self.failed_media.insert(message_id.clone());
        }
        has_media
    }

    pub fn render(&self, options: &RenderOptions) -> Vec<ThreadRow> {
        let mut rows = Vec::with_capacity(self.messages.len() + 1);
        let mut last_date: Option<NaiveDate> = None;

        for message in &self.messages {
            let local = message.created_at.with_timezone(&options.utc_offset);
            let date = local.date_naive();
            if last_date != Some(date) {
                rows.push(ThreadRow::DateSeparator {
                    date,
                    label: date.format("%b %-d, %Y").to_string(),
                });
                last_date = Some(date);
            }

            let received = self
                .counterpart
                .as_ref()
                .is_some_and(|c| c.id == message.sender.id);

            let media = message
                .media
                .as_ref()
                .and_then(|m| MediaView::from_media(m, &options.media_base_url))
                .map(|view| {
                    if self.failed_media.contains(&message.id) {
                        view.on_load_error()
                    } else {
                        view
                    }
                });

            rows.push(ThreadRow::Message(MessageRow {
                id: message.id.clone(),
                text: message.text.clone(),
                time: local.format("%H:%M").to_string(),
                direction: if received {
                    Direction::Received
                } else {
                    Direction::Sent
                },
                media,
            }));
        }

        rows
    }
}

/// Inputs of [`MessageThread::render`].
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Calendar dates and times are computed in this offset.
    pub utc_offset: FixedOffset,
    /// Media paths are resolved against this URL.
    pub media_base_url: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            utc_offset: Utc.fix(),
            media_base_url: DEFAULT_API_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThreadRow {
    DateSeparator { date: NaiveDate, label: String },
    Message(MessageRow),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Sent,
    Received,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRow {
    pub id: MessageId,
    pub text: String,
    /// `HH:MM`
    pub time: String,
    pub direction: Direction,
    pub media: Option<MediaView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaView {
    Image { url: String },
    Video { url: String },
    /// Fallback when the inline element cannot be loaded.
    Link { url: String, label: String },
}

impl MediaView {
    /// Unknown media kinds render nothing.
    pub fn from_media(media: &Media, base_url: &str) -> Option<Self> {
        let url = resolve_media_url(base_url, &media.url);
        match media.kind {
            MediaKind::Photo => Some(Self::Image { url }),
            MediaKind::Video => Some(Self::Video { url }),
            MediaKind::Unknown => None,
        }
    }

    pub fn on_load_error(self) -> Self {
        match self {
            Self::Image { url } => Self::Link {
                url,
                label: "View Image".to_string(),
            },
            Self::Video { url } => Self::Link {
                url,
                label: "View Video".to_string(),
            },
            link @ Self::Link { .. } => link,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{message_at, user};

    fn rows_of_kind(rows: &[ThreadRow]) -> Vec<&'static str> {
        rows.iter()
            .map(|r| match r {
                ThreadRow::DateSeparator { .. } => "date",
                ThreadRow::Message(_) => "msg",
            })
            .collect()
    }

    #[test]
    fn test_date_separators_per_calendar_day() {
        let mut thread = MessageThread::new();
        let ticket = thread.open(user("a"));
        thread.apply_history(
            &ticket,
            vec![
                message_at("a", "m1", "2024-01-01T10:00:00Z"),
                message_at("me", "m2", "2024-01-01T15:00:00Z"),
                message_at("a", "m3", "2024-01-02T09:00:00Z"),
            ],
        );

        let rows = thread.render(&RenderOptions::default());
        assert_eq!(rows_of_kind(&rows), ["date", "msg", "msg", "date", "msg"]);
        assert_eq!(
            rows[0],
            ThreadRow::DateSeparator {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                label: "Jan 1, 2024".into(),
            }
        );
    }

    #[test]
    fn test_history_renders_in_server_order() {
        let mut thread = MessageThread::new();
        let ticket = thread.open(user("a"));
        thread.apply_history(
            &ticket,
            vec![
                message_at("a", "m1", "2024-01-02T10:00:00Z"),
                message_at("me", "m2", "2024-01-01T10:00:00Z"),
                message_at("a", "m3", "2024-01-02T11:00:00Z"),
            ],
        );

        let rows = thread.render(&RenderOptions::default());
        assert_eq!(
            rows_of_kind(&rows),
            ["date", "msg", "date", "msg", "date", "msg"]
        );
        let ids: Vec<_> = rows
            .iter()
            .filter_map(|r| match r {
                ThreadRow::Message(m) => Some(m.id.0.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, ["m1", "m2", "m3"]);
    }

    #[test]
    fn test_dates_follow_configured_offset() {
        let mut thread = MessageThread::new();
        let ticket = thread.open(user("a"));
        thread.apply_history(
            &ticket,
            vec![
                message_at("a", "m1", "2024-01-01T22:00:00Z"),
                message_at("a", "m2", "2024-01-01T23:30:00Z"),
            ],
        );

        let options = RenderOptions {
            utc_offset: FixedOffset::east_opt(3600).unwrap(),
            ..RenderOptions::default()
        };
        let rows = thread.render(&options);
        assert_eq!(rows_of_kind(&rows), ["date", "msg", "date", "msg"]);
        let ThreadRow::Message(last) = &rows[3] else {
            panic!("expected message row");
        };
        assert_eq!(last.time, "00:30");
    }

    #[test]
    fn test_direction_by_sender() {
        let mut thread = MessageThread::new();
        let ticket = thread.open(user("a"));
        thread.apply_history(
            &ticket,
            vec![
                message_at("a", "m1", "2024-01-01T10:00:00Z"),
                message_at("me", "m2", "2024-01-01T10:05:00Z"),
            ],
        );

        let directions: Vec<_> = thread
            .render(&RenderOptions::default())
            .into_iter()
            .filter_map(|r| match r {
                ThreadRow::Message(m) => Some(m.direction),
                _ => None,
            })
            .collect();
        assert_eq!(directions, [Direction::Received, Direction::Sent]);
    }

    #[test]
    fn test_stale_history_discarded() {
        let mut thread = MessageThread::new();
        let first = thread.open(user("x"));
        let second = thread.open(user("y"));

        assert!(!thread.apply_history(&first, vec![message_at("x", "m1", "2024-01-01T10:00:00Z")]));
        assert!(thread.messages().is_empty());
        assert!(thread.is_loading());

        assert!(thread.apply_history(&second, vec![message_at("y", "m2", "2024-01-01T10:00:00Z")]));
        assert_eq!(thread.messages()[0].sender.id, UserId::from("y"));
    }

    #[test]
    fn test_reopen_same_counterpart_invalidates_old_ticket() {
        let mut thread = MessageThread::new();
        let old = thread.open(user("x"));
        thread.close();
        let new = thread.open(user("x"));
        assert!(!thread.is_current(&old));
        assert!(thread.is_current(&new));
    }

    #[test]
    fn test_duplicates_kept_and_counted() {
        let mut thread = MessageThread::new();
        thread.open(user("a"));
        let msg = message_at("a", "m1", "2024-01-01T10:00:00Z");
        thread.append(msg.clone());
        thread.append(msg);
        assert_eq!(thread.messages().len(), 2);
        assert_eq!(thread.duplicate_count(), 1);
    }

    #[test]
    fn test_media_degrades_to_link() {
        let mut thread = MessageThread::new();
        thread.open(user("a"));
        let mut msg = message_at("a", "m1", "2024-01-01T10:00:00Z");
        msg.media = Some(Media {
            kind: MediaKind::Video,
            url: "/uploads/clip.mp4".into(),
        });
        thread.append(msg);

        let options = RenderOptions {
            media_base_url: "http://vms.test/api".into(),
            ..RenderOptions::default()
        };
        let ThreadRow::Message(row) = &thread.render(&options)[1] else {
            panic!("expected message row");
        };
        assert!(matches!(row.media, Some(MediaView::Video { .. })));

        assert!(thread.media_failed(&MessageId::from("m1")));
        assert!(!thread.media_failed(&MessageId::from("missing")));
        let ThreadRow::Message(row) = &thread.render(&options)[1] else {
            panic!("expected message row");
        };
        match &row.media {
            Some(MediaView::Link { label, url }) => {
                assert_eq!(label, "View Video");
                assert!(url.ends_with("/uploads/clip.mp4"));
            }
            other => panic!("unexpected media {other:?}"),
        }
    }

    #[test]
    fn test_unknown_media_renders_nothing() {
        let media = Media {
            kind: MediaKind::Unknown,
            url: "/x.bin".into(),
        };
        assert!(MediaView::from_media(&media, DEFAULT_API_URL).is_none());
    }
}
