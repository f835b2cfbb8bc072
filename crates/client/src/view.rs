use std::fmt;

use mirra_gateway::{Conversation, ConversationId, Message, Role};

use crate::send::SendPhase;
use crate::timeline::{MessageTimeline, TimelineEntry};

/// Owned copy of one timeline row, detached from the coordinator's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEntry {
    ContextDivider,
    Message(Message),
}

/// Everything the rendering layer needs for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSnapshot {
    pub revision: u64,
    pub conversations: Vec<Conversation>,
    pub active_id: Option<ConversationId>,
    pub entries: Vec<ViewEntry>,
    pub loading: bool,
    pub send_phase: SendPhase,
    /// Text of the last failed send until it is acknowledged.
    pub send_failure: Option<String>,
    pub selected_model: String,
}

impl ViewSnapshot {
    pub(crate) fn entries_from(timeline: &MessageTimeline) -> Vec<ViewEntry> {
        timeline
            .entries()
            .into_iter()
            .map(|entry| match entry {
                TimelineEntry::ContextDivider => ViewEntry::ContextDivider,
                TimelineEntry::Message(message) => ViewEntry::Message(message.clone()),
            })
            .collect()
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().filter_map(|entry| match entry {
            ViewEntry::Message(message) => Some(message),
            ViewEntry::ContextDivider => None,
        })
    }

    pub fn active(&self) -> Option<&Conversation> {
        let active_id = self.active_id?;
        self.conversations
            .iter()
            .find(|conversation| conversation.id == active_id)
    }
}

impl fmt::Display for ViewSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for conversation in &self.conversations {
            let marker = if Some(conversation.id) == self.active_id {
                '*'
            } else {
                ' '
            };
            let title = if conversation.title.is_empty() {
                "(untitled)"
            } else {
                conversation.title.as_str()
            };
            writeln!(
                f,
                "{marker} [{}] {title} ({} messages)",
                conversation.id, conversation.message_count
            )?;
        }
        writeln!(f, "---- model: {}", self.selected_model)?;

        if self.loading {
            writeln!(f, "  (loading)")?;
        }
        for entry in &self.entries {
            match entry {
                ViewEntry::ContextDivider => writeln!(f, "  ~~~~ context cleared ~~~~")?,
                ViewEntry::Message(message) => {
                    let speaker = match message.role {
                        Role::User => "you",
                        Role::Assistant => message.model.as_deref().unwrap_or("assistant"),
                    };
                    let time = message
                        .time
                        .map(|time| time.format("%m-%d %H:%M").to_string())
                        .unwrap_or_default();
                    writeln!(f, "  #{} {speaker} {time}", message.id)?;
                    for line in message.content.lines() {
                        writeln!(f, "    {line}")?;
                    }
                }
            }
        }

        match (self.send_phase, &self.send_failure) {
            (SendPhase::Sending, _) => writeln!(f, "  (waiting for reply)")?,
            (SendPhase::Failed, Some(message)) => writeln!(f, "  (send failed: {message})")?,
            _ => {}
        }
        Ok(())
    }
}
