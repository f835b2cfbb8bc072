use mirra_gateway::{Conversation, ConversationId};

/// Result of checking whether a rename needs a request at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenamePlan {
    /// Blank or identical to the cached title; nothing to send.
    Unchanged,
    Send {
        title: String,
        /// Last known-good title, restored by the caller if the request fails.
        previous_title: String,
    },
}

/// Cached conversation summaries in server order, plus the active selection.
///
/// The list is only ever replaced wholesale from a server fetch; summaries are
/// never patched field by field.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    active_id: Option<ConversationId>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn active_id(&self) -> Option<ConversationId> {
        self.active_id
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.active_id.and_then(|id| self.get(id))
    }

    pub fn get(&self, conversation_id: ConversationId) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|conversation| conversation.id == conversation_id)
    }

    pub fn contains(&self, conversation_id: ConversationId) -> bool {
        self.get(conversation_id).is_some()
    }

    pub fn is_active(&self, conversation_id: ConversationId) -> bool {
        self.active_id == Some(conversation_id)
    }

    /// Installs a freshly fetched list. The active id is left alone; choosing a
    /// replacement after a delete is the caller's job.
    pub fn replace_all(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
    }

    /// Appends a just-created conversation until the next list fetch replaces it.
    pub fn append(&mut self, conversation: Conversation) {
        if self.contains(conversation.id) {
            return;
        }
        self.conversations.push(conversation);
    }

    /// Drops a conversation the server confirmed deleted while the list could
    /// not be re-fetched.
    pub fn forget(&mut self, conversation_id: ConversationId) {
        self.conversations
            .retain(|conversation| conversation.id != conversation_id);
    }

    /// Returns false when `conversation_id` was already active.
    pub fn switch_active(&mut self, conversation_id: ConversationId) -> bool {
        if self.active_id == Some(conversation_id) {
            return false;
        }
        self.active_id = Some(conversation_id);
        true
    }

    pub fn clear_active(&mut self) {
        self.active_id = None;
    }

    pub fn plan_rename(&self, conversation_id: ConversationId, title: &str) -> RenamePlan {
        let title = title.trim();
        let Some(current) = self.get(conversation_id) else {
            return RenamePlan::Unchanged;
        };
        if title.is_empty() || title == current.title {
            return RenamePlan::Unchanged;
        }

        RenamePlan::Send {
            title: title.to_string(),
            previous_title: current.title.clone(),
        }
    }

    /// Captures list order before a delete, since the refreshed list no longer
    /// contains the deleted entry.
    pub fn order_snapshot(&self) -> Vec<ConversationId> {
        self.conversations
            .iter()
            .map(|conversation| conversation.id)
            .collect()
    }

    /// Picks the conversation to activate after `deleted_id` disappears.
    ///
    /// Prefers the entry that preceded it in `snapshot` and still exists in the
    /// current list, else the first remaining entry, else `None` (the caller
    /// creates a fresh conversation).
    pub fn select_replacement(
        &self,
        snapshot: &[ConversationId],
        deleted_id: ConversationId,
    ) -> Option<ConversationId> {
        let deleted_index = snapshot.iter().position(|id| *id == deleted_id);

        let preceding = deleted_index.and_then(|index| {
            snapshot[..index]
                .iter()
                .rev()
                .copied()
                .find(|id| self.contains(*id))
        });

        preceding.or_else(|| {
            self.conversations
                .iter()
                .map(|conversation| conversation.id)
                .find(|id| *id != deleted_id)
        })
    }
}
