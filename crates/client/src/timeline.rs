use mirra_gateway::{ConversationId, Message, MessageId};

/// One rendered row, in top-to-bottom order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineEntry<'a> {
    ContextDivider,
    Message(&'a Message),
}

/// Issue-time token for a reload. Only the newest ticket may be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadTicket {
    pub conversation_id: ConversationId,
    generation: u64,
}

/// Messages of the active conversation only.
///
/// Every mutation takes the conversation id its request was issued for and is
/// dropped unless the timeline is still bound to that conversation.
#[derive(Debug, Clone)]
pub struct MessageTimeline {
    conversation_id: Option<ConversationId>,
    messages: Vec<Message>,
    context_start: Option<MessageId>,
    loading: bool,
    generation: u64,
    next_provisional: i64,
}

impl Default for MessageTimeline {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageTimeline {
    pub fn new() -> Self {
        Self {
            conversation_id: None,
            messages: Vec::new(),
            context_start: None,
            loading: false,
            generation: 0,
            next_provisional: MessageId::FIRST_PROVISIONAL.get(),
        }
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.conversation_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_bound_to(&self, conversation_id: ConversationId) -> bool {
        self.conversation_id == Some(conversation_id)
    }

    pub fn get(&self, message_id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == message_id)
    }

    /// Discards everything and binds to `conversation_id` in loading state.
    pub fn reset_for(&mut self, conversation_id: ConversationId) {
        self.conversation_id = Some(conversation_id);
        self.messages.clear();
        self.context_start = None;
        self.loading = true;
    }

    pub fn clear(&mut self) {
        self.conversation_id = None;
        self.messages.clear();
        self.context_start = None;
        self.loading = false;
    }

    pub fn begin_reload(&mut self, conversation_id: ConversationId) -> ReloadTicket {
        if !self.is_bound_to(conversation_id) {
            self.reset_for(conversation_id);
        }
        self.loading = true;
        self.generation = self.generation.wrapping_add(1);
        ReloadTicket {
            conversation_id,
            generation: self.generation,
        }
    }

    /// Replaces the whole timeline if `ticket` is still the newest reload and
    /// its conversation is still active.
    pub fn apply_reload(
        &mut self,
        ticket: ReloadTicket,
        active_id: Option<ConversationId>,
        messages: Vec<Message>,
        context_start: Option<MessageId>,
    ) -> bool {
        if !self.reload_is_current(ticket, active_id) {
            return false;
        }

        self.conversation_id = Some(ticket.conversation_id);
        self.messages = messages;
        self.context_start = context_start;
        self.loading = false;
        true
    }

    /// Ends the loading state after a failed fetch, keeping whatever is shown.
    pub fn fail_reload(&mut self, ticket: ReloadTicket, active_id: Option<ConversationId>) {
        if self.reload_is_current(ticket, active_id) {
            self.loading = false;
        }
    }

    fn reload_is_current(&self, ticket: ReloadTicket, active_id: Option<ConversationId>) -> bool {
        active_id == Some(ticket.conversation_id) && ticket.generation == self.generation
    }

    /// Optimistically appends `message` under a fresh provisional id.
    pub fn append_local(&mut self, mut message: Message) -> MessageId {
        let provisional_id = MessageId::new(self.next_provisional);
        self.next_provisional -= 1;
        message.id = provisional_id;
        self.messages.push(message);
        provisional_id
    }

    /// Swaps a provisional id for the id the server assigned.
    pub fn reconcile_provisional(
        &mut self,
        conversation_id: ConversationId,
        provisional_id: MessageId,
        server_id: MessageId,
    ) -> bool {
        if !self.is_bound_to(conversation_id) {
            return false;
        }

        // A reload may already have brought in the persisted copy.
        if self.get(server_id).is_some() {
            self.messages.retain(|message| message.id != provisional_id);
            return true;
        }

        match self
            .messages
            .iter_mut()
            .find(|message| message.id == provisional_id)
        {
            Some(message) => {
                message.id = server_id;
                true
            }
            None => false,
        }
    }

    /// Appends a message produced by a request issued for `issued_for`.
    ///
    /// Dropped when that conversation is no longer active or the timeline was
    /// rebound, and when a persisted copy is already present.
    pub fn apply_server_message(
        &mut self,
        message: Message,
        issued_for: ConversationId,
        active_id: Option<ConversationId>,
    ) -> bool {
        if active_id != Some(issued_for) || !self.is_bound_to(issued_for) {
            return false;
        }
        if message.id.is_persisted() && self.get(message.id).is_some() {
            return false;
        }

        self.messages.push(message);
        true
    }

    pub fn update_content(
        &mut self,
        conversation_id: ConversationId,
        message_id: MessageId,
        content: impl Into<String>,
    ) -> bool {
        if !self.is_bound_to(conversation_id) {
            return false;
        }

        match self
            .messages
            .iter_mut()
            .find(|message| message.id == message_id)
        {
            Some(message) => {
                message.content = content.into();
                true
            }
            None => false,
        }
    }

    /// Removes exactly one message; neighbours keep their ids and positions.
    pub fn remove(
        &mut self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> Option<Message> {
        if !self.is_bound_to(conversation_id) {
            return None;
        }

        let index = self
            .messages
            .iter()
            .position(|message| message.id == message_id)?;
        Some(self.messages.remove(index))
    }

    /// Render order, with a single divider right after the context-start
    /// message. That message is the last one from before the clear.
    pub fn entries(&self) -> Vec<TimelineEntry<'_>> {
        let mut entries = Vec::with_capacity(self.messages.len() + 1);
        let mut divider_pending = self.context_start;

        for message in &self.messages {
            entries.push(TimelineEntry::Message(message));
            if divider_pending == Some(message.id) {
                entries.push(TimelineEntry::ContextDivider);
                divider_pending = None;
            }
        }

        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: ConversationId = ConversationId::new(1);
    const B: ConversationId = ConversationId::new(2);

    fn user(raw_id: i64, content: &str) -> Message {
        Message::user(MessageId::new(raw_id), content, None)
    }

    fn assistant(raw_id: i64, content: &str) -> Message {
        Message::assistant(MessageId::new(raw_id), content, None, Some("m1".to_string()))
    }

    fn loaded(conversation_id: ConversationId, messages: Vec<Message>) -> MessageTimeline {
        let mut timeline = MessageTimeline::new();
        let ticket = timeline.begin_reload(conversation_id);
        assert!(timeline.apply_reload(ticket, Some(conversation_id), messages, None));
        timeline
    }

    fn ids(timeline: &MessageTimeline) -> Vec<i64> {
        timeline.messages().iter().map(|message| message.id.get()).collect()
    }

    #[test]
    fn reload_for_an_inactive_conversation_is_discarded() {
        let mut timeline = MessageTimeline::new();
        let ticket = timeline.begin_reload(A);

        assert!(!timeline.apply_reload(ticket, Some(B), vec![user(1, "hi")], None));
        assert!(timeline.messages().is_empty());
        assert!(timeline.is_loading());
    }

    #[test]
    fn only_the_newest_reload_applies() {
        let mut timeline = MessageTimeline::new();
        let first = timeline.begin_reload(A);
        let second = timeline.begin_reload(A);

        assert!(timeline.apply_reload(second, Some(A), vec![user(1, "new")], None));
        assert!(!timeline.apply_reload(first, Some(A), vec![user(9, "old")], None));
        assert_eq!(ids(&timeline), vec![1]);
        assert!(!timeline.is_loading());
    }

    #[test]
    fn rebinding_discards_previous_messages() {
        let mut timeline = loaded(A, vec![user(1, "a")]);
        timeline.begin_reload(B);

        assert!(timeline.messages().is_empty());
        assert!(timeline.is_bound_to(B));
    }

    #[test]
    fn server_messages_are_gated_on_the_issuing_conversation() {
        let mut timeline = loaded(B, vec![user(5, "b")]);

        assert!(!timeline.apply_server_message(assistant(7, "for a"), A, Some(B)));
        assert!(timeline.apply_server_message(assistant(8, "for b"), B, Some(B)));
        assert!(!timeline.apply_server_message(assistant(8, "dup"), B, Some(B)));
        assert_eq!(ids(&timeline), vec![5, 8]);
    }

    #[test]
    fn provisional_ids_count_down_and_reconcile() {
        let mut timeline = loaded(A, Vec::new());
        let first = timeline.append_local(user(0, "one"));
        let second = timeline.append_local(user(0, "two"));

        assert_eq!((first.get(), second.get()), (-2, -3));
        assert!(!first.is_persisted());
        assert!(timeline.reconcile_provisional(A, first, MessageId::new(40)));
        assert_eq!(ids(&timeline), vec![40, -3]);
        assert!(!timeline.reconcile_provisional(B, second, MessageId::new(41)));
    }

    #[test]
    fn reconcile_drops_the_provisional_copy_when_reload_already_has_it() {
        let mut timeline = loaded(A, Vec::new());
        let provisional = timeline.append_local(user(0, "hi"));
        timeline.messages.push(user(40, "hi"));

        assert!(timeline.reconcile_provisional(A, provisional, MessageId::new(40)));
        assert_eq!(ids(&timeline), vec![40]);
    }

    #[test]
    fn remove_takes_exactly_one_message_without_renumbering() {
        let mut timeline = loaded(A, vec![user(1, "a"), assistant(2, "b"), user(3, "c")]);

        let removed = timeline.remove(A, MessageId::new(2));

        assert_eq!(removed.map(|message| message.content), Some("b".to_string()));
        assert_eq!(ids(&timeline), vec![1, 3]);
        assert!(timeline.remove(B, MessageId::new(1)).is_none());
    }

    #[test]
    fn update_content_keeps_id_and_position() {
        let mut timeline = loaded(A, vec![user(1, "a"), assistant(2, "b")]);

        assert!(timeline.update_content(A, MessageId::new(2), "regenerated"));
        assert!(!timeline.update_content(A, MessageId::new(99), "missing"));
        assert_eq!(ids(&timeline), vec![1, 2]);
        assert_eq!(timeline.messages()[1].content, "regenerated");
    }

    #[test]
    fn divider_renders_once_after_the_context_start_message() {
        let mut timeline = MessageTimeline::new();
        let ticket = timeline.begin_reload(A);
        timeline.apply_reload(
            ticket,
            Some(A),
            vec![user(1, "a"), assistant(2, "b"), user(3, "c")],
            Some(MessageId::new(2)),
        );

        let entries = timeline.entries();

        assert_eq!(entries.len(), 4);
        assert!(matches!(entries[1], TimelineEntry::Message(message) if message.id == MessageId::new(2)));
        assert_eq!(entries[2], TimelineEntry::ContextDivider);
        assert!(matches!(entries[3], TimelineEntry::Message(message) if message.id == MessageId::new(3)));
    }

    #[test]
    fn divider_trails_a_context_start_at_the_tail() {
        let mut timeline = MessageTimeline::new();
        let ticket = timeline.begin_reload(A);
        timeline.apply_reload(
            ticket,
            Some(A),
            vec![user(1, "a"), assistant(2, "b")],
            Some(MessageId::new(2)),
        );

        assert_eq!(timeline.entries().last(), Some(&TimelineEntry::ContextDivider));
    }

    #[test]
    fn missing_context_start_message_renders_no_divider() {
        let mut timeline = MessageTimeline::new();
        let ticket = timeline.begin_reload(A);
        timeline.apply_reload(ticket, Some(A), vec![user(1, "a")], Some(MessageId::new(7)));

        assert!(
            timeline
                .entries()
                .iter()
                .all(|entry| !matches!(entry, TimelineEntry::ContextDivider))
        );
    }
}
