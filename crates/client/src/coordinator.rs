//! Runs every user action as issue → remote call → reconcile.
//!
//! State lives in a `RefCell` that is borrowed only between awaits. Each
//! continuation re-checks the ids it captured at issue time before touching
//! the store or the timeline, so several operations may interleave on one
//! thread without a late reply landing in the wrong conversation.

use std::cell::{Ref, RefCell, RefMut};
use std::sync::Arc;

use chrono::Utc;
use mirra_gateway::{
    ConversationId, Gateway, Message, MessageId, Model, ModelCatalog, Role, SendRequest,
};
use tokio::sync::watch;

use crate::outcome::{MutationOutcome, Notice, Revert, SendOutcome, send_failure_text};
use crate::send::{SendState, SendTarget, SendTransition};
use crate::settings::ClientSettings;
use crate::store::{ConversationStore, RenamePlan};
use crate::timeline::MessageTimeline;
use crate::view::ViewSnapshot;

/// Behavior switches read from settings once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    pub optimistic_user_echo: bool,
    pub refresh_after_failed_send: bool,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            optimistic_user_echo: false,
            refresh_after_failed_send: true,
        }
    }
}

impl From<&ClientSettings> for SyncPolicy {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            optimistic_user_echo: settings.optimistic_user_echo,
            refresh_after_failed_send: settings.refresh_after_failed_send,
        }
    }
}

/// All mutable client state, owned by one coordinator.
#[derive(Debug, Default)]
pub struct ChatState {
    pub store: ConversationStore,
    pub timeline: MessageTimeline,
    pub send: SendState,
    send_attempts: u64,
    pub selected_model: String,
}

impl ChatState {
    fn is_current(&self, conversation_id: ConversationId) -> bool {
        self.store.is_active(conversation_id) && self.timeline.is_bound_to(conversation_id)
    }
}

pub struct ChatCoordinator {
    gateway: Arc<dyn Gateway>,
    policy: SyncPolicy,
    fallback_models: Vec<Model>,
    state: RefCell<ChatState>,
    revision: watch::Sender<u64>,
}

impl ChatCoordinator {
    pub fn new(gateway: Arc<dyn Gateway>, settings: &ClientSettings) -> Self {
        let state = ChatState {
            selected_model: settings.default_model.clone(),
            ..ChatState::default()
        };
        let (revision, _) = watch::channel(0);

        Self {
            gateway,
            policy: SyncPolicy::from(settings),
            fallback_models: settings.models.clone(),
            state: RefCell::new(state),
            revision,
        }
    }

    /// Receives the revision counter; every applied change bumps it.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn state(&self) -> Ref<'_, ChatState> {
        self.state.borrow()
    }

    fn state_mut(&self) -> RefMut<'_, ChatState> {
        self.state.borrow_mut()
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        let state = self.state();
        ViewSnapshot {
            revision: *self.revision.borrow(),
            conversations: state.store.list().to_vec(),
            active_id: state.store.active_id(),
            entries: ViewSnapshot::entries_from(&state.timeline),
            loading: state.timeline.is_loading(),
            send_phase: state.send.phase(),
            send_failure: state.send.failure().map(str::to_string),
            selected_model: state.selected_model.clone(),
        }
    }

    /// Loads the list, activates the first conversation (creating one when
    /// none exist) and loads its timeline.
    pub async fn bootstrap(&self) -> MutationOutcome {
        let conversations = match self.gateway.list_conversations().await {
            Ok(conversations) => conversations,
            Err(error) => {
                tracing::warn!("failed to load conversations on startup: {error}");
                return MutationOutcome::rejected(Notice::from_gateway("load conversations", &error));
            }
        };

        let first = conversations.first().map(|conversation| conversation.id);
        self.state_mut().store.replace_all(conversations);
        self.bump();

        match first {
            Some(conversation_id) => self.switch_conversation(conversation_id).await,
            None => {
                tracing::info!("no conversations on server; creating the first one");
                self.create_conversation("", true).await
            }
        }
    }

    /// Replaces the cached list with a fresh fetch. Failures keep the old list.
    pub async fn refresh_conversations(&self) -> bool {
        match self.gateway.list_conversations().await {
            Ok(conversations) => {
                self.state_mut().store.replace_all(conversations);
                self.bump();
                true
            }
            Err(error) => {
                tracing::warn!("failed to refresh conversations: {error}");
                false
            }
        }
    }

    pub async fn create_conversation(&self, title: &str, switch_to: bool) -> MutationOutcome {
        let conversation = match self.gateway.create_conversation(title.trim()).await {
            Ok(conversation) => conversation,
            Err(error) => {
                tracing::warn!("failed to create conversation: {error}");
                return MutationOutcome::rejected(Notice::from_gateway(
                    "create conversation",
                    &error,
                ));
            }
        };

        let conversation_id = conversation.id;
        tracing::info!("created conversation {conversation_id}");
        self.state_mut().store.append(conversation);
        self.bump();

        if switch_to {
            self.switch_conversation(conversation_id).await;
        }
        self.refresh_conversations().await;
        MutationOutcome::Applied
    }

    pub async fn rename_conversation(
        &self,
        conversation_id: ConversationId,
        title: &str,
    ) -> MutationOutcome {
        let plan = self.state().store.plan_rename(conversation_id, title);
        let RenamePlan::Send {
            title,
            previous_title,
        } = plan
        else {
            tracing::debug!("rename of conversation {conversation_id} is a no-op");
            return MutationOutcome::Unchanged;
        };

        match self
            .gateway
            .rename_conversation(conversation_id, &title)
            .await
        {
            Ok(()) => {
                self.refresh_conversations().await;
                MutationOutcome::Applied
            }
            Err(error) => {
                tracing::warn!("failed to rename conversation {conversation_id}: {error}");
                MutationOutcome::Rejected {
                    notice: Notice::from_gateway("rename", &error),
                    revert_to: Some(Revert::Title {
                        conversation_id,
                        title: previous_title,
                    }),
                }
            }
        }
    }

    pub async fn delete_conversation(&self, conversation_id: ConversationId) -> MutationOutcome {
        let snapshot = {
            let state = self.state();
            if !state.store.contains(conversation_id) {
                return MutationOutcome::rejected(Notice::application(format!(
                    "conversation {conversation_id} does not exist"
                )));
            }
            state.store.order_snapshot()
        };

        if let Err(error) = self.gateway.delete_conversation(conversation_id).await {
            tracing::warn!("failed to delete conversation {conversation_id}: {error}");
            return MutationOutcome::rejected(Notice::from_gateway("delete conversation", &error));
        }
        tracing::info!("deleted conversation {conversation_id}");

        if !self.refresh_conversations().await {
            self.state_mut().store.forget(conversation_id);
            self.bump();
        }

        // Re-read: the user may have switched away while the delete was in flight.
        let replacement = {
            let state = self.state();
            if !state.store.is_active(conversation_id) {
                return MutationOutcome::Applied;
            }
            state.store.select_replacement(&snapshot, conversation_id)
        };

        match replacement {
            Some(next_id) => {
                self.switch_conversation(next_id).await;
                MutationOutcome::Applied
            }
            None => {
                {
                    let mut state = self.state_mut();
                    state.store.clear_active();
                    state.timeline.clear();
                }
                self.bump();
                self.create_conversation("", true).await
            }
        }
    }

    pub async fn switch_conversation(&self, conversation_id: ConversationId) -> MutationOutcome {
        {
            let mut state = self.state_mut();
            if !state.store.contains(conversation_id) {
                return MutationOutcome::rejected(Notice::application(format!(
                    "conversation {conversation_id} does not exist"
                )));
            }
            if !state.store.switch_active(conversation_id) {
                return MutationOutcome::Unchanged;
            }
            state.timeline.reset_for(conversation_id);
        }
        tracing::info!("switched to conversation {conversation_id}");
        self.bump();

        self.reload(conversation_id).await;
        MutationOutcome::Applied
    }

    /// Re-fetches the active conversation's messages.
    pub async fn reload_active(&self) -> bool {
        let Some(conversation_id) = self.state().store.active_id() else {
            return false;
        };
        self.reload(conversation_id).await
    }

    async fn reload(&self, conversation_id: ConversationId) -> bool {
        let ticket = {
            let mut state = self.state_mut();
            if !state.store.is_active(conversation_id) {
                return false;
            }
            state.timeline.begin_reload(conversation_id)
        };
        tracing::debug!("loading messages of conversation {conversation_id}");
        self.bump();

        let result = self.gateway.list_messages(conversation_id).await;

        let mut guard = self.state_mut();
        let state = &mut *guard;
        let active_id = state.store.active_id();
        let applied = match result {
            Ok(messages) => {
                let context_start = state
                    .store
                    .get(conversation_id)
                    .and_then(|conversation| conversation.context_start_message_id);
                let applied = state
                    .timeline
                    .apply_reload(ticket, active_id, messages, context_start);
                if !applied {
                    tracing::debug!(
                        "dropped stale message list for conversation {conversation_id}"
                    );
                }
                applied
            }
            Err(error) => {
                tracing::warn!("failed to load messages of conversation {conversation_id}: {error}");
                state.timeline.fail_reload(ticket, active_id);
                false
            }
        };
        drop(guard);

        self.bump();
        applied
    }

    /// Submits `text` to the active conversation with the selected model.
    pub async fn send_message(&self, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Ignored;
        }

        let (target, model, provisional_id) = {
            let mut guard = self.state_mut();
            let state = &mut *guard;
            let Some(conversation_id) = state.store.active_id() else {
                tracing::debug!("send ignored: no active conversation");
                return SendOutcome::Ignored;
            };

            state.send_attempts += 1;
            let target = SendTarget::new(conversation_id, state.send_attempts);
            match state.send.apply(SendTransition::Submit(target)) {
                Ok(next) => state.send = next,
                Err(rejection) => {
                    tracing::debug!("send ignored: {rejection:?}");
                    return SendOutcome::Ignored;
                }
            }

            let provisional_id = (self.policy.optimistic_user_echo
                && state.timeline.is_bound_to(conversation_id))
            .then(|| {
                state.timeline.append_local(Message::user(
                    MessageId::FIRST_PROVISIONAL,
                    text,
                    Some(Utc::now()),
                ))
            });

            (target, state.selected_model.clone(), provisional_id)
        };
        self.bump();

        let conversation_id = target.conversation_id;
        tracing::debug!("sending message to conversation {conversation_id} with model {model}");
        let result = self
            .gateway
            .send_message(SendRequest {
                message: text.to_string(),
                model: model.clone(),
                conversation_id,
            })
            .await;

        let (outcome, refresh, reload_after) = {
            let mut guard = self.state_mut();
            let state = &mut *guard;
            let active_id = state.store.active_id();
            let shown = state.is_current(conversation_id);
            // A list fetched before this send was persisted is still in flight.
            let reload_after = shown && state.timeline.is_loading();

            let (outcome, settle) = match result {
                Ok(reply) => {
                    if shown {
                        match provisional_id {
                            Some(provisional_id) => {
                                state.timeline.reconcile_provisional(
                                    conversation_id,
                                    provisional_id,
                                    reply.user_id,
                                );
                            }
                            None => {
                                state.timeline.apply_server_message(
                                    Message::user(reply.user_id, text, reply.time),
                                    conversation_id,
                                    active_id,
                                );
                            }
                        }
                        state.timeline.apply_server_message(
                            Message::assistant(reply.id, reply.response, reply.time, reply.model),
                            conversation_id,
                            active_id,
                        );
                    } else {
                        tracing::debug!(
                            "reply for conversation {conversation_id} arrived after switching away"
                        );
                    }
                    (SendOutcome::Delivered { shown }, SendTransition::Succeed(target))
                }
                Err(error) => {
                    tracing::warn!("send to conversation {conversation_id} failed: {error}");
                    let message = send_failure_text(&error);
                    if shown {
                        state.timeline.apply_server_message(
                            Message::assistant(
                                MessageId::ERROR_PLACEHOLDER,
                                message.clone(),
                                Some(Utc::now()),
                                Some(model),
                            ),
                            conversation_id,
                            active_id,
                        );
                    }
                    (
                        SendOutcome::Failed { shown },
                        SendTransition::Fail { target, message },
                    )
                }
            };

            match state.send.apply(settle) {
                Ok(next) => state.send = next,
                Err(rejection) => tracing::warn!("send state out of sync: {rejection:?}"),
            }

            let refresh = matches!(outcome, SendOutcome::Delivered { .. })
                || self.policy.refresh_after_failed_send;
            (outcome, refresh, reload_after)
        };
        self.bump();

        if refresh {
            self.refresh_conversations().await;
        }
        if reload_after {
            tracing::debug!("reloading conversation {conversation_id} after send landed mid-load");
            self.reload(conversation_id).await;
        }
        outcome
    }

    /// Returns a settled send to idle once its result has been shown.
    pub fn acknowledge_send(&self) -> bool {
        {
            let mut state = self.state_mut();
            match state.send.apply(SendTransition::Reset) {
                Ok(next) if next == state.send => return false,
                Ok(next) => state.send = next,
                Err(rejection) => {
                    tracing::debug!("send not acknowledged: {rejection:?}");
                    return false;
                }
            }
        }
        self.bump();
        true
    }

    /// Edits a saved user message. When the server regenerates the following
    /// reply the whole timeline is reloaded.
    pub async fn edit_message(&self, message_id: MessageId, content: &str) -> MutationOutcome {
        let content = content.trim();
        let conversation_id = {
            let state = self.state();
            let Some(conversation_id) = state.timeline.conversation_id() else {
                return MutationOutcome::Unchanged;
            };
            let Some(message) = state.timeline.get(message_id) else {
                return MutationOutcome::rejected(Notice::application(format!(
                    "message {message_id} is not in this conversation"
                )));
            };
            if !message_id.is_persisted() || message.role != Role::User {
                return MutationOutcome::rejected(Notice::application(
                    "only saved user messages can be edited",
                ));
            }
            if content.is_empty() || content == message.content.trim() {
                return MutationOutcome::Unchanged;
            }
            conversation_id
        };

        let reply = match self.gateway.edit_message(message_id, content).await {
            Ok(reply) => reply,
            Err(error) => {
                tracing::warn!("failed to edit message {message_id}: {error}");
                return MutationOutcome::rejected(Notice::from_gateway("edit", &error));
            }
        };

        let outcome = if !self.state().is_current(conversation_id) {
            tracing::debug!("edit of message {message_id} finished after switching away");
            MutationOutcome::Superseded
        } else if reply.assistant.is_some() {
            self.reload(conversation_id).await;
            MutationOutcome::Applied
        } else {
            self.state_mut()
                .timeline
                .update_content(conversation_id, message_id, reply.user.content);
            self.bump();
            MutationOutcome::Applied
        };

        self.refresh_conversations().await;
        outcome
    }

    /// Replaces a saved assistant message's content in place.
    pub async fn regenerate_message(&self, message_id: MessageId) -> MutationOutcome {
        let conversation_id = {
            let state = self.state();
            let Some(conversation_id) = state.timeline.conversation_id() else {
                return MutationOutcome::Unchanged;
            };
            let is_assistant = state
                .timeline
                .get(message_id)
                .is_some_and(|message| message.role == Role::Assistant);
            if !message_id.is_persisted() || !is_assistant {
                return MutationOutcome::rejected(Notice::application(
                    "only saved assistant messages can be regenerated",
                ));
            }
            conversation_id
        };

        let reply = match self.gateway.regenerate_message(message_id).await {
            Ok(reply) => reply,
            Err(error) => {
                tracing::warn!("failed to regenerate message {message_id}: {error}");
                return MutationOutcome::rejected(Notice::from_gateway("regenerate", &error));
            }
        };

        let updated = {
            let mut state = self.state_mut();
            state.is_current(conversation_id)
                && state
                    .timeline
                    .update_content(conversation_id, message_id, reply.response)
        };
        let outcome = if updated {
            self.bump();
            MutationOutcome::Applied
        } else {
            tracing::debug!("regenerated message {message_id} is no longer shown");
            MutationOutcome::Superseded
        };

        // Regenerating bumps updated_at on the server.
        self.refresh_conversations().await;
        outcome
    }

    /// Deletes one saved message. The error placeholder is dismissed locally.
    pub async fn delete_message(&self, message_id: MessageId) -> MutationOutcome {
        let conversation_id = {
            let mut state = self.state_mut();
            let Some(conversation_id) = state.timeline.conversation_id() else {
                return MutationOutcome::Unchanged;
            };
            if message_id.is_error_placeholder() {
                let removed = state.timeline.remove(conversation_id, message_id);
                drop(state);
                if removed.is_none() {
                    return MutationOutcome::Unchanged;
                }
                self.bump();
                return MutationOutcome::Applied;
            }
            if !message_id.is_persisted() || state.timeline.get(message_id).is_none() {
                return MutationOutcome::rejected(Notice::application(format!(
                    "message {message_id} cannot be deleted"
                )));
            }
            conversation_id
        };

        if let Err(error) = self.gateway.delete_message(message_id).await {
            tracing::warn!("failed to delete message {message_id}: {error}");
            return MutationOutcome::rejected(Notice::from_gateway("delete message", &error));
        }

        let outcome = {
            let mut state = self.state_mut();
            if state.is_current(conversation_id)
                && state.timeline.remove(conversation_id, message_id).is_some()
            {
                MutationOutcome::Applied
            } else {
                MutationOutcome::Superseded
            }
        };
        self.bump();

        self.refresh_conversations().await;
        outcome
    }

    /// Marks the current tail of the active conversation as the new context start.
    pub async fn clear_context(&self) -> MutationOutcome {
        let Some(conversation_id) = self.state().store.active_id() else {
            return MutationOutcome::Unchanged;
        };

        if let Err(error) = self.gateway.clear_context(conversation_id).await {
            tracing::warn!("failed to clear context of conversation {conversation_id}: {error}");
            return MutationOutcome::rejected(Notice::from_gateway("clear context", &error));
        }
        tracing::info!("cleared context of conversation {conversation_id}");

        self.refresh_conversations().await;
        if self.reload(conversation_id).await {
            MutationOutcome::Applied
        } else {
            MutationOutcome::Superseded
        }
    }

    pub fn select_model(&self, model_id: &str) -> MutationOutcome {
        let model_id = model_id.trim();
        {
            let mut state = self.state_mut();
            if model_id.is_empty() || state.selected_model == model_id {
                return MutationOutcome::Unchanged;
            }
            state.selected_model = model_id.to_string();
        }
        tracing::info!("selected model {model_id}");
        self.bump();
        MutationOutcome::Applied
    }

    /// Server catalog, or the configured models when it cannot be fetched.
    pub async fn available_models(&self) -> ModelCatalog {
        match self.gateway.list_models().await {
            Ok(models) if !models.is_empty() => ModelCatalog::from_server(models),
            Ok(_) => ModelCatalog::from_fallback(
                self.fallback_models.clone(),
                "server returned no models; using configured list".to_string(),
            ),
            Err(error) => {
                tracing::warn!("failed to fetch models: {error}");
                ModelCatalog::from_fallback(
                    self.fallback_models.clone(),
                    format!("failed to fetch models from server: {error}"),
                )
            }
        }
    }
}
