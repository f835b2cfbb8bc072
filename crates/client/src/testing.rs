//! In-memory server behind the `Gateway` trait, with per-endpoint gates for
//! forcing reply order in coordinator tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use mirra_gateway::{
    BoxFuture, Conversation, ConversationId, EditReply, EditedUserMessage, Gateway, GatewayError,
    GatewayResult, Message, MessageId, Model, RegenerateReply, RegeneratedAssistant, Role,
    SendReply, SendRequest,
};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Endpoint {
    ListConversations,
    CreateConversation,
    RenameConversation,
    DeleteConversation,
    ListMessages,
    ClearContext,
    SendMessage,
    RegenerateMessage,
    EditMessage,
    DeleteMessage,
    ListModels,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    ListConversations,
    CreateConversation(String),
    RenameConversation(ConversationId, String),
    DeleteConversation(ConversationId),
    ListMessages(ConversationId),
    ClearContext(ConversationId),
    SendMessage(SendRequest),
    RegenerateMessage(MessageId),
    EditMessage(MessageId, String),
    DeleteMessage(MessageId),
    ListModels,
}

impl Call {
    fn endpoint(&self) -> Endpoint {
        match self {
            Self::ListConversations => Endpoint::ListConversations,
            Self::CreateConversation(_) => Endpoint::CreateConversation,
            Self::RenameConversation(..) => Endpoint::RenameConversation,
            Self::DeleteConversation(_) => Endpoint::DeleteConversation,
            Self::ListMessages(_) => Endpoint::ListMessages,
            Self::ClearContext(_) => Endpoint::ClearContext,
            Self::SendMessage(_) => Endpoint::SendMessage,
            Self::RegenerateMessage(_) => Endpoint::RegenerateMessage,
            Self::EditMessage(..) => Endpoint::EditMessage,
            Self::DeleteMessage(_) => Endpoint::DeleteMessage,
            Self::ListModels => Endpoint::ListModels,
        }
    }
}

#[derive(Default)]
struct ServerState {
    // Most recently updated first.
    conversations: Vec<Conversation>,
    messages: HashMap<ConversationId, Vec<Message>>,
    next_conversation_id: i64,
    next_message_id: i64,
    models: Vec<Model>,
    calls: Vec<Call>,
    gates: HashMap<Endpoint, VecDeque<oneshot::Receiver<()>>>,
    failures: HashMap<Endpoint, VecDeque<GatewayError>>,
}

impl ServerState {
    fn mint_message_id(&mut self) -> MessageId {
        self.next_message_id += 1;
        MessageId::new(self.next_message_id)
    }

    fn touch(&mut self, conversation_id: ConversationId) {
        if let Some(index) = self
            .conversations
            .iter()
            .position(|conversation| conversation.id == conversation_id)
        {
            let conversation = self.conversations.remove(index);
            self.conversations.insert(0, conversation);
        }
    }

    fn conversation_mut(&mut self, conversation_id: ConversationId) -> Option<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|conversation| conversation.id == conversation_id)
    }

    fn owner_of(&self, message_id: MessageId) -> Option<(ConversationId, usize)> {
        self.messages.iter().find_map(|(conversation_id, messages)| {
            messages
                .iter()
                .position(|message| message.id == message_id)
                .map(|index| (*conversation_id, index))
        })
    }
}

#[derive(Default)]
pub(crate) struct ScriptedGateway {
    state: Mutex<ServerState>,
}

impl ScriptedGateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap()
    }

    /// Adds a conversation at the bottom of the list. `turns` alternate
    /// between user and assistant, starting with the user.
    pub(crate) fn seed(&self, title: &str, turns: &[&str]) -> ConversationId {
        let mut state = self.lock();
        state.next_conversation_id += 1;
        let conversation_id = ConversationId::new(state.next_conversation_id);
        state
            .conversations
            .push(Conversation::new(conversation_id, title));

        let mut messages = Vec::new();
        for (index, content) in turns.iter().enumerate() {
            let id = state.mint_message_id();
            messages.push(if index % 2 == 0 {
                Message::user(id, *content, None)
            } else {
                Message::assistant(id, *content, None, Some("m1".to_string()))
            });
        }
        state.messages.insert(conversation_id, messages);
        conversation_id
    }

    pub(crate) fn message_ids(&self, conversation_id: ConversationId) -> Vec<MessageId> {
        self.lock()
            .messages
            .get(&conversation_id)
            .map(|messages| messages.iter().map(|message| message.id).collect())
            .unwrap_or_default()
    }

    pub(crate) fn set_models(&self, models: Vec<Model>) {
        self.lock().models = models;
    }

    /// Holds the next call to `endpoint` until the returned sender fires.
    pub(crate) fn gate(&self, endpoint: Endpoint) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        self.lock()
            .gates
            .entry(endpoint)
            .or_default()
            .push_back(gate);
        release
    }

    /// Makes the next call to `endpoint` fail with `error`.
    pub(crate) fn fail_next(&self, endpoint: Endpoint, error: GatewayError) {
        self.lock()
            .failures
            .entry(endpoint)
            .or_default()
            .push_back(error);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub(crate) fn count(&self, endpoint: Endpoint) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.endpoint() == endpoint)
            .count()
    }

    fn serve<'a, T, F>(&'a self, call: Call, handler: F) -> BoxFuture<'a, GatewayResult<T>>
    where
        T: Send + 'a,
        F: FnOnce(&mut ServerState) -> GatewayResult<T> + Send + 'a,
    {
        let endpoint = call.endpoint();
        let gate = {
            let mut state = self.lock();
            state.calls.push(call);
            state
                .gates
                .get_mut(&endpoint)
                .and_then(|gates| gates.pop_front())
        };

        Box::pin(async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            let mut state = self.lock();
            if let Some(error) = state
                .failures
                .get_mut(&endpoint)
                .and_then(|failures| failures.pop_front())
            {
                return Err(error);
            }
            handler(&mut *state)
        })
    }
}

fn rejected(stage: &'static str, message: &str) -> GatewayError {
    GatewayError::Rejected {
        stage,
        message: Some(message.to_string()),
    }
}

impl Gateway for ScriptedGateway {
    fn list_conversations(&self) -> BoxFuture<'_, GatewayResult<Vec<Conversation>>> {
        self.serve(Call::ListConversations, |state| {
            Ok(state
                .conversations
                .iter()
                .map(|conversation| {
                    let count = state
                        .messages
                        .get(&conversation.id)
                        .map_or(0, |messages| messages.len() as u64);
                    conversation.clone().with_message_count(count)
                })
                .collect())
        })
    }

    fn create_conversation<'a>(
        &'a self,
        title: &'a str,
    ) -> BoxFuture<'a, GatewayResult<Conversation>> {
        self.serve(Call::CreateConversation(title.to_string()), move |state| {
            state.next_conversation_id += 1;
            let title = if title.is_empty() { "New chat" } else { title };
            let conversation =
                Conversation::new(ConversationId::new(state.next_conversation_id), title);
            state.conversations.insert(0, conversation.clone());
            state.messages.insert(conversation.id, Vec::new());
            Ok(conversation)
        })
    }

    fn rename_conversation<'a>(
        &'a self,
        conversation_id: ConversationId,
        title: &'a str,
    ) -> BoxFuture<'a, GatewayResult<()>> {
        let call = Call::RenameConversation(conversation_id, title.to_string());
        self.serve(call, move |state| {
            let conversation = state
                .conversation_mut(conversation_id)
                .ok_or_else(|| rejected("rename-conversation", "conversation not found"))?;
            conversation.title = title.to_string();
            Ok(())
        })
    }

    fn delete_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> BoxFuture<'_, GatewayResult<()>> {
        self.serve(Call::DeleteConversation(conversation_id), move |state| {
            state
                .conversations
                .retain(|conversation| conversation.id != conversation_id);
            state.messages.remove(&conversation_id);
            Ok(())
        })
    }

    fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> BoxFuture<'_, GatewayResult<Vec<Message>>> {
        // Read at request time, like a query whose answer is delivered late.
        let messages = self
            .lock()
            .messages
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default();
        self.serve(Call::ListMessages(conversation_id), move |_| Ok(messages))
    }

    fn clear_context(&self, conversation_id: ConversationId) -> BoxFuture<'_, GatewayResult<()>> {
        self.serve(Call::ClearContext(conversation_id), move |state| {
            let last = state
                .messages
                .get(&conversation_id)
                .and_then(|messages| messages.last())
                .map(|message| message.id)
                .ok_or_else(|| rejected("clear-context", "nothing to clear"))?;
            let conversation = state
                .conversation_mut(conversation_id)
                .ok_or_else(|| rejected("clear-context", "conversation not found"))?;
            conversation.context_start_message_id = Some(last);
            Ok(())
        })
    }

    fn send_message(&self, request: SendRequest) -> BoxFuture<'_, GatewayResult<SendReply>> {
        self.serve(Call::SendMessage(request.clone()), move |state| {
            let user_id = state.mint_message_id();
            let assistant_id = state.mint_message_id();
            let response = format!("echo: {}", request.message);
            let messages = state
                .messages
                .get_mut(&request.conversation_id)
                .ok_or_else(|| rejected("send-message", "conversation not found"))?;
            messages.push(Message::user(user_id, request.message.clone(), None));
            messages.push(Message::assistant(
                assistant_id,
                response.clone(),
                None,
                Some(request.model.clone()),
            ));
            state.touch(request.conversation_id);

            Ok(SendReply {
                id: assistant_id,
                user_id,
                response,
                time: None,
                model: Some(request.model),
            })
        })
    }

    fn regenerate_message(
        &self,
        message_id: MessageId,
    ) -> BoxFuture<'_, GatewayResult<RegenerateReply>> {
        self.serve(Call::RegenerateMessage(message_id), move |state| {
            let (conversation_id, index) = state
                .owner_of(message_id)
                .ok_or_else(|| rejected("regenerate-message", "message not found"))?;
            let message = &mut state.messages.get_mut(&conversation_id).unwrap()[index];
            message.content = format!("regenerated {message_id}");
            Ok(RegenerateReply {
                response: message.content.clone(),
                time: None,
                model: message.model.clone(),
            })
        })
    }

    fn edit_message<'a>(
        &'a self,
        message_id: MessageId,
        content: &'a str,
    ) -> BoxFuture<'a, GatewayResult<EditReply>> {
        let call = Call::EditMessage(message_id, content.to_string());
        self.serve(call, move |state| {
            let (conversation_id, index) = state
                .owner_of(message_id)
                .ok_or_else(|| rejected("edit-message", "message not found"))?;
            let messages = state.messages.get_mut(&conversation_id).unwrap();
            messages[index].content = content.to_string();

            let assistant = messages
                .get_mut(index + 1)
                .filter(|next| next.role == Role::Assistant)
                .map(|next| {
                    next.content = format!("answer to {content}");
                    RegeneratedAssistant {
                        id: next.id,
                        response: next.content.clone(),
                    }
                });

            Ok(EditReply {
                user: EditedUserMessage {
                    content: content.to_string(),
                },
                assistant,
            })
        })
    }

    fn delete_message(&self, message_id: MessageId) -> BoxFuture<'_, GatewayResult<()>> {
        self.serve(Call::DeleteMessage(message_id), move |state| {
            let (conversation_id, index) = state
                .owner_of(message_id)
                .ok_or_else(|| rejected("delete-message", "message not found"))?;
            state
                .messages
                .get_mut(&conversation_id)
                .unwrap()
                .remove(index);
            Ok(())
        })
    }

    fn list_models(&self) -> BoxFuture<'_, GatewayResult<Vec<Model>>> {
        self.serve(Call::ListModels, |state| Ok(state.models.clone()))
    }
}
