//! Typed access to the chat server's REST endpoints.
//!
//! The gateway holds no state: each call is one request, and every failure is
//! normalized into [`GatewayError`] so callers only deal with the
//! transport/application split.

use std::future::Future;
use std::pin::Pin;

pub mod error;
pub mod http;
pub mod ids;
pub mod model;
pub mod types;

pub use error::{ErrorKind, GatewayError, GatewayResult};
pub use http::HttpGateway;
pub use ids::{ConversationId, MessageId};
pub use model::{DEFAULT_MODEL, Model, ModelCatalog, ModelCatalogSource, default_models};
pub use types::{
    Conversation, EditReply, EditedUserMessage, Message, RegenerateReply, RegeneratedAssistant,
    Role, SendReply, SendRequest, parse_server_time,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait Gateway: Send + Sync {
    fn list_conversations(&self) -> BoxFuture<'_, GatewayResult<Vec<Conversation>>>;
    fn create_conversation<'a>(&'a self, title: &'a str)
    -> BoxFuture<'a, GatewayResult<Conversation>>;
    fn rename_conversation<'a>(
        &'a self,
        conversation_id: ConversationId,
        title: &'a str,
    ) -> BoxFuture<'a, GatewayResult<()>>;
    fn delete_conversation(&self, conversation_id: ConversationId)
    -> BoxFuture<'_, GatewayResult<()>>;
    fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> BoxFuture<'_, GatewayResult<Vec<Message>>>;
    fn clear_context(&self, conversation_id: ConversationId) -> BoxFuture<'_, GatewayResult<()>>;
    fn send_message(&self, request: SendRequest) -> BoxFuture<'_, GatewayResult<SendReply>>;
    fn regenerate_message(
        &self,
        message_id: MessageId,
    ) -> BoxFuture<'_, GatewayResult<RegenerateReply>>;
    fn edit_message<'a>(
        &'a self,
        message_id: MessageId,
        content: &'a str,
    ) -> BoxFuture<'a, GatewayResult<EditReply>>;
    fn delete_message(&self, message_id: MessageId) -> BoxFuture<'_, GatewayResult<()>>;
    fn list_models(&self) -> BoxFuture<'_, GatewayResult<Vec<Model>>>;
}

pub fn create_gateway(server_url: &str) -> GatewayResult<HttpGateway> {
    let gateway = HttpGateway::new(server_url)?;
    tracing::info!(server_url = gateway.base_url(), "remote gateway ready");
    Ok(gateway)
}
