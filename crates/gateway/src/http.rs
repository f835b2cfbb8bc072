use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use snafu::{ResultExt, ensure};

use super::error::{
    BuildClientSnafu, DecodeSnafu, GatewayResult, MalformedPayloadSnafu, RejectedSnafu,
    StatusSnafu, TransportSnafu,
};
use super::ids::{ConversationId, MessageId};
use super::model::Model;
use super::types::{Conversation, EditReply, Message, RegenerateReply, SendReply, SendRequest};
use super::{BoxFuture, Gateway};

#[derive(Debug, Serialize)]
struct TitleBody<'a> {
    title: &'a str,
}

#[derive(Debug, Serialize)]
struct EditBody<'a> {
    content: &'a str,
}

/// REST gateway backed by a single reqwest client.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>) -> GatewayResult<Self> {
        let client = Client::builder().build().context(BuildClientSnafu {
            stage: "build-http-client",
        })?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}{}", self.base_url, path))
    }

    async fn send(stage: &'static str, request: RequestBuilder) -> GatewayResult<Option<Value>> {
        let response = request.send().await.context(TransportSnafu { stage })?;
        Self::read_payload(stage, response).await
    }

    /// Normalizes status and `{success: false, error}` replies into errors.
    ///
    /// Returns `None` for a successful reply whose body is not JSON, which status-only
    /// endpoints accept.
    async fn read_payload(stage: &'static str, response: Response) -> GatewayResult<Option<Value>> {
        let status = response.status();
        let body = response.bytes().await.context(TransportSnafu { stage })?;
        let payload = serde_json::from_slice::<Value>(&body).ok();
        let server_error = payload
            .as_ref()
            .and_then(|payload| payload.get("error"))
            .and_then(Value::as_str)
            .map(str::to_owned);

        if !status.is_success() {
            tracing::debug!(stage, status = status.as_u16(), "server returned failure status");
            return StatusSnafu {
                stage,
                status: status.as_u16(),
                message: server_error,
            }
            .fail();
        }

        let rejected = payload
            .as_ref()
            .and_then(|payload| payload.get("success"))
            .and_then(Value::as_bool)
            == Some(false);
        ensure!(
            !rejected,
            RejectedSnafu {
                stage,
                message: server_error,
            }
        );

        Ok(payload)
    }

    async fn fetch<T>(stage: &'static str, request: RequestBuilder) -> GatewayResult<T>
    where
        T: DeserializeOwned,
    {
        let Some(payload) = Self::send(stage, request).await? else {
            return MalformedPayloadSnafu { stage }.fail();
        };
        serde_json::from_value(payload).context(DecodeSnafu { stage })
    }

    async fn acknowledge(stage: &'static str, request: RequestBuilder) -> GatewayResult<()> {
        Self::send(stage, request).await.map(|_| ())
    }
}

impl Gateway for HttpGateway {
    fn list_conversations(&self) -> BoxFuture<'_, GatewayResult<Vec<Conversation>>> {
        let request = self.request(Method::GET, "/api/conversations");
        Box::pin(Self::fetch("list-conversations", request))
    }

    fn create_conversation<'a>(
        &'a self,
        title: &'a str,
    ) -> BoxFuture<'a, GatewayResult<Conversation>> {
        let request = self
            .request(Method::POST, "/api/conversations")
            .json(&TitleBody { title });
        Box::pin(Self::fetch("create-conversation", request))
    }

    fn rename_conversation<'a>(
        &'a self,
        conversation_id: ConversationId,
        title: &'a str,
    ) -> BoxFuture<'a, GatewayResult<()>> {
        let request = self
            .request(
                Method::POST,
                &format!("/api/conversations/{conversation_id}/title"),
            )
            .json(&TitleBody { title });
        Box::pin(Self::acknowledge("rename-conversation", request))
    }

    fn delete_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> BoxFuture<'_, GatewayResult<()>> {
        let request = self.request(
            Method::DELETE,
            &format!("/api/conversations/{conversation_id}"),
        );
        Box::pin(Self::acknowledge("delete-conversation", request))
    }

    fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> BoxFuture<'_, GatewayResult<Vec<Message>>> {
        let request = self.request(
            Method::GET,
            &format!("/api/conversations/{conversation_id}/messages"),
        );
        Box::pin(async move {
            let messages: Vec<Message> = Self::fetch("list-messages", request).await?;
            Ok(messages.into_iter().map(Message::normalized).collect())
        })
    }

    fn clear_context(&self, conversation_id: ConversationId) -> BoxFuture<'_, GatewayResult<()>> {
        let request = self.request(
            Method::POST,
            &format!("/api/conversations/{conversation_id}/clear-context"),
        );
        Box::pin(Self::acknowledge("clear-context", request))
    }

    fn send_message(&self, request: SendRequest) -> BoxFuture<'_, GatewayResult<SendReply>> {
        tracing::debug!(
            conversation_id = %request.conversation_id,
            model = %request.model,
            "posting chat turn"
        );
        let request = self.request(Method::POST, "/chat").json(&request);
        Box::pin(Self::fetch("send-message", request))
    }

    fn regenerate_message(
        &self,
        message_id: MessageId,
    ) -> BoxFuture<'_, GatewayResult<RegenerateReply>> {
        let request = self.request(
            Method::POST,
            &format!("/api/messages/{message_id}/regenerate"),
        );
        Box::pin(Self::fetch("regenerate-message", request))
    }

    fn edit_message<'a>(
        &'a self,
        message_id: MessageId,
        content: &'a str,
    ) -> BoxFuture<'a, GatewayResult<EditReply>> {
        let request = self
            .request(Method::POST, &format!("/api/messages/{message_id}/edit"))
            .json(&EditBody { content });
        Box::pin(Self::fetch("edit-message", request))
    }

    fn delete_message(&self, message_id: MessageId) -> BoxFuture<'_, GatewayResult<()>> {
        let request = self.request(Method::POST, &format!("/delete_message/{message_id}"));
        Box::pin(Self::acknowledge("delete-message", request))
    }

    fn list_models(&self) -> BoxFuture<'_, GatewayResult<Vec<Model>>> {
        let request = self.request(Method::GET, "/api/models");
        Box::pin(Self::fetch("list-models", request))
    }
}
