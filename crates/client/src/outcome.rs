use mirra_gateway::{ConversationId, ErrorKind, GatewayError};

/// A blocking notice for the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: ErrorKind,
    pub message: String,
}

impl Notice {
    pub fn application(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Application,
            message: message.into(),
        }
    }

    /// Builds the notice for a failed request, preferring the server's own text.
    pub fn from_gateway(action: &str, error: &GatewayError) -> Self {
        let message = match (error.kind(), error.server_message()) {
            (_, Some(server_text)) => format!("{action} failed: {server_text}"),
            (ErrorKind::Transport, None) => format!("{action} failed: network error: {error}"),
            (ErrorKind::Application, None) => format!("{action} failed, please retry"),
        };
        Self {
            kind: error.kind(),
            message,
        }
    }
}

/// Value the rendering layer restores after a rejected optimistic change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revert {
    Title {
        conversation_id: ConversationId,
        title: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    /// Nothing to do; no request was issued.
    Unchanged,
    /// The server accepted the change but the view moved on, so nothing was applied.
    Superseded,
    Rejected {
        notice: Notice,
        revert_to: Option<Revert>,
    },
}

impl MutationOutcome {
    pub fn rejected(notice: Notice) -> Self {
        Self::Rejected {
            notice,
            revert_to: None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    pub fn notice(&self) -> Option<&Notice> {
        match self {
            Self::Rejected { notice, .. } => Some(notice),
            Self::Applied | Self::Unchanged | Self::Superseded => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank input, no active conversation, or another send still in flight.
    Ignored,
    /// `shown` is false when the user left the conversation before the reply.
    Delivered { shown: bool },
    Failed { shown: bool },
}

/// Text of the synthetic assistant message shown after a failed send.
pub fn send_failure_text(error: &GatewayError) -> String {
    match (error.kind(), error.server_message()) {
        (_, Some(server_text)) => server_text.to_string(),
        (ErrorKind::Transport, None) => format!("network error: {error}"),
        (ErrorKind::Application, None) => "send failed, please retry".to_string(),
    }
}
