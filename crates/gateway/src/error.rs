use snafu::Snafu;

/// Two-way split used by callers to decide how a failure is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No response arrived: connection refused, reset, DNS failure.
    Transport,
    /// The server answered, but not with success.
    Application,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum GatewayError {
    #[snafu(display("failed to build http client on `{stage}`: {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request failed on `{stage}`: {source}"))]
    Transport {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display(
        "server returned status {status} on `{stage}`: {}",
        message.as_deref().unwrap_or("no error text")
    ))]
    Status {
        stage: &'static str,
        status: u16,
        message: Option<String>,
    },
    #[snafu(display(
        "server rejected `{stage}`: {}",
        message.as_deref().unwrap_or("no error text")
    ))]
    Rejected {
        stage: &'static str,
        message: Option<String>,
    },
    #[snafu(display("`{stage}` returned a body that is not JSON"))]
    MalformedPayload { stage: &'static str },
    #[snafu(display("failed to decode `{stage}` payload: {source}"))]
    Decode {
        stage: &'static str,
        source: serde_json::Error,
    },
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BuildClient { .. } | Self::Transport { .. } => ErrorKind::Transport,
            Self::Status { .. }
            | Self::Rejected { .. }
            | Self::MalformedPayload { .. }
            | Self::Decode { .. } => ErrorKind::Application,
        }
    }

    /// The `error` text the server put in its reply, when there was one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Status { message, .. } | Self::Rejected { message, .. } => message.as_deref(),
            Self::BuildClient { .. }
            | Self::Transport { .. }
            | Self::MalformedPayload { .. }
            | Self::Decode { .. } => None,
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::BuildClient { stage, .. }
            | Self::Transport { stage, .. }
            | Self::Status { stage, .. }
            | Self::Rejected { stage, .. }
            | Self::MalformedPayload { stage }
            | Self::Decode { stage, .. } => stage,
        }
    }
}
