use mirra_gateway::ConversationId;

/// Identifies one submitted send: the conversation captured at submit time plus
/// a per-coordinator attempt counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SendTarget {
    pub conversation_id: ConversationId,
    pub attempt: u64,
}

impl SendTarget {
    pub const fn new(conversation_id: ConversationId, attempt: u64) -> Self {
        Self {
            conversation_id,
            attempt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SendState {
    #[default]
    Idle,
    Sending(SendTarget),
    Succeeded(SendTarget),
    Failed {
        target: SendTarget,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendTransition {
    Submit(SendTarget),
    Succeed(SendTarget),
    Fail { target: SendTarget, message: String },
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendTransitionRejection {
    AlreadySending {
        active: SendTarget,
        attempted: SendTarget,
    },
    NoActiveSend,
    StillSending(SendTarget),
    TargetMismatch {
        active: SendTarget,
        attempted: SendTarget,
    },
}

pub type SendTransitionResult = Result<SendState, SendTransitionRejection>;

impl SendState {
    /// Text of the last failed send, kept until the next submit or reset.
    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::Failed { message, .. } => Some(message),
            Self::Idle | Self::Sending(_) | Self::Succeeded(_) => None,
        }
    }

    /// Short label for rendering the input affordance.
    pub fn phase(&self) -> SendPhase {
        match self {
            Self::Idle => SendPhase::Idle,
            Self::Sending(_) => SendPhase::Sending,
            Self::Succeeded(_) => SendPhase::Succeeded,
            Self::Failed { .. } => SendPhase::Failed,
        }
    }

    pub fn apply(&self, transition: SendTransition) -> SendTransitionResult {
        match transition {
            SendTransition::Submit(target) => self.apply_submit(target),
            SendTransition::Succeed(target) => self.apply_settle(target, Self::Succeeded(target)),
            SendTransition::Fail { target, message } => {
                self.apply_settle(target, Self::Failed { target, message })
            }
            SendTransition::Reset => match self {
                Self::Sending(active) => Err(SendTransitionRejection::StillSending(*active)),
                Self::Idle | Self::Succeeded(_) | Self::Failed { .. } => Ok(Self::Idle),
            },
        }
    }

    fn apply_submit(&self, target: SendTarget) -> SendTransitionResult {
        match self {
            Self::Sending(active) => Err(SendTransitionRejection::AlreadySending {
                active: *active,
                attempted: target,
            }),
            Self::Idle | Self::Succeeded(_) | Self::Failed { .. } => Ok(Self::Sending(target)),
        }
    }

    fn apply_settle(&self, target: SendTarget, next: SendState) -> SendTransitionResult {
        match self {
            Self::Sending(active) if *active == target => Ok(next),
            Self::Sending(active) => Err(SendTransitionRejection::TargetMismatch {
                active: *active,
                attempted: target,
            }),
            Self::Idle | Self::Succeeded(_) | Self::Failed { .. } => {
                Err(SendTransitionRejection::NoActiveSend)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPhase {
    Idle,
    Sending,
    Succeeded,
    Failed,
}
