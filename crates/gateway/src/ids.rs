use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// Macro keeps the id wrappers structurally identical across conversations and messages.
macro_rules! define_server_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            pub const fn get(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self::new(value)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                raw.trim().parse::<i64>().map(Self)
            }
        }
    };
}

define_server_id!(ConversationId);
define_server_id!(MessageId);

impl MessageId {
    /// Id of a locally synthesized error message. Never sent to the server.
    pub const ERROR_PLACEHOLDER: Self = Self(-1);

    /// First id handed out to optimistic local messages; later ones count downward.
    pub const FIRST_PROVISIONAL: Self = Self(-2);

    /// True for ids the server minted. Placeholders and provisional ids are not.
    pub const fn is_persisted(&self) -> bool {
        self.0 > 0
    }

    pub const fn is_error_placeholder(&self) -> bool {
        self.0 == Self::ERROR_PLACEHOLDER.0
    }
}
