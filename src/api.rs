//! References to the chat backend's functions.

/// Functions exported by the backend's `chat` module.
pub mod chat {
    use serde::{Deserialize, Serialize};

    use crate::function::{Function, FunctionKind, MutationFunction, NoArgs, QueryFunction};

    /// A single chat message as stored by the backend.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct ChatMessage {
        /// Document id assigned by the platform.
        #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
        pub id: Option<String>,
        /// Creation time in milliseconds since the Unix epoch.
        #[serde(
            rename = "_creationTime",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        pub creation_time: Option<f64>,
        /// Display name of the author.
        pub user: String,
        /// Message text.
        pub body: String,
    }

    impl ChatMessage {
        /// Creates a message without server-assigned fields.
        pub fn new(user: impl Into<String>, body: impl Into<String>) -> Self {
            Self {
                id: None,
                creation_time: None,
                user: user.into(),
                body: body.into(),
            }
        }
    }

    /// `chat:getMessages`: the message list, oldest first.
    pub struct GetMessages;

    impl Function for GetMessages {
        const KIND: FunctionKind = FunctionKind::Query;
        const PATH: &'static str = "chat:getMessages";
        type Args = NoArgs;
        type Output = Vec<ChatMessage>;
    }

    impl QueryFunction for GetMessages {}

    /// Arguments to `chat:sendMessage`.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct SendMessageArgs {
        /// Display name of the author.
        pub user: String,
        /// Message text.
        pub body: String,
    }

    /// `chat:sendMessage`: appends one message.
    pub struct SendMessage;

    impl Function for SendMessage {
        const KIND: FunctionKind = FunctionKind::Mutation;
        const PATH: &'static str = "chat:sendMessage";
        type Args = SendMessageArgs;
        type Output = serde_json::Value;
    }

    impl MutationFunction for SendMessage {}

}
