//! Conversation layer for the support-desk platform.
//!
//! This crate provides:
//!
//! - **Turns**: Append-only conversation history entries
//! - **State Store**: Scoped key/value state shared between stages
//! - **Session Context**: Typed view of a session's history and problem summary
//! - **Interaction Channel**: Suspending prompt/reply exchange with the customer
//! - **Tool Registry**: Action tools available during resolution

pub mod error;
pub mod interaction;
pub mod message;
pub mod session;
pub mod state;
pub mod tool;

pub use error::{InteractionError, SessionError, StateError, ToolError};
pub use interaction::{ConsoleChannel, InteractionChannel};
pub use message::{ConversationTurn, Speaker, ToolCall};
pub use session::SessionContext;
pub use state::{InMemoryStateStore, StateKey, StateScope, StateStore, StateStoreExt};
pub use tool::{
    ActionTool, EmailTemplate, SendEmailTool, ToolDefinition, ToolRegistry, ToolResult,
    UnlockAccountTool,
};
