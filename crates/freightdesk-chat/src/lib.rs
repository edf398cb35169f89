//! Quote-scoped messaging for the freight desk.
//!
//! A [`ChatSession`] maps business conversations (a quote, optionally
//! narrowed to a shipment or a counterparty branch) onto provider channels,
//! keeps one short-lived chat credential current and mirrors each joined
//! channel's messages locally.

pub mod auth;
pub mod backend;
pub mod config;
pub mod credential;
pub mod error;
pub mod events;
pub mod message_store;
pub mod provider;
pub mod realtime;
pub mod scope;
pub mod session;
pub mod thread;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::AuthSession;
pub use backend::{BackendError, ChatBackend, HttpChatBackend};
pub use config::ChatConfig;
pub use credential::{Credential, RefreshOptions};
pub use error::ChatError;
pub use events::{ChatEvent, EventBus};
pub use message_store::{Message, MessageStore};
pub use provider::{ClientEvent, MessagingClient, MessagingProvider, ProviderError};
pub use realtime::{RealtimeConfig, RealtimeProvider};
pub use scope::{QuoteContext, Resolution, ResolveOptions};
pub use session::{
    BroadcastOutcome, BulkOpenOutcome, ChatSession, PeerThreadOptions, Recipient,
};
pub use thread::{ConversationKind, Scope, Thread, ThreadOrigin};
