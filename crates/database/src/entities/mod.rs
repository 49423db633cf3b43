//! Entity definitions for the durable store.

pub mod chat;
pub mod message;
pub mod notification;
pub mod user;

pub use chat::{direct_key, Chat, ChatMemberRecord};
pub use message::{CreateMessageRequest, Message, MessageType};
pub use notification::Notification;
pub use user::{CreateUserRequest, PresenceStatus, User, UserSummary};
