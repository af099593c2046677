//! 核心实体定义

pub mod account;
pub mod contact;
pub mod setting;

pub use account::{AccountProfile, AccountStatus, TelegramAccount};
pub use contact::ContactedChat;
pub use setting::{setting_keys, ClientSetting};
