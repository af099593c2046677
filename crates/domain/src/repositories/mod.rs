//! 仓储接口定义
//!
//! 持久化层的抽象边界；具体实现位于 infrastructure crate。

pub mod account_repository;
pub mod contact_repository;
pub mod settings_repository;

pub use account_repository::AccountRepository;
pub use contact_repository::ContactRepository;
pub use settings_repository::SettingsRepository;

#[cfg(feature = "testing")]
pub use account_repository::MockAccountRepository;
#[cfg(feature = "testing")]
pub use contact_repository::MockContactRepository;
#[cfg(feature = "testing")]
pub use settings_repository::MockSettingsRepository;
