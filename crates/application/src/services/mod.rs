//! 应用服务模块

pub mod account_service;

pub use account_service::{AccountItem, AccountService, AccountServiceDependencies};
