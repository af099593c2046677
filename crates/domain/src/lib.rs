//! 多账号电报私信系统核心领域模型
//!
//! 包含账号、私信台账、客户端设置等核心实体，以及仓储接口定义。

pub mod entities;
pub mod errors;
pub mod repositories;

// 重新导出常用类型
pub use entities::*;
pub use errors::*;
pub use repositories::*;
