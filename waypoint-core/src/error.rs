//! 统一的错误类型
//!
//! 应用层代码（端点实现、工厂闭包）使用 `anyhow::Result` 并通过 `.context()` 附加上下文，
//! 框架自身的失败则使用下面这些 `thiserror` 枚举，以便调用方按种类匹配。

use std::path::PathBuf;
use thiserror::Error;

pub use anyhow::Result;

/// 配置相关错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置值存在但不合法
    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// 配置文件解析失败
    #[error("Failed to parse configuration '{name}': {message}")]
    Parse { name: String, message: String },

    /// 配置文件读取失败
    #[error("Failed to read configuration file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// 容器相关错误
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("No component registered for type '{type_name}'")]
    NotRegistered { type_name: String },

    #[error("Component '{type_name}' is already registered")]
    AlreadyRegistered { type_name: String },

    #[error("Component '{type_name}' has an unexpected concrete type")]
    TypeMismatch { type_name: String },

    #[error("Circular dependency detected while creating '{type_name}'")]
    CircularDependency { type_name: String },

    #[error("Factory for '{type_name}' failed")]
    Factory {
        type_name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// 应用启动阶段的错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Container(#[from] ContainerError),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
pub type ContainerResult<T> = std::result::Result<T, ContainerError>;
pub type ApplicationResult<T> = std::result::Result<T, ApplicationError>;
