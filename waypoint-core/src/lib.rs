// waypoint-core: 分发器的基础设施层
//
// 提供：
// - 分层配置（TOML / 环境变量 / 内存覆盖）
// - 格式约定 `Convention`
// - 按类型解析端点实例的组件容器
// - 日志初始化
// - 路由/动作命名约定

pub mod config;
pub mod container;
pub mod convention;
pub mod error;
pub mod logging;
pub mod utils;

pub use config::{
    ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
    TomlPropertySource,
};
pub use container::{Container, Scope, SharedComponent};
pub use convention::Convention;
pub use error::{
    ApplicationError, ApplicationResult, ConfigError, ConfigResult, ContainerError,
    ContainerResult, Result,
};
pub use logging::{LogFormat, LogLevel, LoggingConfig};

pub mod prelude {
    pub use crate::config::{ConfigValue, Environment, MapPropertySource, TomlPropertySource};
    pub use crate::container::{Container, Scope};
    pub use crate::convention::Convention;
    pub use crate::error::Result;
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::utils;
    pub use anyhow::{anyhow, Context};
}
