//! 分层配置
//!
//! `Environment` 按优先级持有多个配置源，查询时取第一个命中的值。
//! 典型组合：TOML 文件（最低）< 内存覆盖 < 环境变量（最高）。

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use parking_lot::RwLock;

use crate::error::{ConfigError, ConfigResult};

/// 配置值类型
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<ConfigValue>),
    Table(HashMap<String, ConfigValue>),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            ConfigValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::Int(i) => Some(*i != 0),
            ConfigValue::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// 字符串数组；逗号分隔的字符串也被接受（便于通过环境变量传入列表）
    pub fn as_string_array(&self) -> Option<Vec<String>> {
        match self {
            ConfigValue::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect(),
            ),
            ConfigValue::String(s) => Some(
                s.split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect(),
            ),
            _ => None,
        }
    }

    fn from_toml(value: &toml::Value) -> Self {
        match value {
            toml::Value::String(s) => ConfigValue::String(s.clone()),
            toml::Value::Integer(i) => ConfigValue::Int(*i),
            toml::Value::Float(f) => ConfigValue::Float(*f),
            toml::Value::Boolean(b) => ConfigValue::Bool(*b),
            toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
            toml::Value::Array(items) => {
                ConfigValue::Array(items.iter().map(Self::from_toml).collect())
            }
            toml::Value::Table(table) => ConfigValue::Table(
                table
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_toml(v)))
                    .collect(),
            ),
        }
    }
}

/// 配置源
pub trait PropertySource: Send + Sync {
    fn name(&self) -> &str;

    fn get(&self, key: &str) -> Option<ConfigValue>;

    /// 数字越大优先级越高
    fn priority(&self) -> i32 {
        0
    }
}

/// 配置管理器
#[derive(Default)]
pub struct Environment {
    sources: RwLock<Vec<Box<dyn PropertySource>>>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sources = self.sources.read();
        f.debug_struct("Environment")
            .field(
                "sources",
                &sources.iter().map(|s| s.name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式添加配置源
    pub fn with_source(self, source: impl PropertySource + 'static) -> Self {
        self.add_property_source(Box::new(source));
        self
    }

    pub fn add_property_source(&self, source: Box<dyn PropertySource>) {
        let mut sources = self.sources.write();
        sources.push(source);
        sources.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        let sources = self.sources.read();
        let found = sources
            .iter()
            .find_map(|source| source.get(key).map(|value| (source.name().to_string(), value)));

        match found {
            Some((source, value)) => {
                tracing::trace!(key, source = %source, "Config value resolved");
                Some(value)
            }
            None => None,
        }
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(String::from))
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    pub fn get_string_array(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).and_then(|v| v.as_string_array())
    }

    /// 严格读取整数：键存在但无法解析时返回错误而不是静默回退
    pub fn try_get_i64(&self, key: &str) -> ConfigResult<Option<i64>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_i64()
                .map(Some)
                .ok_or_else(|| ConfigError::invalid(key, format!("expected integer, got {:?}", value))),
        }
    }

    /// 严格读取布尔值
    pub fn try_get_bool(&self, key: &str) -> ConfigResult<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_bool()
                .map(Some)
                .ok_or_else(|| ConfigError::invalid(key, format!("expected boolean, got {:?}", value))),
        }
    }
}

// ========== Property Sources ==========

/// 环境变量配置源
///
/// `api.convention.default-ok-code` 对应 `WAYPOINT_API_CONVENTION_DEFAULT_OK_CODE`
pub struct EnvironmentPropertySource {
    prefix: String,
}

impl EnvironmentPropertySource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn key_to_env(&self, key: &str) -> String {
        let body: String = key
            .chars()
            .map(|c| match c {
                '.' | '-' => '_',
                other => other.to_ascii_uppercase(),
            })
            .collect();
        format!("{}{}", self.prefix, body)
    }
}

impl PropertySource for EnvironmentPropertySource {
    fn name(&self) -> &str {
        "environment"
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        std::env::var(self.key_to_env(key))
            .ok()
            .map(ConfigValue::String)
    }

    fn priority(&self) -> i32 {
        100
    }
}

/// TOML 文件配置源，嵌套表会被展平为点分键
pub struct TomlPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl TomlPropertySource {
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content, path.to_string_lossy())
    }

    pub fn parse(content: &str, name: impl Into<String>) -> ConfigResult<Self> {
        let name = name.into();
        let value: toml::Value = toml::from_str(content).map_err(|e| ConfigError::Parse {
            name: name.clone(),
            message: e.to_string(),
        })?;

        let mut properties = HashMap::new();
        Self::flatten(&value, "", &mut properties);

        Ok(Self {
            name,
            properties,
            priority: 0,
        })
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    fn flatten(value: &toml::Value, prefix: &str, out: &mut HashMap<String, ConfigValue>) {
        match value {
            toml::Value::Table(table) => {
                for (key, nested) in table {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    Self::flatten(nested, &path, out);
                }
            }
            other => {
                out.insert(prefix.to_string(), ConfigValue::from_toml(other));
            }
        }
    }
}

impl PropertySource for TomlPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// 内存配置源（测试或运行时覆盖）
pub struct MapPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl MapPropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
            priority: 50,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: ConfigValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[api]
debug = true

[api.convention]
date-time-format = "%d.%m.%Y"
keys-to-hide = ["password", "pin"]
default-ok-code = 201
"#;

    #[test]
    fn test_toml_source_flattens_tables() {
        let source = TomlPropertySource::parse(SAMPLE, "sample").unwrap();

        assert_eq!(
            source.get("api.convention.date-time-format"),
            Some(ConfigValue::String("%d.%m.%Y".into()))
        );
        assert_eq!(source.get("api.debug"), Some(ConfigValue::Bool(true)));
        assert!(source.get("api.convention").is_none());
    }

    #[test]
    fn test_priority_order() {
        let env = Environment::new()
            .with_source(TomlPropertySource::parse(SAMPLE, "sample").unwrap())
            .with_source(
                MapPropertySource::new("overrides")
                    .with_property("api.convention.default-ok-code", ConfigValue::Int(202)),
            );

        assert_eq!(env.get_i64("api.convention.default-ok-code"), Some(202));
        assert_eq!(
            env.get_string_array("api.convention.keys-to-hide"),
            Some(vec!["password".to_string(), "pin".to_string()])
        );
    }

    #[test]
    fn test_comma_separated_array() {
        let value = ConfigValue::String("password, pin,,cc".into());
        assert_eq!(
            value.as_string_array(),
            Some(vec!["password".into(), "pin".into(), "cc".into()])
        );
    }

    #[test]
    fn test_strict_getters_reject_garbage() {
        let env = Environment::new().with_source(
            MapPropertySource::new("m")
                .with_property("a", ConfigValue::String("abc".into()))
                .with_property("b", ConfigValue::String("yes".into())),
        );

        assert!(env.try_get_i64("a").is_err());
        assert_eq!(env.try_get_bool("b").unwrap(), Some(true));
        assert_eq!(env.try_get_i64("missing").unwrap(), None);
    }

    #[test]
    fn test_env_key_mapping() {
        let source = EnvironmentPropertySource::new("WAYPOINT_");
        assert_eq!(
            source.key_to_env("api.convention.default-ok-code"),
            "WAYPOINT_API_CONVENTION_DEFAULT_OK_CODE"
        );
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            TomlPropertySource::parse("[api", "broken"),
            Err(ConfigError::Parse { .. })
        ));
    }
}
