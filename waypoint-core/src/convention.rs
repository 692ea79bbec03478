//! 格式约定
//!
//! `Convention` 是序列化器和分发器共享的全局格式/策略配置。
//! 启动时构建一次，之后以 `Arc<Convention>` 只读共享给所有请求。

use serde::{Deserialize, Serialize};

use crate::config::Environment;
use crate::error::{ConfigError, ConfigResult};

/// 默认需要脱敏的字段名（大小写敏感）
pub const DEFAULT_KEYS_TO_HIDE: &[&str] = &[
    "password",
    "passwd",
    "pass",
    "pwd",
    "creditcard",
    "credit card",
    "cc",
    "pin",
];

/// 默认日期时间格式（strftime 语法）
pub const DEFAULT_DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const CONFIG_PREFIX: &str = "api.convention";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Convention {
    date_time_format: String,
    default_error_code: u16,
    default_ok_code: u16,
    keys_to_hide: Vec<String>,
    rewrite_stringable: bool,
    ignore_default_permission: bool,
    omit_null_fields: bool,
}

impl Default for Convention {
    fn default() -> Self {
        Self {
            date_time_format: DEFAULT_DATE_TIME_FORMAT.to_string(),
            default_error_code: 500,
            default_ok_code: 200,
            keys_to_hide: DEFAULT_KEYS_TO_HIDE.iter().map(|k| k.to_string()).collect(),
            rewrite_stringable: true,
            ignore_default_permission: false,
            omit_null_fields: false,
        }
    }
}

impl Convention {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 `api.convention.*` 读取配置，未配置的项保留默认值
    pub fn from_environment(env: &Environment) -> ConfigResult<Self> {
        let mut convention = Self::default();
        let key = |name: &str| format!("{}.{}", CONFIG_PREFIX, name);

        if let Some(format) = env.get_string(&key("date-time-format")) {
            convention.set_date_time_format(format)?;
        }
        if let Some(code) = env.try_get_i64(&key("default-error-code"))? {
            convention.set_default_error_code(code)?;
        }
        if let Some(code) = env.try_get_i64(&key("default-ok-code"))? {
            convention.set_default_ok_code(code)?;
        }
        if let Some(keys) = env.get_string_array(&key("keys-to-hide")) {
            convention.set_keys_to_hide(keys);
        }
        if let Some(flag) = env.try_get_bool(&key("rewrite-stringable"))? {
            convention.rewrite_stringable = flag;
        }
        if let Some(flag) = env.try_get_bool(&key("ignore-default-permission"))? {
            convention.ignore_default_permission = flag;
        }
        if let Some(flag) = env.try_get_bool(&key("omit-null-fields"))? {
            convention.omit_null_fields = flag;
        }

        tracing::debug!(?convention, "Convention loaded");
        Ok(convention)
    }

    pub fn date_time_format(&self) -> &str {
        &self.date_time_format
    }

    pub fn set_date_time_format(&mut self, format: impl Into<String>) -> ConfigResult<()> {
        let format = format.into();
        if format.trim().is_empty() {
            return Err(ConfigError::invalid(
                "date-time-format",
                "DateTime format can not be empty string",
            ));
        }
        self.date_time_format = format;
        Ok(())
    }

    pub fn default_error_code(&self) -> u16 {
        self.default_error_code
    }

    pub fn set_default_error_code(&mut self, code: i64) -> ConfigResult<()> {
        self.default_error_code = validate_code("default-error-code", code)?;
        Ok(())
    }

    pub fn default_ok_code(&self) -> u16 {
        self.default_ok_code
    }

    pub fn set_default_ok_code(&mut self, code: i64) -> ConfigResult<()> {
        self.default_ok_code = validate_code("default-ok-code", code)?;
        Ok(())
    }

    pub fn keys_to_hide(&self) -> &[String] {
        &self.keys_to_hide
    }

    pub fn set_keys_to_hide<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys_to_hide = keys.into_iter().map(Into::into).collect();
    }

    /// 字段名是否需要脱敏（精确匹配，大小写敏感）
    pub fn is_hidden_key(&self, key: &str) -> bool {
        self.keys_to_hide.iter().any(|k| k == key)
    }

    pub fn rewrite_stringable(&self) -> bool {
        self.rewrite_stringable
    }

    pub fn set_rewrite_stringable(&mut self, rewrite: bool) {
        self.rewrite_stringable = rewrite;
    }

    pub fn ignore_default_permission(&self) -> bool {
        self.ignore_default_permission
    }

    pub fn set_ignore_default_permission(&mut self, ignore: bool) {
        self.ignore_default_permission = ignore;
    }

    pub fn omit_null_fields(&self) -> bool {
        self.omit_null_fields
    }

    pub fn set_omit_null_fields(&mut self, omit: bool) {
        self.omit_null_fields = omit;
    }
}

fn validate_code(key: &str, code: i64) -> ConfigResult<u16> {
    if !(100..=999).contains(&code) {
        return Err(ConfigError::invalid(
            key,
            format!("Code must be in interval (100; 999), but {} given", code),
        ));
    }
    Ok(code as u16)
}
