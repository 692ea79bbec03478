//! 安全序列化
//!
//! 把端点返回的 [`Value`] 树转换成 JSON，同时：
//! - 限制嵌套深度，拦截共享对象的重复引用与环
//! - 对敏感字段脱敏（看起来像密码哈希的值除外）
//! - 日期时间按约定格式输出，枚举输出底层值或成员名
//! - 分页器与条目列表只允许出现在约定的键下

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::{Map, Number, Value as Json};
use waypoint_core::Convention;

use crate::error::SerializationError;
use crate::response::JsonResponse;
use crate::value::{EnumBacking, Record, Value};

/// 脱敏后的占位符
pub const REDACTED: &str = "*****";

/// 默认的最大嵌套深度
pub const DEFAULT_DEPTH_BUDGET: usize = 32;

const PAGINATOR_KEY: &str = "paginator";
const ITEMS_KEY: &str = "items";

fn password_hash_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\$2[abxy]?\$\d{2}\$[./A-Za-z0-9]{53}$").expect("password hash pattern is valid")
    })
}

/// 值是否像 bcrypt 风格的密码哈希
pub fn is_password_hash(value: &str) -> bool {
    password_hash_pattern().is_match(value)
}

#[derive(Debug, Clone)]
pub struct Serializer {
    convention: Arc<Convention>,
    depth_budget: usize,
}

/// 本次调用中已经访问过的对象身份
#[derive(Default)]
struct Visited(HashSet<*const Record>);

impl Visited {
    fn enter(&mut self, record: &Arc<Record>) -> bool {
        self.0.insert(Arc::as_ptr(record))
    }
}

impl Serializer {
    pub fn new(convention: Arc<Convention>) -> Self {
        Self {
            convention,
            depth_budget: DEFAULT_DEPTH_BUDGET,
        }
    }

    pub fn with_depth_budget(mut self, budget: usize) -> Self {
        self.depth_budget = budget;
        self
    }

    pub fn convention(&self) -> &Convention {
        &self.convention
    }

    /// 转换为 JSON 树
    pub fn serialize(&self, value: &Value) -> Result<Json, SerializationError> {
        let mut visited = Visited::default();
        self.process(value, 0, &mut visited)
    }

    /// 序列化后包装成 [`JsonResponse`]
    pub fn serialize_response(&self, value: &Value) -> Result<JsonResponse, SerializationError> {
        self.serialize(value).map(|json| JsonResponse::new(Value::from(json)))
    }

    fn process(
        &self,
        value: &Value,
        depth: usize,
        visited: &mut Visited,
    ) -> Result<Json, SerializationError> {
        if depth >= self.depth_budget {
            return Err(SerializationError::TooDeep {
                budget: self.depth_budget,
            });
        }

        Ok(match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => Json::Number(Number::from_f64(*f).ok_or_else(|| {
                SerializationError::Unserializable {
                    reason: format!("float {} has no JSON representation", f),
                }
            })?),
            Value::String(s) => Json::String(s.clone()),
            Value::DateTime(dt) => Json::String(self.format_datetime(dt)?),
            Value::Enum(e) => match &e.backing {
                Some(EnumBacking::Int(i)) => Json::from(*i),
                Some(EnumBacking::String(s)) => Json::String(s.clone()),
                None => Json::String(e.name.clone()),
            },
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    check_placement(&index.to_string(), item)?;
                    out.push(self.process(item, depth + 1, visited)?);
                }
                Json::Array(out)
            }
            Value::Map(fields) => {
                Json::Object(self.process_fields(fields.iter(), depth, visited)?)
            }
            Value::Paginator(p) => self.process(&p.to_value(), depth, visited)?,
            Value::ItemsList(list) => self.process(&list.to_value(), depth, visited)?,
            Value::StatusCount(s) => self.process(&s.to_value(), depth, visited)?,
            Value::Object(record) => {
                if self.convention.rewrite_stringable() {
                    if let Some(display) = record.display() {
                        return Ok(Json::String(display.to_string()));
                    }
                }
                if !visited.enter(record) {
                    return Err(SerializationError::CyclicStructure {
                        type_name: record.type_name().to_string(),
                    });
                }
                record.with_fields(|fields| {
                    let public = fields.iter().filter(|(name, _)| !name.starts_with('_'));
                    self.process_fields(public, depth, visited).map(Json::Object)
                })?
            }
        })
    }

    fn process_fields<'a>(
        &self,
        fields: impl Iterator<Item = &'a (String, Value)>,
        depth: usize,
        visited: &mut Visited,
    ) -> Result<Map<String, Json>, SerializationError> {
        let mut out = Map::new();
        for (key, value) in fields {
            check_placement(key, value)?;

            let json = if self.convention.is_hidden_key(key) && !is_unredactable(value) {
                tracing::warn!(
                    target: "waypoint::security",
                    key = %key,
                    "Sensitive field was redacted from API output"
                );
                Json::String(REDACTED.to_string())
            } else {
                self.process(value, depth + 1, visited)?
            };

            if json.is_null() && self.convention.omit_null_fields() {
                continue;
            }
            out.insert(key.clone(), json);
        }
        Ok(out)
    }

    fn format_datetime(
        &self,
        dt: &chrono::DateTime<chrono::FixedOffset>,
    ) -> Result<String, SerializationError> {
        let mut formatted = String::new();
        write!(formatted, "{}", dt.format(self.convention.date_time_format())).map_err(|_| {
            SerializationError::Unserializable {
                reason: format!(
                    "date time format \"{}\" is invalid",
                    self.convention.date_time_format()
                ),
            }
        })?;
        Ok(formatted)
    }
}

/// 敏感键下的值是密码哈希时原样放行
fn is_unredactable(value: &Value) -> bool {
    value.as_str().is_some_and(is_password_hash)
}

/// 分页器只能放在 `paginator` 键下，条目列表只能放在 `items` 键下
fn check_placement(key: &str, value: &Value) -> Result<(), SerializationError> {
    match value {
        Value::Paginator(_) if key != PAGINATOR_KEY => Err(SerializationError::ConventionViolation {
            kind: "Paginator",
            expected: PAGINATOR_KEY,
            found: key.to_string(),
        }),
        Value::ItemsList(_) if key != ITEMS_KEY => Err(SerializationError::ConventionViolation {
            kind: "ItemsList",
            expected: ITEMS_KEY,
            found: key.to_string(),
        }),
        _ => Ok(()),
    }
}
