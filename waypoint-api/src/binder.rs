//! 参数绑定
//!
//! 按动作描述中的参数表，从合并后的请求参数里为每个位置生成一个 JSON 值，
//! 随后由宏生成的调用入口反序列化成方法签名中的具体类型。
//!
//! 每个参数依次尝试：
//! 1. 名为 `data` 的参数接收整个参数包（必须是映射类型）
//! 2. 同名请求参数：空值（null、空串、0、false、空集合）合成为该类型的空值，否则按类型转换
//! 3. 声明的默认值
//! 4. 可空参数取 null
//! 5. 以上都不满足时报 `MissingParameter`

use serde::de::DeserializeOwned;
use serde_json::{Number, Value as Json};

use crate::endpoint::{ActionDescriptor, EndpointDescriptor, ParamKind, ParamSpec};
use crate::error::{ActionResult, BindingError, Halt};
use crate::params::RequestParams;

pub fn bind(
    endpoint: &EndpointDescriptor,
    action: &ActionDescriptor,
    params: &RequestParams,
) -> Result<Vec<Json>, BindingError> {
    action
        .params()
        .iter()
        .enumerate()
        .map(|(position, spec)| bind_one(endpoint, action, params, position, spec))
        .collect()
}

fn bind_one(
    endpoint: &EndpointDescriptor,
    action: &ActionDescriptor,
    params: &RequestParams,
    position: usize,
    spec: &ParamSpec,
) -> Result<Json, BindingError> {
    if spec.is_data() {
        return match spec.kind {
            ParamKind::Map | ParamKind::Any => Ok(params.to_json()),
            _ => Err(BindingError::InvalidDataParameter {
                endpoint: endpoint.type_name().to_string(),
                method: action.method().to_string(),
            }),
        };
    }

    if let Some(value) = params.get(&spec.name) {
        return if is_empty(value) {
            empty_value(spec).ok_or_else(|| BindingError::CannotSynthesizeEmptyValue {
                endpoint: endpoint.type_name().to_string(),
                method: action.method().to_string(),
                parameter: spec.name.clone(),
                type_name: spec.kind.type_name().to_string(),
            })
        } else {
            coerce(spec, value)
        };
    }

    if let Some(default) = &spec.default {
        return Ok(default.clone());
    }

    if spec.nullable {
        return Ok(Json::Null);
    }

    Err(BindingError::MissingParameter {
        endpoint: endpoint.type_name().to_string(),
        method: action.method().to_string(),
        parameter: spec.name.clone(),
        position,
    })
}

/// 空值：null、空字符串、数字 0、false、空数组、空对象
pub fn is_empty(value: &Json) -> bool {
    match value {
        Json::Null => true,
        Json::Bool(b) => !b,
        Json::Number(n) => n.as_f64() == Some(0.0),
        Json::String(s) => s.is_empty(),
        Json::Array(items) => items.is_empty(),
        Json::Object(map) => map.is_empty(),
    }
}

fn empty_value(spec: &ParamSpec) -> Option<Json> {
    if spec.nullable {
        return Some(Json::Null);
    }
    match spec.kind {
        ParamKind::Bool => Some(Json::Bool(false)),
        ParamKind::Int => Some(Json::from(0)),
        ParamKind::Float => Some(Json::from(0.0)),
        ParamKind::String => Some(Json::String(String::new())),
        ParamKind::List => Some(Json::Array(Vec::new())),
        ParamKind::Map => Some(Json::Object(Default::default())),
        ParamKind::Any => Some(Json::Null),
        ParamKind::Object(_) => None,
    }
}

fn coerce(spec: &ParamSpec, value: &Json) -> Result<Json, BindingError> {
    let invalid = || BindingError::InvalidArgumentType {
        parameter: spec.name.clone(),
        message: format!("expected {}, got {}", spec.kind.type_name(), value),
    };

    match spec.kind {
        ParamKind::Bool => Ok(Json::Bool(parse_bool(value))),
        ParamKind::Int => match value {
            Json::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                .map(Json::from)
                .ok_or_else(invalid),
            Json::String(s) => parse_int(s.trim()).map(Json::from).ok_or_else(invalid),
            Json::Bool(b) => Ok(Json::from(i64::from(*b))),
            _ => Err(invalid()),
        },
        ParamKind::Float => match value {
            Json::Number(_) => Ok(value.clone()),
            Json::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Json::Number)
                .ok_or_else(invalid),
            Json::Bool(b) => Ok(Json::from(if *b { 1.0 } else { 0.0 })),
            _ => Err(invalid()),
        },
        ParamKind::String => match value {
            Json::String(_) => Ok(value.clone()),
            Json::Number(n) => Ok(Json::String(n.to_string())),
            Json::Bool(b) => Ok(Json::String(if *b { "1" } else { "" }.to_string())),
            _ => Err(invalid()),
        },
        ParamKind::List | ParamKind::Map | ParamKind::Any | ParamKind::Object(_) => {
            Ok(value.clone())
        }
    }
}

/// "1"、"true"、"yes"（忽略大小写）为真，其余为假
fn parse_bool(value: &Json) -> bool {
    let text = match value {
        Json::Bool(b) => return *b,
        Json::String(s) => s.trim().to_ascii_lowercase(),
        Json::Number(n) => n.to_string(),
        _ => return false,
    };
    matches!(text.as_str(), "1" | "true" | "yes")
}

fn parse_int(text: &str) -> Option<i64> {
    text.parse::<i64>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
}

/// 在动作入口中取出下一个已绑定参数并反序列化
pub fn take_arg<T, I>(args: &mut I, parameter: &str) -> ActionResult<T>
where
    T: DeserializeOwned,
    I: Iterator<Item = Json>,
{
    let value = args.next().ok_or_else(|| BindingError::MissingArgument {
        parameter: parameter.to_string(),
    })?;
    serde_json::from_value(value).map_err(|e| {
        Halt::from(BindingError::InvalidArgumentType {
            parameter: parameter.to_string(),
            message: e.to_string(),
        })
    })
}
