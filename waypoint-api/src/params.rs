//! 请求参数
//!
//! 查询串、请求体与调用方显式传入的覆盖参数合并成一个扁平的 [`RequestParams`]，
//! 后者优先。请求的其余信息（客户端地址、请求头）放在 [`RequestInfo`] 中，
//! 显式地传给需要它的组件。

use std::net::IpAddr;

use http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::error::BindingError;

/// 合并后的请求参数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestParams(Map<String, Json>);

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Json>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Json>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Json> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Json)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Json> {
        &self.0
    }

    pub fn to_json(&self) -> Json {
        Json::Object(self.0.clone())
    }

    /// JSON 对象按键展开；数组按下标展开（随后会被当作数字键告警）；标量被忽略
    pub fn from_json(value: Json) -> Self {
        match value {
            Json::Object(map) => Self(map),
            Json::Array(items) => Self(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), v))
                    .collect(),
            ),
            _ => Self::default(),
        }
    }

    /// 解析 `application/x-www-form-urlencoded` 形式的参数
    ///
    /// 支持 `tags[]=a&tags[]=b` 形式的数组和 `filter[status]=new` 形式的一层嵌套。
    pub fn from_query(query: &str) -> Self {
        let mut params = Map::new();
        for (name, value) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            let value = Json::String(value.into_owned());
            match split_bracket(&name) {
                Some((base, "")) => {
                    let slot = params
                        .entry(base.to_string())
                        .or_insert_with(|| Json::Array(Vec::new()));
                    match slot {
                        Json::Array(items) => items.push(value),
                        other => *other = Json::Array(vec![value]),
                    }
                }
                Some((base, key)) => {
                    let slot = params
                        .entry(base.to_string())
                        .or_insert_with(|| Json::Object(Map::new()));
                    match slot {
                        Json::Object(map) => {
                            map.insert(key.to_string(), value);
                        }
                        other => {
                            let mut map = Map::new();
                            map.insert(key.to_string(), value);
                            *other = Json::Object(map);
                        }
                    }
                }
                None => {
                    params.insert(name.to_string(), value);
                }
            }
        }
        Self(params)
    }

    /// 按内容类型解析请求体，无法解析的请求体视为空
    pub fn from_body(content_type: Option<&str>, body: &[u8]) -> Self {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Self::default();
        }

        let content_type = content_type.unwrap_or("").to_ascii_lowercase();
        if content_type.starts_with("application/x-www-form-urlencoded") {
            return match std::str::from_utf8(body) {
                Ok(text) => Self::from_query(text),
                Err(_) => Self::default(),
            };
        }

        match serde_json::from_slice::<Json>(body) {
            Ok(value) => Self::from_json(value),
            Err(e) => {
                tracing::debug!(error = %e, content_type = %content_type, "Request body ignored, it is not valid JSON");
                Self::default()
            }
        }
    }

    /// 按顺序合并，后面的层覆盖前面的同名键
    pub fn merge<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = RequestParams>,
    {
        let mut merged = Map::new();
        for layer in layers {
            merged.extend(layer.0);
        }
        Self(merged)
    }

    /// 键名规范化：数字键保留为字符串并告警，空键名是错误
    pub fn normalized(self) -> Result<Self, BindingError> {
        for key in self.0.keys() {
            if key.is_empty() {
                return Err(BindingError::EmptyParameterKey);
            }
            if key.chars().all(|c| c.is_ascii_digit()) {
                tracing::warn!(key = %key, "Numeric request parameter key was converted to a string");
            }
        }
        Ok(self)
    }
}

impl From<Map<String, Json>> for RequestParams {
    fn from(map: Map<String, Json>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Json)> for RequestParams {
    fn from_iter<T: IntoIterator<Item = (String, Json)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// `name[key]` → `(name, key)`；`name[]` → `(name, "")`
fn split_bracket(name: &str) -> Option<(&str, &str)> {
    let open = name.find('[')?;
    let inner = name[open + 1..].strip_suffix(']')?;
    if open == 0 || inner.contains('[') {
        return None;
    }
    Some((&name[..open], inner))
}

/// 请求的传输层信息
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub remote_addr: Option<IpAddr>,
    pub headers: HeaderMap,
}

impl RequestInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// 客户端 IPv4 地址（IPv4 映射的 IPv6 也算）
    pub fn client_ipv4(&self) -> Option<std::net::Ipv4Addr> {
        match self.remote_addr? {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(v6) => v6.to_ipv4_mapped(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_query() {
        let params = RequestParams::from_query("?name=Jan%20Novak&tags[]=a&tags[]=b&filter[status]=new&empty=");
        assert_eq!(params.get("name"), Some(&json!("Jan Novak")));
        assert_eq!(params.get("tags"), Some(&json!(["a", "b"])));
        assert_eq!(params.get("filter"), Some(&json!({"status": "new"})));
        assert_eq!(params.get("empty"), Some(&json!("")));
    }

    #[test]
    fn test_from_body_json_and_form() {
        let json_body = RequestParams::from_body(Some("application/json"), br#"{"a": 1, "b": [true]}"#);
        assert_eq!(json_body.to_json(), json!({"a": 1, "b": [true]}));

        let form = RequestParams::from_body(Some("application/x-www-form-urlencoded"), b"a=1&b=two");
        assert_eq!(form.to_json(), json!({"a": "1", "b": "two"}));

        let garbage = RequestParams::from_body(Some("application/json"), b"{not json");
        assert!(garbage.is_empty());

        assert!(RequestParams::from_body(None, b"  ").is_empty());
    }

    #[test]
    fn test_merge_later_layer_wins() {
        let query = RequestParams::new().with("a", 1).with("b", 1);
        let body = RequestParams::new().with("b", 2).with("c", 2);
        let overrides = RequestParams::new().with("c", 3);

        let merged = RequestParams::merge([query, body, overrides]);
        assert_eq!(merged.to_json(), json!({"a": 1, "b": 2, "c": 3}));
    }

    #[test]
    fn test_normalized() {
        let numeric = RequestParams::from_json(json!(["x", "y"]));
        let numeric = numeric.normalized().unwrap();
        assert_eq!(numeric.get("0"), Some(&json!("x")));

        let empty = RequestParams::new().with("", 1);
        assert_eq!(empty.normalized(), Err(BindingError::EmptyParameterKey));
    }

    #[test]
    fn test_client_ipv4() {
        let info = RequestInfo::new().with_remote_addr("10.0.0.7".parse().unwrap());
        assert_eq!(info.client_ipv4(), Some("10.0.0.7".parse().unwrap()));

        let v6 = RequestInfo::new().with_remote_addr("::1".parse().unwrap());
        assert_eq!(v6.client_ipv4(), None);
    }
}
