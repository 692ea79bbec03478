//! 响应类型
//!
//! 端点可以返回三类响应：原样输出的 JSON、重定向、以及带 `state` 信封的状态响应。
//! 这里只保存未序列化的 [`Value`] 树，统一由分发器在最后一步序列化。

use thiserror::Error;

use crate::value::{Fields, Value};

pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";

/// 默认的重定向状态码
pub const DEFAULT_REDIRECT_CODE: u16 = 301;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponseError {
    #[error("Redirect URL must be an absolute http(s) URL, but \"{url}\" given")]
    InvalidRedirectUrl { url: String },
}

/// 处理器产生的响应
#[derive(Debug, Clone)]
pub enum Response {
    Json(JsonResponse),
    Redirect(RedirectResponse),
    Status(StatusResponse),
}

impl Response {
    pub fn json(payload: impl Into<Value>) -> Self {
        Response::Json(JsonResponse::new(payload))
    }

    pub fn http_code(&self) -> u16 {
        match self {
            Response::Json(r) => r.http_code,
            Response::Redirect(r) => r.http_code,
            Response::Status(r) => r.code,
        }
    }

    pub fn content_type(&self) -> &'static str {
        CONTENT_TYPE_JSON
    }

    /// 重定向目标
    pub fn location(&self) -> Option<&str> {
        match self {
            Response::Redirect(r) => Some(&r.url),
            _ => None,
        }
    }

    /// 待序列化的响应体
    pub fn into_body(self) -> Value {
        match self {
            Response::Json(r) => r.payload,
            Response::Redirect(r) => Value::map([("location", r.url)]),
            Response::Status(r) => r.into_envelope(),
        }
    }
}

impl From<JsonResponse> for Response {
    fn from(r: JsonResponse) -> Self {
        Response::Json(r)
    }
}

impl From<RedirectResponse> for Response {
    fn from(r: RedirectResponse) -> Self {
        Response::Redirect(r)
    }
}

impl From<StatusResponse> for Response {
    fn from(r: StatusResponse) -> Self {
        Response::Status(r)
    }
}

/// 原样输出的 JSON 响应
#[derive(Debug, Clone)]
pub struct JsonResponse {
    payload: Value,
    http_code: u16,
}

impl JsonResponse {
    pub fn new(payload: impl Into<Value>) -> Self {
        Self::with_code(payload, 200)
    }

    pub fn with_code(payload: impl Into<Value>, http_code: u16) -> Self {
        Self {
            payload: payload.into(),
            http_code,
        }
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub(crate) fn payload_mut(&mut self) -> &mut Value {
        &mut self.payload
    }

    pub fn http_code(&self) -> u16 {
        self.http_code
    }
}

/// 重定向响应，响应体为 `{"location": url}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectResponse {
    url: String,
    http_code: u16,
}

impl RedirectResponse {
    pub fn new(url: impl Into<String>) -> Result<Self, ResponseError> {
        Self::with_code(url, DEFAULT_REDIRECT_CODE)
    }

    pub fn with_code(url: impl Into<String>, http_code: u16) -> Result<Self, ResponseError> {
        let url = url.into();
        match url::Url::parse(&url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => {
                Ok(Self { url, http_code })
            }
            _ => Err(ResponseError::InvalidRedirectUrl { url }),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn http_code(&self) -> u16 {
        self.http_code
    }
}

/// 状态响应的种类，对应信封中的 `state`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Ok,
    Success,
    Error,
}

impl StatusKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusKind::Ok => "ok",
            StatusKind::Success => "success",
            StatusKind::Error => "error",
        }
    }
}

/// 状态响应的数据部分，可以嵌套另一个响应
#[derive(Debug, Clone)]
pub enum StatusData {
    Value(Value),
    Response(Box<Response>),
}

impl Default for StatusData {
    fn default() -> Self {
        StatusData::Value(Value::empty_map())
    }
}

impl From<Value> for StatusData {
    fn from(v: Value) -> Self {
        StatusData::Value(v)
    }
}

impl StatusData {
    pub fn nested(response: impl Into<Response>) -> Self {
        StatusData::Response(Box::new(response.into()))
    }

    fn into_value(self) -> Value {
        match self {
            StatusData::Value(v) => v,
            StatusData::Response(r) => r.into_body(),
        }
    }
}

/// 闪现消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashKind {
    Success,
    Info,
    Warning,
    Error,
}

impl FlashKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FlashKind::Success => "success",
            FlashKind::Info => "info",
            FlashKind::Warning => "warning",
            FlashKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashMessage {
    pub message: String,
    pub kind: FlashKind,
}

impl FlashMessage {
    pub fn new(message: impl Into<String>, kind: FlashKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    pub fn to_value(&self) -> Value {
        Value::map([
            ("message", self.message.as_str()),
            ("type", self.kind.as_str()),
        ])
    }
}

pub(crate) fn flash_messages_value(messages: &[FlashMessage]) -> Value {
    Value::List(messages.iter().map(FlashMessage::to_value).collect())
}

/// 带 `{state, message, code, data|hint}` 信封的响应
#[derive(Debug, Clone)]
pub struct StatusResponse {
    kind: StatusKind,
    message: Option<String>,
    code: u16,
    data: StatusData,
    hint: Option<String>,
    flash_messages: Vec<FlashMessage>,
}

impl StatusResponse {
    fn new(kind: StatusKind, code: u16) -> Self {
        Self {
            kind,
            message: None,
            code,
            data: StatusData::default(),
            hint: None,
            flash_messages: Vec::new(),
        }
    }

    pub fn ok(data: impl Into<StatusData>) -> Self {
        Self::new(StatusKind::Ok, 200).with_data(data)
    }

    pub fn success(data: impl Into<StatusData>) -> Self {
        Self::new(StatusKind::Success, 200).with_data(data)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Error, 500).with_message(message)
    }

    /// 不带消息的错误（非调试模式下的内部错误）
    pub fn bare_error() -> Self {
        Self::new(StatusKind::Error, 500)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::error(message).with_code(404)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// 信封中的 `code` 同时也是 HTTP 状态码
    pub fn with_code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    pub fn with_data(mut self, data: impl Into<StatusData>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_flash_messages(mut self, messages: Vec<FlashMessage>) -> Self {
        self.flash_messages = messages;
        self
    }

    /// 追加到已有的闪现消息之后
    pub fn append_flash_messages(mut self, messages: Vec<FlashMessage>) -> Self {
        self.flash_messages.extend(messages);
        self
    }

    pub fn flash_messages(&self) -> &[FlashMessage] {
        &self.flash_messages
    }

    pub fn kind(&self) -> StatusKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    fn into_envelope(self) -> Value {
        let mut fields: Fields = vec![
            ("state".to_string(), Value::from(self.kind.as_str())),
            ("message".to_string(), Value::from(self.message)),
            ("code".to_string(), Value::from(self.code)),
        ];
        match self.kind {
            StatusKind::Error => fields.push(("hint".to_string(), Value::from(self.hint))),
            StatusKind::Ok | StatusKind::Success => {
                fields.push(("data".to_string(), self.data.into_value()))
            }
        }
        if !self.flash_messages.is_empty() {
            fields.push((
                "flashMessages".to_string(),
                flash_messages_value(&self.flash_messages),
            ));
        }
        Value::Map(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::Serializer;
    use serde_json::json;
    use std::sync::Arc;
    use waypoint_core::Convention;

    fn body(response: impl Into<Response>) -> serde_json::Value {
        let serializer = Serializer::new(Arc::new(Convention::default()));
        serializer.serialize(&response.into().into_body()).unwrap()
    }

    #[test]
    fn test_ok_envelope() {
        let response = StatusResponse::ok(Value::map([("id", 1)])).with_message("Saved");
        assert_eq!(
            body(response),
            json!({"state": "ok", "message": "Saved", "code": 200, "data": {"id": 1}})
        );
    }

    #[test]
    fn test_error_envelope() {
        let response = StatusResponse::error("Nope").with_code(409).with_hint("Try again");
        let response = Response::from(response);
        assert_eq!(response.http_code(), 409);
        assert_eq!(
            body(response),
            json!({"state": "error", "message": "Nope", "code": 409, "hint": "Try again"})
        );
    }

    #[test]
    fn test_not_found_is_error_with_404() {
        let response = Response::from(StatusResponse::not_found("No such article"));
        assert_eq!(response.http_code(), 404);
        assert_eq!(
            body(response),
            json!({"state": "error", "message": "No such article", "code": 404, "hint": null})
        );
    }

    #[test]
    fn test_nested_response_as_data() {
        let inner = JsonResponse::new(Value::map([("a", 1)]));
        let response = StatusResponse::success(StatusData::nested(inner));
        assert_eq!(body(response)["data"], json!({"a": 1}));
    }

    #[test]
    fn test_flash_messages_in_envelope() {
        let response = StatusResponse::ok(Value::empty_map())
            .with_flash_messages(vec![FlashMessage::new("Done", FlashKind::Success)]);
        assert_eq!(
            body(response)["flashMessages"],
            json!([{"message": "Done", "type": "success"}])
        );
    }

    #[test]
    fn test_redirect() {
        let redirect = RedirectResponse::new("https://example.com/a").unwrap();
        assert_eq!(redirect.http_code(), 301);
        let response = Response::from(redirect);
        assert_eq!(response.location(), Some("https://example.com/a"));
        assert_eq!(body(response), json!({"location": "https://example.com/a"}));

        assert!(RedirectResponse::new("/relative").is_err());
        assert!(RedirectResponse::new("ftp://example.com").is_err());
        assert_eq!(
            RedirectResponse::with_code("http://example.com", 302)
                .unwrap()
                .http_code(),
            302
        );
    }
}
