//! 动作上下文
//!
//! 每次调用动作方法时创建，替代全局的请求状态：约定、合并后的参数、当前用户、
//! 传输层信息以及本次请求排队的闪现消息。`send_*` 系列方法构造响应并立即结束动作。

use std::sync::Arc;

use waypoint_core::Convention;

use crate::error::{ActionResult, Halt};
use crate::params::{RequestInfo, RequestParams};
use crate::permission::Principal;
use crate::response::{
    flash_messages_value, FlashKind, FlashMessage, JsonResponse, RedirectResponse, Response,
    StatusData, StatusResponse,
};
use crate::value::{Fields, Paginator, Value};

const FLASH_MESSAGES_KEY: &str = "flashMessages";

pub struct ActionContext {
    convention: Arc<Convention>,
    params: RequestParams,
    request: RequestInfo,
    principal: Option<Principal>,
    flash_messages: Vec<FlashMessage>,
}

impl ActionContext {
    pub fn new(convention: Arc<Convention>, params: RequestParams, request: RequestInfo) -> Self {
        Self {
            convention,
            params,
            request,
            principal: None,
            flash_messages: Vec::new(),
        }
    }

    pub fn with_principal(mut self, principal: Option<Principal>) -> Self {
        self.principal = principal;
        self
    }

    pub fn convention(&self) -> &Convention {
        &self.convention
    }

    /// 合并后的全部请求参数
    pub fn data(&self) -> &RequestParams {
        &self.params
    }

    pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
        self.params.get(key)
    }

    pub fn request(&self) -> &RequestInfo {
        &self.request
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn is_user_logged_in(&self) -> bool {
        self.principal.is_some()
    }

    pub fn flash_message(&mut self, message: impl Into<String>, kind: FlashKind) {
        self.flash_messages.push(FlashMessage::new(message, kind));
    }

    pub fn flash_messages(&self) -> &[FlashMessage] {
        &self.flash_messages
    }

    pub fn send_response<T>(&mut self, response: impl Into<Response>) -> ActionResult<T> {
        Err(Halt::Respond(response.into()))
    }

    pub fn send_json<T>(&mut self, payload: impl Into<Value>) -> ActionResult<T> {
        self.send_json_with_code(payload, 200)
    }

    /// 映射形态的载荷会带上排队的闪现消息；载荷自带 `flashMessages` 键时报错
    pub fn send_json_with_code<T>(
        &mut self,
        payload: impl Into<Value>,
        http_code: u16,
    ) -> ActionResult<T> {
        let mut payload = payload.into();
        if let Value::Map(fields) = &mut payload {
            if !self.flash_messages.is_empty() {
                if fields.iter().any(|(k, _)| k == FLASH_MESSAGES_KEY) {
                    return Err(Halt::Fail(anyhow::anyhow!(
                        "Payload key \"{}\" is reserved for flash messages",
                        FLASH_MESSAGES_KEY
                    )));
                }
                let messages = std::mem::take(&mut self.flash_messages);
                fields.push((FLASH_MESSAGES_KEY.to_string(), flash_messages_value(&messages)));
            }
        }
        self.send_response(JsonResponse::with_code(payload, http_code))
    }

    /// 状态响应同样带上闪现消息
    pub fn send_status<T>(&mut self, response: StatusResponse) -> ActionResult<T> {
        let messages = std::mem::take(&mut self.flash_messages);
        self.send_response(response.append_flash_messages(messages))
    }

    /// 把仍在排队的闪现消息附加到动作直接返回的响应上
    ///
    /// 映射载荷已有 `flashMessages` 键或响应为重定向时消息被丢弃。
    pub(crate) fn attach_flash_messages(&mut self, response: Response) -> Response {
        if self.flash_messages.is_empty() {
            return response;
        }
        let messages = std::mem::take(&mut self.flash_messages);
        match response {
            Response::Status(status) => status.append_flash_messages(messages).into(),
            Response::Json(mut json) => {
                match json.payload_mut() {
                    Value::Map(fields) if !fields.iter().any(|(k, _)| k == FLASH_MESSAGES_KEY) => {
                        fields.push((FLASH_MESSAGES_KEY.to_string(), flash_messages_value(&messages)));
                    }
                    _ => tracing::debug!(
                        dropped = messages.len(),
                        "Flash messages can not be attached to a non-map payload"
                    ),
                }
                json.into()
            }
            other => {
                tracing::debug!(dropped = messages.len(), "Flash messages dropped on redirect");
                other
            }
        }
    }

    pub fn send_ok<T>(&mut self, data: impl Into<StatusData>) -> ActionResult<T> {
        let code = self.convention.default_ok_code();
        self.send_status(StatusResponse::ok(data).with_code(code))
    }

    pub fn send_ok_with_message<T>(
        &mut self,
        data: impl Into<StatusData>,
        message: impl Into<String>,
    ) -> ActionResult<T> {
        let code = self.convention.default_ok_code();
        self.send_status(StatusResponse::ok(data).with_message(message).with_code(code))
    }

    pub fn send_success<T>(&mut self, data: impl Into<StatusData>) -> ActionResult<T> {
        let code = self.convention.default_ok_code();
        self.send_status(StatusResponse::success(data).with_code(code))
    }

    pub fn send_error<T>(&mut self, message: impl Into<String>) -> ActionResult<T> {
        let code = self.convention.default_error_code();
        self.send_status(StatusResponse::error(message).with_code(code))
    }

    pub fn send_error_with_code<T>(
        &mut self,
        message: impl Into<String>,
        code: u16,
    ) -> ActionResult<T> {
        self.send_status(StatusResponse::error(message).with_code(code))
    }

    /// `{items, paginator?}` 加上额外字段
    pub fn send_items<T>(
        &mut self,
        items: impl Into<Value>,
        paginator: Option<Paginator>,
        extra: Fields,
    ) -> ActionResult<T> {
        let mut fields: Fields = vec![("items".to_string(), items.into())];
        if let Some(paginator) = paginator {
            fields.push(("paginator".to_string(), Value::Paginator(paginator)));
        }
        fields.extend(extra);
        self.send_json(Value::Map(fields))
    }

    pub fn redirect_url<T>(&mut self, url: impl Into<String>) -> ActionResult<T> {
        let redirect = RedirectResponse::new(url)?;
        self.send_response(redirect)
    }

    pub fn redirect_url_with_code<T>(
        &mut self,
        url: impl Into<String>,
        http_code: u16,
    ) -> ActionResult<T> {
        let redirect = RedirectResponse::with_code(url, http_code)?;
        self.send_response(redirect)
    }
}

/// 把行列表转换成 `{key: value}` 映射
///
/// `key`/`value` 为每行中作为键和值的字段名。缺少键字段的行被跳过。
pub fn format_key_value<'a, I>(rows: I, key: &str, value: &str) -> Value
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut fields = Fields::new();
    for row in rows {
        let Some(row_key) = row.get(key).and_then(scalar_to_key) else {
            continue;
        };
        let row_value = row.get(value).cloned().unwrap_or_default();
        match fields.iter_mut().find(|(k, _)| *k == row_key) {
            Some((_, existing)) => *existing = row_value,
            None => fields.push((row_key, row_value)),
        }
    }
    Value::Map(fields)
}

/// `{key: text}` 对转换成下拉框选项 `[{value, text}]`
pub fn format_select_options<I, K, V>(pairs: I) -> Value
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<Value>,
    V: Into<Value>,
{
    Value::List(
        pairs
            .into_iter()
            .map(|(k, v)| {
                let (value, text): (Value, Value) = (k.into(), v.into());
                Value::map([("value", value), ("text", text)])
            })
            .collect(),
    )
}

fn scalar_to_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        _ => None,
    }
}
