//! 分发器错误类型
//!
//! 按请求处理的阶段分层：
//! 1. **注册阶段** - 路由表构建失败（重名、非法角色），启动时即暴露
//! 2. **路由阶段** - 路径无法映射到端点
//! 3. **绑定阶段** - 请求参数无法满足方法签名
//! 4. **权限阶段** - 由权限扩展直接转换成 401/403 响应
//! 5. **序列化阶段** - 返回值不是合法的 JSON 树
//!
//! 端点内部的业务失败通过 [`Halt`] 传递，`anyhow::Error` 承载任意错误链。

use std::fmt;

use thiserror::Error;

use crate::params::RequestParams;
use crate::response::Response;

/// 路由表构建错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// 两个端点派生出相同的路由名
    #[error("Route \"{route}\" is declared by both \"{first}\" and \"{second}\"")]
    DuplicateRoute {
        route: String,
        first: String,
        second: String,
    },

    /// 角色名不符合 `[a-z0-9-]+`
    #[error("Role \"{role}\" declared on \"{endpoint}\" is invalid: roles must match [a-z0-9-]+")]
    InvalidRole { endpoint: String, role: String },

    /// 同一端点内两个方法映射到同一个动作方法名
    #[error("Endpoint \"{endpoint}\" declares method \"{method}\" more than once")]
    DuplicateAction { endpoint: String, method: String },
}

/// 路由阶段错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// 路径不在 API 前缀之下
    #[error("Path \"{path}\" is not an API path")]
    NotApiPath { path: String },

    #[error("Invalid API version \"{version}\", expected something like \"1\" or \"1.2\"")]
    InvalidVersion { version: String },

    /// `params` 只在调试模式下（经过脱敏）附加到消息中
    #[error("Can not route \"{route}\", because endpoint does not exist.")]
    RouteNotFound { route: String, params: RequestParams },

    #[error("Route \"{route}\" is malformed, expected \"<endpoint>\" or \"<endpoint>/<action>\"")]
    MalformedRoute { route: String },

    /// 端点已注册但解析器无法提供实例
    #[error("Endpoint \"{type_name}\" for route \"{route}\" is not available: {reason}")]
    HandlerUnavailable {
        route: String,
        type_name: String,
        reason: String,
    },
}

impl RoutingError {
    pub fn http_code(&self) -> u16 {
        match self {
            RoutingError::InvalidVersion { .. } => 400,
            RoutingError::NotApiPath { .. }
            | RoutingError::RouteNotFound { .. }
            | RoutingError::MalformedRoute { .. }
            | RoutingError::HandlerUnavailable { .. } => 404,
        }
    }
}

/// 参数绑定错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error(
        "Parameter \"{parameter}\" (position {position}) of {endpoint}::{method}() is required, but it was not passed"
    )]
    MissingParameter {
        endpoint: String,
        method: String,
        parameter: String,
        position: usize,
    },

    #[error(
        "Parameter \"{parameter}\" of {endpoint}::{method}() is empty and an empty \"{type_name}\" can not be created"
    )]
    CannotSynthesizeEmptyValue {
        endpoint: String,
        method: String,
        parameter: String,
        type_name: String,
    },

    #[error("Parameter \"data\" of {endpoint}::{method}() must be a map of request parameters")]
    InvalidDataParameter { endpoint: String, method: String },

    #[error("Parameter \"{parameter}\" has an invalid value: {message}")]
    InvalidArgumentType { parameter: String, message: String },

    #[error("Request parameter key can not be empty")]
    EmptyParameterKey,

    /// 绑定结果与方法签名数量不一致，只在手工构造的动作描述中出现
    #[error("Argument \"{parameter}\" was not bound")]
    MissingArgument { parameter: String },
}

impl BindingError {
    /// 请求本身不合法时为 400，其余按内部错误处理
    pub fn http_code(&self) -> u16 {
        match self {
            BindingError::EmptyParameterKey => 400,
            _ => 500,
        }
    }
}

/// 权限检查结果
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PermissionError {
    /// 未登录访问私有端点，或无法检查权限
    #[error("{0}")]
    Unauthorized(String),

    /// 已登录但缺少角色
    #[error("{0}")]
    Forbidden(String),
}

impl PermissionError {
    pub fn http_code(&self) -> u16 {
        match self {
            PermissionError::Unauthorized(_) => 401,
            PermissionError::Forbidden(_) => 403,
        }
    }
}

/// 序列化错误，出现即代表端点返回了不合约定的数据
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SerializationError {
    #[error("Structure is too deep, the limit of {budget} levels was reached")]
    TooDeep { budget: usize },

    #[error("Attention: Recursion has been stopped! Object \"{type_name}\" is referenced more than once")]
    CyclicStructure { type_name: String },

    #[error("Convention error: {kind} must be stored under the key \"{expected}\", but \"{found}\" given")]
    ConventionViolation {
        kind: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("Value can not be serialized: {reason}")]
    Unserializable { reason: String },
}

/// 端点可以抛出的、面向最终用户的错误
///
/// 消息原样返回给客户端，状态码取约定中的默认错误码。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct UserError(pub String);

impl UserError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// 携带 HTTP 风格状态码的失败
///
/// 码值落在 `[100, 600)` 之外时按 500 处理。
#[derive(Error, Debug)]
#[error("{source}")]
pub struct CodedError {
    pub code: i64,
    #[source]
    pub source: anyhow::Error,
}

impl CodedError {
    pub fn new(code: i64, source: impl Into<anyhow::Error>) -> Self {
        Self {
            code,
            source: source.into(),
        }
    }
}

/// 请求处理过程中的统一错误
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error("Method for action \"{action}\" and HTTP method \"{verb}\" is not implemented.")]
    NotImplemented { action: String, verb: String },

    #[error("Api endpoint \"{route}\" must return some output. None returned.")]
    EmptyResponse { route: String },

    #[error("{0}")]
    Handler(anyhow::Error),
}

impl ApiError {
    /// 错误对应的 HTTP 状态码，处理器失败按错误链中的提示决定
    pub fn http_code(&self) -> u16 {
        match self {
            ApiError::Routing(e) => e.http_code(),
            ApiError::Binding(e) => e.http_code(),
            ApiError::Serialization(_) => 500,
            ApiError::NotImplemented { .. } | ApiError::EmptyResponse { .. } => 404,
            ApiError::Handler(e) => e
                .chain()
                .find_map(|cause| cause.downcast_ref::<CodedError>())
                .map(|coded| sanitize_code(coded.code))
                .unwrap_or(500),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Routing(_) => "routing",
            ApiError::Binding(_) => "binding",
            ApiError::Serialization(_) => "serialization",
            ApiError::NotImplemented { .. } | ApiError::EmptyResponse { .. } => "dispatch",
            ApiError::Handler(_) => "handler",
        }
    }

    /// 消息是否可以直接展示给客户端（无需调试模式）
    pub fn is_client_facing(&self) -> bool {
        matches!(
            self,
            ApiError::Routing(_) | ApiError::NotImplemented { .. } | ApiError::EmptyResponse { .. }
        )
    }

    /// 错误链中携带的用户错误
    pub fn user_error(&self) -> Option<&UserError> {
        match self {
            ApiError::Handler(e) => e.chain().find_map(|cause| cause.downcast_ref::<UserError>()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<BindingError>() {
            Ok(binding) => ApiError::Binding(binding),
            Err(error) => ApiError::Handler(error),
        }
    }
}

/// `[100, 600)` 之内原样返回，否则 500
pub fn sanitize_code(code: i64) -> u16 {
    if (100..600).contains(&code) {
        code as u16
    } else {
        500
    }
}

/// 动作方法的提前结束
///
/// `Respond` 是正常的短路（`send_*` 系列），`Fail` 是真正的失败。
pub enum Halt {
    Respond(Response),
    Fail(anyhow::Error),
}

impl Halt {
    pub fn fail(error: impl Into<anyhow::Error>) -> Self {
        Halt::Fail(error.into())
    }

    pub fn user(message: impl Into<String>) -> Self {
        Halt::Fail(UserError::new(message).into())
    }

    pub fn coded(code: i64, error: impl Into<anyhow::Error>) -> Self {
        Halt::Fail(CodedError::new(code, error).into())
    }
}

impl<E> From<E> for Halt
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Halt::Fail(anyhow::Error::new(error))
    }
}

impl fmt::Debug for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Halt::Respond(response) => f.debug_tuple("Respond").field(response).finish(),
            Halt::Fail(error) => f.debug_tuple("Fail").field(error).finish(),
        }
    }
}

/// 动作方法的返回类型
pub type ActionResult<T> = Result<T, Halt>;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_routing_codes() {
        assert_eq!(
            RoutingError::InvalidVersion {
                version: "x".into()
            }
            .http_code(),
            400
        );
        assert_eq!(
            ApiError::from(RoutingError::MalformedRoute { route: "a/b/c".into() }).http_code(),
            404
        );
    }

    #[test]
    fn test_coded_error_is_sanitized() {
        let error = ApiError::Handler(CodedError::new(418, anyhow::anyhow!("teapot")).into());
        assert_eq!(error.http_code(), 418);

        let error = ApiError::Handler(CodedError::new(0, anyhow::anyhow!("zero")).into());
        assert_eq!(error.http_code(), 500);

        let error = ApiError::Handler(CodedError::new(600, anyhow::anyhow!("too big")).into());
        assert_eq!(error.http_code(), 500);
    }

    #[test]
    fn test_user_error_found_through_context() {
        let result: anyhow::Result<()> = Err(UserError::new("Name is taken").into());
        let error = ApiError::Handler(result.context("saving user").unwrap_err());
        assert_eq!(error.user_error().unwrap().0, "Name is taken");
    }

    #[test]
    fn test_binding_error_is_recovered_from_anyhow() {
        let error: anyhow::Error = BindingError::EmptyParameterKey.into();
        assert!(matches!(
            ApiError::from(error),
            ApiError::Binding(BindingError::EmptyParameterKey)
        ));
    }

    #[test]
    fn test_halt_from_std_error() {
        let parse = "abc".parse::<i32>().unwrap_err();
        assert!(matches!(Halt::from(parse), Halt::Fail(_)));
    }
}
