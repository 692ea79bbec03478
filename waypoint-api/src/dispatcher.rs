//! 请求分发器
//!
//! 一次请求的完整流程：
//!
//! ```text
//! 参数合并 → 路由 → 解析端点实例 → 解析动作方法 → 扩展(before)
//!   → 参数绑定 → 调用 → save_state → 扩展(after) → 序列化
//! ```
//!
//! 任意阶段的失败都会收敛为一个 `state: "error"` 的状态响应，
//! 分发器对每个请求恰好产出一个 [`DispatchOutcome`]。

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::{json, Value as Json};
use waypoint_core::Convention;

use crate::binder;
use crate::context::ActionContext;
use crate::endpoint::{EndpointResolver, Reply};
use crate::error::{ApiError, Halt, RoutingError};
use crate::extension::{ExtensionChain, MatchContext, MatchExtension};
use crate::params::{RequestInfo, RequestParams};
use crate::permission::{PermissionExtension, Principal, PrincipalLookup};
use crate::resolver::resolve_method;
use crate::response::{JsonResponse, Response, StatusData, StatusResponse, CONTENT_TYPE_JSON};
use crate::route_table::RouteTable;
use crate::router::Router;
use crate::serializer::{Serializer, DEFAULT_DEPTH_BUDGET};
use crate::value::Value;

pub const METHOD_OVERRIDE_HEADER: &str = "x-http-method-override";

/// 传输层无关的请求
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub path: String,
    pub method: String,
    /// 为空时从路径中的查询串解析
    pub query: Option<RequestParams>,
    pub body: Option<RequestParams>,
    /// 调用方显式传入的参数，优先级最高
    pub overrides: RequestParams,
    /// 调用方已识别的用户，为空时交给 [`PrincipalLookup`]
    pub principal: Option<Principal>,
    pub info: RequestInfo,
}

impl ApiRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            query: None,
            body: None,
            overrides: RequestParams::new(),
            principal: None,
            info: RequestInfo::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new("POST", path)
    }

    pub fn with_query(mut self, query: RequestParams) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_body(mut self, body: RequestParams) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_overrides(mut self, overrides: RequestParams) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn with_info(mut self, info: RequestInfo) -> Self {
        self.info = info;
        self
    }

    /// 生效的 HTTP 方法：大写，`POST` 可被 `X-HTTP-Method-Override` 覆盖
    pub fn verb(&self) -> String {
        let verb = self.method.to_ascii_uppercase();
        if verb != "POST" {
            return verb;
        }
        match self.info.header(METHOD_OVERRIDE_HEADER).map(str::trim) {
            Some(o) if !o.is_empty() && o.bytes().all(|b| b.is_ascii_uppercase()) => o.to_string(),
            _ => verb,
        }
    }
}

/// 分发结果，交给传输层原样写出
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Json,
    /// 重定向目标
    pub location: Option<String>,
}

pub struct Dispatcher {
    router: Router,
    resolver: Arc<dyn EndpointResolver>,
    convention: Arc<Convention>,
    serializer: Serializer,
    extensions: ExtensionChain,
    principal_lookup: Option<Arc<dyn PrincipalLookup>>,
    debug: bool,
}

impl Dispatcher {
    pub fn builder(table: Arc<RouteTable>, resolver: Arc<dyn EndpointResolver>) -> DispatcherBuilder {
        DispatcherBuilder::new(table, resolver)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn convention(&self) -> &Convention {
        &self.convention
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// 路径不在 API 前缀之下时返回 `None`，留给其他路由处理
    pub fn try_dispatch(&self, request: ApiRequest) -> Option<DispatchOutcome> {
        if !self.router.is_api_path(&request.path) {
            return None;
        }
        Some(self.dispatch(request))
    }

    pub fn dispatch(&self, request: ApiRequest) -> DispatchOutcome {
        let verb = request.verb();
        tracing::debug!(verb = %verb, path = %request.path, "Dispatching API request");

        let processed = panic::catch_unwind(AssertUnwindSafe(|| self.process(&verb, request)))
            .unwrap_or_else(|payload| Err(ApiError::Handler(panic_error(payload))));
        let response = match processed {
            Ok(response) => response,
            Err(error) => self.error_response(&error),
        };
        self.finish(response)
    }

    /// 内部调用：没有前缀时补上 `api/v1/`，返回序列化后的响应体
    pub fn get(&self, path: &str, params: RequestParams, method: &str) -> Json {
        let trimmed = path.trim_start_matches('/');
        let path = if trimmed.starts_with(&format!("{}/", self.router.prefix())) {
            trimmed.to_string()
        } else {
            format!("{}/v1/{}", self.router.prefix(), trimmed)
        };
        self.dispatch(ApiRequest::new(method, path).with_overrides(params)).body
    }

    fn process(&self, verb: &str, request: ApiRequest) -> Result<Response, ApiError> {
        let ApiRequest {
            path,
            method,
            query,
            body,
            overrides,
            principal,
            info,
        } = request;

        let query = query.unwrap_or_else(|| {
            path.split_once('?')
                .map(|(_, q)| RequestParams::from_query(q))
                .unwrap_or_default()
        });
        // 按传输层的方法决定是否读取请求体，方法覆盖不影响这一点
        let body = match method.to_ascii_uppercase().as_str() {
            "GET" | "DELETE" => RequestParams::new(),
            _ => body.unwrap_or_default(),
        };
        let params = RequestParams::merge([query, body, overrides]).normalized()?;

        let parsed = self.router.route(&path, &params)?;
        let descriptor = parsed.endpoint.as_ref();

        let unavailable = |reason: String| RoutingError::HandlerUnavailable {
            route: parsed.route.clone(),
            type_name: descriptor.type_name().to_string(),
            reason,
        };
        if !self.resolver.can_resolve(descriptor) {
            return Err(unavailable("no instance is registered".to_string()).into());
        }
        let endpoint = self
            .resolver
            .resolve(descriptor)
            .map_err(|e| unavailable(format!("{:#}", e)))?;

        let action = resolve_method(descriptor, verb, &parsed.action).ok_or_else(|| {
            ApiError::NotImplemented {
                action: parsed.action.clone(),
                verb: verb.to_string(),
            }
        })?;

        let principal = principal.or_else(|| {
            self.principal_lookup
                .as_ref()
                .and_then(|lookup| lookup.current_principal(&info))
        });

        let match_ctx = MatchContext {
            endpoint: endpoint.as_ref(),
            descriptor,
            action,
            action_name: &parsed.action,
            verb,
            params: &params,
            request: &info,
            principal: principal.as_ref(),
        };

        if let Some(response) = self.extensions.before_process(&match_ctx) {
            return Ok(response);
        }

        let args = binder::bind(descriptor, action, &params)?;
        let mut ctx = ActionContext::new(self.convention.clone(), params.clone(), info.clone())
            .with_principal(principal.clone());

        let produced = match action.invoke(endpoint.as_ref(), &mut ctx, args) {
            Ok(Reply::Empty) => None,
            Ok(Reply::Value(value)) => Some(ctx.attach_flash_messages(JsonResponse::new(value).into())),
            Ok(Reply::Response(response)) | Err(Halt::Respond(response)) => {
                Some(ctx.attach_flash_messages(response))
            }
            Err(Halt::Fail(error)) => return Err(error.into()),
        };
        endpoint.save_state();

        let produced = match produced {
            None if verb != "GET" => Some(
                StatusResponse::ok(StatusData::default())
                    .with_code(self.convention.default_ok_code())
                    .with_flash_messages(ctx.flash_messages().to_vec())
                    .into(),
            ),
            other => other,
        };

        if let Some(replaced) = self.extensions.after_process(&match_ctx, produced.as_ref()) {
            return Ok(replaced);
        }

        produced.ok_or_else(|| ApiError::EmptyResponse {
            route: match_ctx.path(),
        })
    }

    fn error_response(&self, error: &ApiError) -> Response {
        if let Some(user_error) = error.user_error() {
            tracing::debug!(message = %user_error, "Endpoint rejected the request");
            return StatusResponse::error(user_error.0.clone())
                .with_code(self.convention.default_error_code())
                .into();
        }

        let code = error.http_code();
        match error {
            ApiError::Serialization(_) => {
                tracing::error!(kind = error.kind(), error = %error, "Endpoint returned data that can not be serialized")
            }
            ApiError::Handler(e) => {
                tracing::error!(kind = error.kind(), status = code, error = %format!("{:#}", e), "Unexpected endpoint failure")
            }
            ApiError::Binding(_) => {
                tracing::error!(kind = error.kind(), status = code, error = %error, "Request parameters can not be bound")
            }
            _ => tracing::debug!(kind = error.kind(), status = code, error = %error, "Request not dispatched"),
        }

        let response = if self.debug {
            StatusResponse::error(self.debug_message(error))
        } else if error.is_client_facing() {
            StatusResponse::error(error.to_string())
        } else {
            StatusResponse::bare_error()
        };
        response.with_code(code).into()
    }

    /// 调试模式下路由失败时附带（脱敏后的）请求参数
    fn debug_message(&self, error: &ApiError) -> String {
        let ApiError::Routing(RoutingError::RouteNotFound { params, .. }) = error else {
            return error.to_string();
        };
        if params.is_empty() {
            return error.to_string();
        }
        let dump = self
            .serializer
            .serialize(&Value::from(params.to_json()))
            .ok()
            .and_then(|redacted| serde_json::to_string_pretty(&redacted).ok())
            .unwrap_or_default();
        format!("{}\nGiven params:\n{}", error, dump)
    }

    fn finish(&self, response: Response) -> DispatchOutcome {
        let status = clamp_status(response.http_code());
        let location = response.location().map(str::to_string);
        let content_type = response.content_type();

        match self.serializer.serialize(&response.into_body()) {
            Ok(body) => DispatchOutcome {
                status,
                content_type,
                body,
                location,
            },
            Err(e) => {
                let fallback = self.error_response(&ApiError::Serialization(e));
                let status = clamp_status(fallback.http_code());
                let body = self
                    .serializer
                    .serialize(&fallback.into_body())
                    .unwrap_or_else(|_| json!({"state": "error", "message": null, "code": status}));
                DispatchOutcome {
                    status,
                    content_type: CONTENT_TYPE_JSON,
                    body,
                    location: None,
                }
            }
        }
    }
}

/// 最终 HTTP 状态码：小于 100 取 100，大于 599 取 500
pub fn clamp_status(code: u16) -> u16 {
    if code < 100 {
        100
    } else if code > 599 {
        tracing::error!(code, "Response carries an out of range HTTP status, 500 is used instead");
        500
    } else {
        code
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> anyhow::Error {
    let message = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic occurred".to_string()
    };
    anyhow::anyhow!("Endpoint panicked: {}", message)
}

pub struct DispatcherBuilder {
    table: Arc<RouteTable>,
    resolver: Arc<dyn EndpointResolver>,
    convention: Arc<Convention>,
    extensions: Vec<Arc<dyn MatchExtension>>,
    principal_lookup: Option<Arc<dyn PrincipalLookup>>,
    default_permission: bool,
    debug: bool,
    prefix: Option<String>,
    depth_budget: usize,
}

impl DispatcherBuilder {
    pub fn new(table: Arc<RouteTable>, resolver: Arc<dyn EndpointResolver>) -> Self {
        Self {
            table,
            resolver,
            convention: Arc::new(Convention::default()),
            extensions: Vec::new(),
            principal_lookup: None,
            default_permission: true,
            debug: false,
            prefix: None,
            depth_budget: DEFAULT_DEPTH_BUDGET,
        }
    }

    pub fn convention(mut self, convention: Arc<Convention>) -> Self {
        self.convention = convention;
        self
    }

    /// 追加扩展，排在默认权限扩展之后
    pub fn extension<E: MatchExtension + 'static>(mut self, extension: E) -> Self {
        self.extensions.push(Arc::new(extension));
        self
    }

    pub fn principal_lookup<L: PrincipalLookup + 'static>(mut self, lookup: L) -> Self {
        self.principal_lookup = Some(Arc::new(lookup));
        self
    }

    /// 不注册默认权限扩展（约定中的 `ignore_default_permission` 则在运行期跳过它）
    pub fn without_default_permission(mut self) -> Self {
        self.default_permission = false;
        self
    }

    /// 在错误响应中输出失败原因
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn depth_budget(mut self, budget: usize) -> Self {
        self.depth_budget = budget;
        self
    }

    pub fn build(self) -> Dispatcher {
        let mut chain = ExtensionChain::new();
        if self.default_permission {
            chain.register(PermissionExtension::new(self.convention.clone()));
        }
        for extension in self.extensions {
            chain.register_shared(extension);
        }

        let mut router = Router::new(self.table);
        if let Some(prefix) = self.prefix {
            router = router.with_prefix(prefix);
        }

        tracing::info!(
            endpoints = router.table().len(),
            extensions = chain.len(),
            debug = self.debug,
            "API dispatcher ready"
        );

        Dispatcher {
            router,
            resolver: self.resolver,
            serializer: Serializer::new(self.convention.clone()).with_depth_budget(self.depth_budget),
            convention: self.convention,
            extensions: chain,
            principal_lookup: self.principal_lookup,
            debug: self.debug,
        }
    }
}
