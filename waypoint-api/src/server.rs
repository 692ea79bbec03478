//! HTTP 适配层
//!
//! 基于 Axum：所有请求进入同一个 fallback 处理器，转换成 [`ApiRequest`] 交给分发器，
//! 再把 [`DispatchOutcome`] 写回 HTTP 响应。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use waypoint_core::{ConfigError, ConfigResult, Environment};

use crate::dispatcher::{ApiRequest, DispatchOutcome, Dispatcher};
use crate::middleware::{request_id, request_logging};
use crate::params::{RequestInfo, RequestParams};
use crate::router::DEFAULT_PREFIX;

/// 预检结果的缓存时间
const CORS_MAX_AGE: Duration = Duration::from_secs(86_400);

/// API 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiProperties {
    /// 监听地址
    pub host: String,

    /// 监听端口
    pub port: u16,

    /// 是否启用 CORS
    pub enable_cors: bool,

    /// 是否启用请求日志
    pub enable_request_logging: bool,

    /// 错误响应中是否带上失败原因
    pub debug: bool,

    /// API 路径前缀
    pub prefix: String,
}

impl Default for ApiProperties {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: false,
            enable_request_logging: true,
            debug: false,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl ApiProperties {
    /// 从 Environment 加载配置
    pub fn from_environment(env: &Environment) -> ConfigResult<Self> {
        let defaults = Self::default();
        let port = match env.try_get_i64("server.port")? {
            Some(port) => u16::try_from(port)
                .map_err(|_| ConfigError::invalid("server.port", format!("{} is not a valid port", port)))?,
            None => defaults.port,
        };

        Ok(Self {
            host: env.get_string("server.host").unwrap_or(defaults.host),
            port,
            enable_cors: env.get_bool_or("server.enable-cors", defaults.enable_cors),
            enable_request_logging: env
                .get_bool_or("server.enable-request-logging", defaults.enable_request_logging),
            debug: env.get_bool_or("api.debug", defaults.debug),
            prefix: env.get_string("api.prefix").unwrap_or(defaults.prefix),
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl IntoResponse for DispatchOutcome {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (
            status,
            [(header::CONTENT_TYPE, self.content_type)],
            self.body.to_string(),
        )
            .into_response();

        if let Some(location) = self.location.and_then(|l| HeaderValue::from_str(&l).ok()) {
            response.headers_mut().insert(header::LOCATION, location);
        }
        response
    }
}

/// 构建 API 路由
pub fn api_router(dispatcher: Arc<Dispatcher>, properties: &ApiProperties) -> Router {
    let mut router = Router::new()
        .fallback(dispatch_request)
        .with_state(dispatcher)
        .layer(axum::middleware::from_fn(request_id));

    if properties.enable_request_logging {
        router = router.layer(axum::middleware::from_fn(request_logging));
    }
    if properties.enable_cors {
        router = router.layer(cors_layer());
    }
    router
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_credentials(true)
        .max_age(CORS_MAX_AGE)
}

async fn dispatch_request(
    State(dispatcher): State<Arc<Dispatcher>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut info = RequestInfo::new();
    info.headers = headers;
    if let Some(ConnectInfo(addr)) = connect_info {
        info = info.with_remote_addr(addr.ip());
    }

    let mut request = ApiRequest::new(method.as_str(), uri.path())
        .with_query(uri.query().map(RequestParams::from_query).unwrap_or_default())
        .with_info(info);
    if !body.is_empty() {
        request = request.with_body(RequestParams::from_body(content_type.as_deref(), &body));
    }

    match dispatcher.try_dispatch(request) {
        Some(outcome) => outcome.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// API 服务器
pub struct ApiServer {
    properties: ApiProperties,
    dispatcher: Arc<Dispatcher>,
}

impl ApiServer {
    pub fn new(dispatcher: Arc<Dispatcher>, properties: ApiProperties) -> Self {
        Self {
            properties,
            dispatcher,
        }
    }

    pub fn router(&self) -> Router {
        api_router(Arc::clone(&self.dispatcher), &self.properties)
    }

    /// 启动服务器，直到进程退出
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.properties.address();
        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();

        tracing::info!("🚀 Starting Waypoint API server on {}", addr);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

        tracing::info!(
            "✅ Server listening on http://{}/{}/v1/",
            addr,
            self.dispatcher.router().prefix()
        );

        axum::serve(listener, app)
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        Ok(())
    }
}
