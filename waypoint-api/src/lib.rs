//! # Waypoint API
//!
//! 约定驱动的 REST 分发器，基于 Axum 提供 HTTP 入口
//!
//! ## 核心特性
//!
//! - **约定路由** - `api/v<version>/<endpoint>[/<action>]` 直接映射到端点方法
//! - **参数绑定** - 查询串、请求体按方法签名绑定，带类型转换与默认值
//! - **权限检查** - 端点与动作上的公开标记、角色声明
//! - **安全序列化** - 敏感字段脱敏、循环引用检测、深度限制
//! - **编译期注册** - 宏生成端点描述，运行期没有反射

extern crate self as waypoint_api;

pub mod binder;
pub mod context;
pub mod dispatcher;
pub mod endpoint;
pub mod endpoints;
pub mod error;
pub mod extension;
pub mod middleware;
pub mod params;
pub mod permission;
pub mod resolver;
pub mod response;
pub mod route_table;
pub mod router;
pub mod serializer;
pub mod server;
pub mod value;

pub use waypoint_api_macros::{actions, Endpoint};

pub use context::ActionContext;
pub use dispatcher::{ApiRequest, DispatchOutcome, Dispatcher, DispatcherBuilder};
pub use endpoint::{
    Dto, Endpoint, EndpointActions, EndpointDescriptor, EndpointMeta, EndpointResolver, IntoReply,
    Reply,
};
pub use error::{ActionResult, ApiError, CodedError, Halt, UserError};
pub use params::{RequestInfo, RequestParams};
pub use permission::{Principal, PrincipalLookup};
pub use response::{
    FlashKind, JsonResponse, RedirectResponse, Response, StatusData, StatusResponse,
};
pub use route_table::RouteTable;
pub use server::{api_router, ApiProperties, ApiServer};
pub use value::{EnumValue, Item, ItemsList, Paginator, Record, StatusCount, Value};

// 宏生成的代码通过这里引用
#[doc(hidden)]
pub use inventory;
pub use serde_json;

pub mod prelude {
    //! 预导入模块

    pub use crate::context::{format_key_value, format_select_options, ActionContext};
    pub use crate::dispatcher::{ApiRequest, Dispatcher};
    pub use crate::endpoint::{Dto, EndpointResolver};
    pub use crate::error::{ActionResult, CodedError, Halt, UserError};
    pub use crate::extension::{MatchContext, MatchExtension};
    pub use crate::params::{RequestInfo, RequestParams};
    pub use crate::permission::{Principal, PrincipalLookup};
    pub use crate::response::{
        FlashKind, JsonResponse, RedirectResponse, Response, StatusData, StatusResponse,
    };
    pub use crate::route_table::RouteTable;
    pub use crate::server::{ApiProperties, ApiServer};
    pub use crate::value::{EnumValue, Item, ItemsList, Paginator, Record, StatusCount, Value};
    pub use crate::{actions, Endpoint};

    pub use waypoint_core::prelude::*;
}
