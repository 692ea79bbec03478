//! 端点模型
//!
//! 端点是一个普通结构体，通过 `#[derive(Endpoint)]` 声明元数据（是否公开、所需角色），
//! 再用 `#[actions]` 标注其 `impl` 块，把其中的方法登记为动作。宏在编译期生成
//! [`EndpointDescriptor`]，运行期的路由、方法解析、参数绑定与权限检查都只读取描述，
//! 不需要任何反射。
//!
//! ```ignore
//! #[derive(Endpoint)]
//! #[endpoint(role = "admin")]
//! pub struct UserEndpoint {
//!     repository: Arc<UserRepository>,
//! }
//!
//! #[actions]
//! impl UserEndpoint {
//!     pub fn action_detail(&self, id: i64) -> ActionResult<Value> { ... }
//!
//!     pub fn post_create_user(
//!         &self,
//!         ctx: &mut ActionContext,
//!         username: String,
//!         password: String,
//!     ) -> ActionResult<()> { ... }
//! }
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use waypoint_core::utils::naming;
use waypoint_core::{Container, SharedComponent};

use crate::context::ActionContext;
use crate::error::{ActionResult, Halt};
use crate::response::{JsonResponse, RedirectResponse, Response, StatusResponse};
use crate::value::Value;

/// 端点实例
pub trait Endpoint: Send + Sync + 'static {
    /// 每次请求结束后调用（包括提前返回的情况），用于持久化状态
    fn save_state(&self) {}

    fn as_any(&self) -> &dyn Any;
}

/// 由 `#[derive(Endpoint)]` 生成的类型级元数据
pub trait EndpointMeta {
    /// 不带模块路径的类型名，例如 `UserEndpoint`
    fn type_name() -> &'static str;

    /// 未登录也可访问
    fn is_public() -> bool {
        false
    }

    /// 端点级角色，命中任意一个即放行
    fn roles() -> &'static [&'static str] {
        &[]
    }
}

/// 由 `#[actions]` 生成的动作表
pub trait EndpointActions {
    fn actions() -> Vec<ActionDescriptor>;
}

/// 动作的调用入口：端点实例、请求上下文、已绑定的参数
pub type ActionFn =
    fn(&dyn Endpoint, &mut ActionContext, Vec<serde_json::Value>) -> ActionResult<Reply>;

/// 参数在绑定时的形态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    Bool,
    Int,
    Float,
    String,
    List,
    Map,
    /// 任意 JSON（`serde_json::Value`）
    Any,
    /// 其他可反序列化的类型
    Object(&'static str),
}

impl ParamKind {
    pub fn type_name(&self) -> &str {
        match self {
            ParamKind::Bool => "bool",
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::String => "string",
            ParamKind::List => "list",
            ParamKind::Map => "map",
            ParamKind::Any => "any",
            ParamKind::Object(name) => name,
        }
    }
}

/// 动作参数
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    /// 请求中的参数名（Rust 参数名的 camelCase 形式）
    pub name: String,
    pub kind: ParamKind,
    pub nullable: bool,
    pub default: Option<serde_json::Value>,
}

impl ParamSpec {
    pub fn new(rust_name: &str, kind: ParamKind) -> Self {
        Self {
            name: naming::snake_to_camel_case(rust_name),
            kind,
            nullable: false,
            default: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    /// 名为 `data` 的参数接收整个参数包
    pub fn is_data(&self) -> bool {
        self.name == "data"
    }
}

/// 一个动作方法
#[derive(Clone)]
pub struct ActionDescriptor {
    method: String,
    rust_name: &'static str,
    params: Vec<ParamSpec>,
    roles: Vec<String>,
    invoke: ActionFn,
}

impl ActionDescriptor {
    /// `rust_name` 为 snake_case 方法名，动作方法名取其 camelCase 形式
    pub fn new(rust_name: &'static str, invoke: ActionFn) -> Self {
        Self {
            method: naming::snake_to_camel_case(rust_name),
            rust_name,
            params: Vec::new(),
            roles: Vec::new(),
            invoke,
        }
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.roles = roles.into_iter().map(|r| normalize_role(r.as_ref())).collect();
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn rust_name(&self) -> &'static str {
        self.rust_name
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn required_roles(&self) -> &[String] {
        &self.roles
    }

    pub fn invoke(
        &self,
        endpoint: &dyn Endpoint,
        ctx: &mut ActionContext,
        args: Vec<serde_json::Value>,
    ) -> ActionResult<Reply> {
        (self.invoke)(endpoint, ctx, args)
    }
}

impl fmt::Debug for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("method", &self.method)
            .field("params", &self.params)
            .field("roles", &self.roles)
            .finish()
    }
}

/// 角色名统一为小写并去掉首尾的 `-`
pub fn normalize_role(role: &str) -> String {
    role.trim().trim_matches('-').to_lowercase()
}

/// 端点描述：路由名、权限元数据与全部动作
#[derive(Clone)]
pub struct EndpointDescriptor {
    type_id: TypeId,
    type_name: &'static str,
    route: String,
    public: bool,
    roles: Vec<String>,
    actions: Vec<ActionDescriptor>,
    upcast: fn(SharedComponent) -> Option<Arc<dyn Endpoint>>,
}

impl EndpointDescriptor {
    pub fn of<T>() -> Self
    where
        T: Endpoint + EndpointMeta + EndpointActions,
    {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: T::type_name(),
            route: naming::route_name_for(T::type_name()),
            public: T::is_public(),
            roles: T::roles().iter().map(|r| normalize_role(r)).collect(),
            actions: T::actions(),
            upcast: upcast::<T>,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    pub fn actions(&self) -> &[ActionDescriptor] {
        &self.actions
    }

    /// 按动作方法名查找
    pub fn action(&self, method: &str) -> Option<&ActionDescriptor> {
        self.actions.iter().find(|a| a.method == method)
    }

    /// 把容器中的类型擦除实例还原为端点
    pub fn upcast(&self, component: SharedComponent) -> Option<Arc<dyn Endpoint>> {
        (self.upcast)(component)
    }
}

impl fmt::Debug for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointDescriptor")
            .field("type_name", &self.type_name)
            .field("route", &self.route)
            .field("public", &self.public)
            .field("roles", &self.roles)
            .field("actions", &self.actions)
            .finish()
    }
}

fn upcast<T: Endpoint>(component: SharedComponent) -> Option<Arc<dyn Endpoint>> {
    component
        .downcast::<T>()
        .ok()
        .map(|endpoint| endpoint as Arc<dyn Endpoint>)
}

/// 在动作入口中取回具体的端点类型
pub fn downcast<T: Endpoint>(endpoint: &dyn Endpoint) -> ActionResult<&T> {
    endpoint.as_any().downcast_ref::<T>().ok_or_else(|| {
        Halt::Fail(anyhow::anyhow!(
            "Endpoint instance is not of type {}",
            std::any::type_name::<T>()
        ))
    })
}

/// 动作方法的正常产出
#[derive(Debug)]
pub enum Reply {
    /// 没有输出
    Empty,
    Response(Response),
    /// 普通数据，按 200 输出
    Value(Value),
}

/// 动作方法返回值到 [`Reply`] 的转换
pub trait IntoReply {
    fn into_reply(self) -> ActionResult<Reply>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> ActionResult<Reply> {
        Ok(self)
    }
}

impl IntoReply for () {
    fn into_reply(self) -> ActionResult<Reply> {
        Ok(Reply::Empty)
    }
}

impl IntoReply for Value {
    fn into_reply(self) -> ActionResult<Reply> {
        Ok(Reply::Value(self))
    }
}

impl IntoReply for serde_json::Value {
    fn into_reply(self) -> ActionResult<Reply> {
        Ok(Reply::Value(Value::from(self)))
    }
}

impl IntoReply for Response {
    fn into_reply(self) -> ActionResult<Reply> {
        Ok(Reply::Response(self))
    }
}

impl IntoReply for StatusResponse {
    fn into_reply(self) -> ActionResult<Reply> {
        Ok(Reply::Response(self.into()))
    }
}

impl IntoReply for JsonResponse {
    fn into_reply(self) -> ActionResult<Reply> {
        Ok(Reply::Response(self.into()))
    }
}

impl IntoReply for RedirectResponse {
    fn into_reply(self) -> ActionResult<Reply> {
        Ok(Reply::Response(self.into()))
    }
}

impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> ActionResult<Reply> {
        match self {
            Some(inner) => inner.into_reply(),
            None => Ok(Reply::Empty),
        }
    }
}

/// 把任意 `Serialize` 类型作为返回值
#[derive(Debug, Clone)]
pub struct Dto<T>(pub T);

impl<T: Serialize> IntoReply for Dto<T> {
    fn into_reply(self) -> ActionResult<Reply> {
        Ok(Reply::Value(Value::from_serialize(&self.0)?))
    }
}

/// 按描述提供端点实例
pub trait EndpointResolver: Send + Sync {
    fn can_resolve(&self, descriptor: &EndpointDescriptor) -> bool;

    fn resolve(&self, descriptor: &EndpointDescriptor) -> anyhow::Result<Arc<dyn Endpoint>>;
}

impl EndpointResolver for Container {
    fn can_resolve(&self, descriptor: &EndpointDescriptor) -> bool {
        self.contains(descriptor.type_id())
    }

    fn resolve(&self, descriptor: &EndpointDescriptor) -> anyhow::Result<Arc<dyn Endpoint>> {
        let component = self.get_any(descriptor.type_id(), descriptor.type_name())?;
        descriptor.upcast(component).ok_or_else(|| {
            anyhow::anyhow!(
                "Component registered for \"{}\" is not an endpoint",
                descriptor.type_name()
            )
        })
    }
}

/// 编译期登记的端点，由 `#[actions]` 提交
pub struct EndpointRegistration {
    pub describe: fn() -> EndpointDescriptor,
}

inventory::collect!(EndpointRegistration);

/// 所有编译期登记的端点描述
pub fn registered_endpoints() -> impl Iterator<Item = EndpointDescriptor> {
    inventory::iter::<EndpointRegistration>()
        .map(|registration| (registration.describe)())
}
