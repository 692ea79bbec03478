//! Waypoint API Macros
//!
//! 编译期生成端点描述，运行期不需要反射

mod actions;
mod endpoint;
mod utils;

use proc_macro::TokenStream;
use proc_macro_error::proc_macro_error;

/// Endpoint 宏
///
/// 为结构体实现 `Endpoint` 与 `EndpointMeta`。路由名由类型名派生：
/// 去掉 `Endpoint` 后缀，PascalCase 转 kebab-case。
///
/// # 示例
///
/// ```ignore
/// #[derive(Endpoint)]
/// #[endpoint(role = "admin", on_save = "flush")]
/// pub struct ArticleEndpoint {
///     repository: Arc<ArticleRepository>,
/// }
/// ```
///
/// 支持的参数：
/// - `public` - 未登录也可访问
/// - `role = "..."` - 端点级角色，可以出现多次
/// - `on_save = "method"` - 每次请求结束后调用的 `fn(&self)` 方法
#[proc_macro_derive(Endpoint, attributes(endpoint))]
#[proc_macro_error]
pub fn derive_endpoint(input: TokenStream) -> TokenStream {
    endpoint::derive_endpoint_impl(input)
}

/// 处理端点实现块，把其中的 `pub fn(&self, ...)` 方法登记为动作
///
/// # 示例
///
/// ```ignore
/// #[actions]
/// impl ArticleEndpoint {
///     pub fn action_default(&self, #[default(1)] page: i64) -> ActionResult<Value> { ... }
///
///     #[role("editor")]
///     pub fn post_publish(&self, ctx: &mut ActionContext, id: i64) -> ActionResult<()> { ... }
/// }
/// ```
///
/// - 方法名为 snake_case，动作方法名取其 camelCase（`post_publish` → `postPublish`）
/// - `&mut ActionContext` 参数可以出现在任意位置，不参与绑定
/// - `Option<T>` 参数缺省时为 `None`
#[proc_macro_attribute]
#[proc_macro_error]
pub fn actions(attr: TokenStream, item: TokenStream) -> TokenStream {
    actions::actions_impl(attr, item)
}
