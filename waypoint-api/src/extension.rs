//! 匹配扩展
//!
//! 在路由和方法解析成功之后、动作方法调用前后执行的钩子，类似 HandlerInterceptor。
//! 扩展按注册顺序执行，`before_process` 第一个返回响应的扩展会让分发器直接采用该响应，
//! 动作方法不再被调用。

use std::sync::Arc;

use crate::endpoint::{ActionDescriptor, Endpoint, EndpointDescriptor};
use crate::params::{RequestInfo, RequestParams};
use crate::permission::Principal;
use crate::response::Response;

/// 扩展看到的匹配结果
pub struct MatchContext<'a> {
    pub endpoint: &'a dyn Endpoint,
    pub descriptor: &'a EndpointDescriptor,
    pub action: &'a ActionDescriptor,
    /// 路径中的动作名（camelCase）
    pub action_name: &'a str,
    pub verb: &'a str,
    pub params: &'a RequestParams,
    pub request: &'a RequestInfo,
    pub principal: Option<&'a Principal>,
}

impl MatchContext<'_> {
    /// `<route>/<action>`，用于路径模式匹配和日志
    pub fn path(&self) -> String {
        format!("{}/{}", self.descriptor.route(), self.action_name)
    }
}

pub trait MatchExtension: Send + Sync {
    fn name(&self) -> &str;

    /// 返回 `Some` 时短路，动作方法不会被调用
    fn before_process(&self, _ctx: &MatchContext<'_>) -> Option<Response> {
        None
    }

    /// 动作方法返回后调用，`response` 为动作的产出
    fn after_process(&self, _ctx: &MatchContext<'_>, _response: Option<&Response>) -> Option<Response> {
        None
    }

    /// 生效的路径模式，匹配 `<route>/<action>`
    fn path_patterns(&self) -> Vec<&str> {
        vec!["**"]
    }

    fn exclude_patterns(&self) -> Vec<&str> {
        vec![]
    }
}

/// 简化的路径匹配器
#[derive(Debug, Clone)]
struct PathMatcher {
    patterns: Vec<String>,
}

impl PathMatcher {
    fn new(patterns: Vec<&str>) -> Self {
        Self {
            patterns: patterns.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|pattern| match_pattern(pattern, path))
    }
}

fn match_pattern(pattern: &str, path: &str) -> bool {
    if pattern == "**" {
        return true;
    }

    if let Some(prefix) = pattern.strip_suffix("/**") {
        return path == prefix || path.starts_with(&format!("{}/", prefix));
    }

    // 单个 `*` 通配一个片段内的任意字符
    if let Some((prefix, suffix)) = pattern.split_once('*') {
        return path.len() >= prefix.len() + suffix.len()
            && path.starts_with(prefix)
            && path.ends_with(suffix)
            && !path[prefix.len()..path.len() - suffix.len()].contains('/');
    }

    pattern == path
}

struct ExtensionWrapper {
    extension: Arc<dyn MatchExtension>,
    include_matcher: PathMatcher,
    exclude_matcher: PathMatcher,
}

impl ExtensionWrapper {
    fn new(extension: Arc<dyn MatchExtension>) -> Self {
        let include_matcher = PathMatcher::new(extension.path_patterns());
        let exclude_matcher = PathMatcher::new(extension.exclude_patterns());
        Self {
            extension,
            include_matcher,
            exclude_matcher,
        }
    }

    fn should_apply(&self, path: &str) -> bool {
        self.include_matcher.matches(path) && !self.exclude_matcher.matches(path)
    }
}

/// 扩展链
#[derive(Default)]
pub struct ExtensionChain {
    extensions: Vec<ExtensionWrapper>,
}

impl ExtensionChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<E: MatchExtension + 'static>(&mut self, extension: E) {
        self.register_shared(Arc::new(extension));
    }

    pub fn register_shared(&mut self, extension: Arc<dyn MatchExtension>) {
        tracing::debug!(extension = extension.name(), "Match extension registered");
        self.extensions.push(ExtensionWrapper::new(extension));
    }

    /// 按注册顺序执行，第一个返回响应的扩展获胜
    pub fn before_process(&self, ctx: &MatchContext<'_>) -> Option<Response> {
        let path = ctx.path();
        for wrapper in self.extensions.iter().filter(|w| w.should_apply(&path)) {
            if let Some(response) = wrapper.extension.before_process(ctx) {
                tracing::debug!(
                    extension = wrapper.extension.name(),
                    path = %path,
                    status = response.http_code(),
                    "Request answered by match extension"
                );
                return Some(response);
            }
        }
        None
    }

    pub fn after_process(&self, ctx: &MatchContext<'_>, response: Option<&Response>) -> Option<Response> {
        let path = ctx.path();
        for wrapper in self.extensions.iter().filter(|w| w.should_apply(&path)) {
            if let Some(replaced) = wrapper.extension.after_process(ctx, response) {
                tracing::debug!(
                    extension = wrapper.extension.name(),
                    path = %path,
                    "Response replaced by match extension"
                );
                return Some(replaced);
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}
