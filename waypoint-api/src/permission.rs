//! 默认权限检查
//!
//! 按端点和动作上的元数据决定是否放行：
//!
//! | 端点公开 | 动作角色 | 已登录 | 命中角色 | 结果 |
//! |---|---|---|---|---|
//! | 否 | - | 否 | - | 401 |
//! | - | - | 是 | 命中端点角色 | 放行 |
//! | - | 有 | - | 命中 | 放行 |
//! | - | 有 | - | 未命中 | 403 |
//! | 否 | 无 | 是 | - | 放行 |
//! | 是 | 无 | - | - | 放行 |

use std::collections::BTreeSet;
use std::sync::Arc;

use waypoint_core::Convention;

use crate::endpoint::normalize_role;
use crate::error::PermissionError;
use crate::extension::{MatchContext, MatchExtension};
use crate::params::RequestInfo;
use crate::response::{Response, StatusResponse};

pub const UNAUTHORIZED_MESSAGE: &str =
    "This API endpoint is private. You must be logged in to use.";
pub const FORBIDDEN_MESSAGE: &str = "You do not have permission to perform this action.";

/// 当前登录用户
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    id: String,
    roles: BTreeSet<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: BTreeSet::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.roles
            .extend(roles.into_iter().map(|r| normalize_role(r.as_ref())));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(String::as_str)
    }

    pub fn is_in_role(&self, role: &str) -> bool {
        self.roles.contains(&normalize_role(role))
    }

    pub fn is_in_any_role<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        roles.iter().any(|r| self.is_in_role(r.as_ref()))
    }
}

/// 从请求中识别当前用户
pub trait PrincipalLookup: Send + Sync {
    fn current_principal(&self, request: &RequestInfo) -> Option<Principal>;
}

impl<F> PrincipalLookup for F
where
    F: Fn(&RequestInfo) -> Option<Principal> + Send + Sync,
{
    fn current_principal(&self, request: &RequestInfo) -> Option<Principal> {
        self(request)
    }
}

/// 默认的权限扩展
pub struct PermissionExtension {
    convention: Arc<Convention>,
}

impl PermissionExtension {
    pub fn new(convention: Arc<Convention>) -> Self {
        Self { convention }
    }

    /// 按上面的决策表检查，`Ok(false)` 表示 403
    pub fn check(&self, ctx: &MatchContext<'_>) -> Result<bool, PermissionError> {
        let descriptor = ctx.descriptor;
        let principal = ctx.principal;

        if !descriptor.is_public() && principal.is_none() {
            return Err(PermissionError::Unauthorized(UNAUTHORIZED_MESSAGE.to_string()));
        }

        if let Some(principal) = principal {
            if principal.is_in_any_role(descriptor.roles()) {
                return Ok(true);
            }
        }

        let action = descriptor.action(ctx.action.method()).ok_or_else(|| {
            PermissionError::Unauthorized(format!(
                "Method \"{}\" can not be checked on \"{}\"",
                ctx.action.method(),
                descriptor.type_name()
            ))
        })?;

        let required = action.required_roles();
        if !required.is_empty() {
            return Ok(principal.is_some_and(|p| p.is_in_any_role(required)));
        }

        // 到这里要么是公开端点，要么是已登录用户访问私有端点
        Ok(true)
    }
}

impl MatchExtension for PermissionExtension {
    fn name(&self) -> &str {
        "permission"
    }

    fn before_process(&self, ctx: &MatchContext<'_>) -> Option<Response> {
        if self.convention.ignore_default_permission() {
            return None;
        }

        let denied = match self.check(ctx) {
            Ok(true) => return None,
            Ok(false) => PermissionError::Forbidden(FORBIDDEN_MESSAGE.to_string()),
            Err(e) => e,
        };

        tracing::debug!(
            endpoint = ctx.descriptor.type_name(),
            method = ctx.action.method(),
            status = denied.http_code(),
            "Permission denied"
        );
        Some(StatusResponse::error(denied.to_string()).with_code(denied.http_code()).into())
    }
}
