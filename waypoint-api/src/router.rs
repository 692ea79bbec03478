//! 路由解析
//!
//! `api/v<version>/<route>[/<action>]` → 端点描述 + 动作名。

use std::sync::{Arc, OnceLock};

use regex::Regex;
use waypoint_core::utils::naming::kebab_to_camel_case;

use crate::endpoint::EndpointDescriptor;
use crate::error::RoutingError;
use crate::params::RequestParams;
use crate::route_table::RouteTable;

pub const DEFAULT_PREFIX: &str = "api";
pub const DEFAULT_ACTION: &str = "default";

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{1,3}(\.\d{1,3})?$").expect("version pattern is valid"))
}

/// 一次路由解析的结果
#[derive(Debug, Clone)]
pub struct ParsedRoute {
    pub endpoint: Arc<EndpointDescriptor>,
    /// camelCase 动作名
    pub action: String,
    /// 已校验，目前不参与分发
    pub version: String,
    pub route: String,
}

#[derive(Debug, Clone)]
pub struct Router {
    table: Arc<RouteTable>,
    prefix: String,
}

impl Router {
    pub fn new(table: Arc<RouteTable>) -> Self {
        Self {
            table,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim_matches('/').to_string();
        self
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 路径是否落在 API 前缀之下
    pub fn is_api_path(&self, path: &str) -> bool {
        self.strip_prefix(path).is_some()
    }

    fn strip_prefix<'p>(&self, path: &'p str) -> Option<&'p str> {
        let path = strip_query(path).trim_start_matches('/');
        let rest = path.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() {
            Some(rest)
        } else {
            rest.strip_prefix('/')
        }
    }

    /// 解析路径，`params` 只用于错误信息
    pub fn route(&self, path: &str, params: &RequestParams) -> Result<ParsedRoute, RoutingError> {
        let rest = self.strip_prefix(path).ok_or_else(|| RoutingError::NotApiPath {
            path: path.to_string(),
        })?;

        let (version_segment, rest) = rest.split_once('/').unwrap_or((rest, ""));
        let version = version_segment
            .strip_prefix('v')
            .filter(|v| version_pattern().is_match(v))
            .ok_or_else(|| RoutingError::InvalidVersion {
                version: version_segment.to_string(),
            })?;

        let rest = rest.trim_matches('/');
        let (route, action) = match rest.split_once('/') {
            None => (rest, DEFAULT_ACTION.to_string()),
            Some((route, action)) if !action.contains('/') && !action.is_empty() => {
                (route, kebab_to_camel_case(action))
            }
            Some(_) => {
                return Err(RoutingError::MalformedRoute {
                    route: rest.to_string(),
                })
            }
        };

        let endpoint = self
            .table
            .get(route)
            .cloned()
            .filter(|_| !route.is_empty())
            .ok_or_else(|| RoutingError::RouteNotFound {
                route: route.to_string(),
                params: params.clone(),
            })?;

        tracing::trace!(route, action = %action, version, "Route resolved");

        Ok(ParsedRoute {
            endpoint,
            action,
            version: version.to_string(),
            route: route.to_string(),
        })
    }
}

fn strip_query(path: &str) -> &str {
    path.split_once('?').map_or(path, |(path, _)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ActionContext;
    use crate::endpoint::{ActionDescriptor, Endpoint, EndpointActions, EndpointMeta, Reply};
    use crate::error::ActionResult;
    use std::any::Any;

    struct ProductVariantEndpoint;

    impl Endpoint for ProductVariantEndpoint {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    impl EndpointMeta for ProductVariantEndpoint {
        fn type_name() -> &'static str {
            "ProductVariantEndpoint"
        }
    }

    impl EndpointActions for ProductVariantEndpoint {
        fn actions() -> Vec<ActionDescriptor> {
            fn noop(_: &dyn Endpoint, _: &mut ActionContext, _: Vec<serde_json::Value>) -> ActionResult<Reply> {
                Ok(Reply::Empty)
            }
            vec![ActionDescriptor::new("action_default", noop)]
        }
    }

    fn router() -> Router {
        let table = RouteTable::builder()
            .endpoint::<ProductVariantEndpoint>()
            .build()
            .unwrap();
        Router::new(Arc::new(table))
    }

    fn route(path: &str) -> Result<ParsedRoute, RoutingError> {
        router().route(path, &RequestParams::new())
    }

    #[test]
    fn test_default_action() {
        let parsed = route("api/v1/product-variant").unwrap();
        assert_eq!(parsed.endpoint.type_name(), "ProductVariantEndpoint");
        assert_eq!(parsed.action, "default");
        assert_eq!(parsed.version, "1");
    }

    #[test]
    fn test_action_is_camel_cased() {
        let parsed = route("/api/v2.10/product-variant/set-main-image/?x=1").unwrap();
        assert_eq!(parsed.action, "setMainImage");
        assert_eq!(parsed.version, "2.10");
        assert_eq!(parsed.route, "product-variant");
    }

    #[test]
    fn test_invalid_version() {
        for path in ["api/vX/product-variant", "api/v1234/product-variant", "api/1/product-variant"] {
            assert!(
                matches!(route(path), Err(RoutingError::InvalidVersion { .. })),
                "{}",
                path
            );
        }
    }

    #[test]
    fn test_route_not_found_keeps_params_out_of_message() {
        let given = RequestParams::new().with("id", 5).with("password", "plaintext123");
        let err = router().route("api/v1/does-not-exist", &given).unwrap_err();
        let RoutingError::RouteNotFound { route, params } = &err else {
            panic!("unexpected error {:?}", err);
        };
        assert_eq!(route, "does-not-exist");
        assert_eq!(params, &given);

        let message = err.to_string();
        assert!(message.contains("does-not-exist"));
        assert!(!message.contains("plaintext123"), "{}", message);

        assert!(matches!(route_err("api/v1/"), RoutingError::RouteNotFound { .. }));
    }

    fn route_err(path: &str) -> RoutingError {
        route(path).unwrap_err()
    }

    #[test]
    fn test_malformed_and_foreign_paths() {
        assert!(matches!(
            route_err("api/v1/product-variant/a/b"),
            RoutingError::MalformedRoute { .. }
        ));
        assert!(matches!(route_err("assets/app.js"), RoutingError::NotApiPath { .. }));
        assert!(matches!(route_err("apiary/v1/x"), RoutingError::NotApiPath { .. }));
        assert!(!router().is_api_path("/health"));
        assert!(router().is_api_path("/api/v1/ping"));
    }

    #[test]
    fn test_custom_prefix() {
        let router = router().with_prefix("/rest/");
        assert!(router
            .route("rest/v1/product-variant", &RequestParams::new())
            .is_ok());
    }
}
