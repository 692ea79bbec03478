//! 路由表
//!
//! 路由名 → 端点描述。启动时一次性构建，之后只读，由分发器共享。

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::endpoint::{registered_endpoints, Endpoint, EndpointActions, EndpointDescriptor, EndpointMeta};
use crate::error::RegistrationError;

fn role_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9-]+$").expect("role pattern is valid"))
}

#[derive(Debug, Default)]
pub struct RouteTable {
    routes: HashMap<String, Arc<EndpointDescriptor>>,
}

impl RouteTable {
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::default()
    }

    /// 由所有 `#[actions]` 登记的端点构建
    pub fn from_inventory() -> Result<Self, RegistrationError> {
        Self::builder().with_inventory().build()
    }

    pub fn get(&self, route: &str) -> Option<&Arc<EndpointDescriptor>> {
        self.routes.get(route)
    }

    /// 按路由名排序
    pub fn routes(&self) -> Vec<&Arc<EndpointDescriptor>> {
        let mut routes: Vec<_> = self.routes.values().collect();
        routes.sort_by(|a, b| a.route().cmp(b.route()));
        routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[derive(Default)]
pub struct RouteTableBuilder {
    descriptors: Vec<EndpointDescriptor>,
}

impl RouteTableBuilder {
    pub fn endpoint<T>(self) -> Self
    where
        T: Endpoint + EndpointMeta + EndpointActions,
    {
        self.descriptor(EndpointDescriptor::of::<T>())
    }

    pub fn descriptor(mut self, descriptor: EndpointDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn with_inventory(mut self) -> Self {
        self.descriptors.extend(registered_endpoints());
        self
    }

    /// 校验并生成路由表
    ///
    /// 同一个类型重复加入时只保留一份；不同类型派生出同一路由名是错误。
    pub fn build(self) -> Result<RouteTable, RegistrationError> {
        let mut routes: HashMap<String, Arc<EndpointDescriptor>> = HashMap::new();

        for descriptor in self.descriptors {
            validate(&descriptor)?;

            if let Some(existing) = routes.get(descriptor.route()) {
                if existing.type_id() == descriptor.type_id() {
                    continue;
                }
                return Err(RegistrationError::DuplicateRoute {
                    route: descriptor.route().to_string(),
                    first: existing.type_name().to_string(),
                    second: descriptor.type_name().to_string(),
                });
            }

            tracing::debug!(
                route = descriptor.route(),
                endpoint = descriptor.type_name(),
                actions = descriptor.actions().len(),
                "Registered API endpoint"
            );
            routes.insert(descriptor.route().to_string(), Arc::new(descriptor));
        }

        tracing::info!(endpoints = routes.len(), "Route table built");
        Ok(RouteTable { routes })
    }
}

fn validate(descriptor: &EndpointDescriptor) -> Result<(), RegistrationError> {
    let invalid_role = |role: &String| RegistrationError::InvalidRole {
        endpoint: descriptor.type_name().to_string(),
        role: role.clone(),
    };

    if let Some(role) = descriptor.roles().iter().find(|r| !role_pattern().is_match(r)) {
        return Err(invalid_role(role));
    }

    let mut methods = HashSet::new();
    for action in descriptor.actions() {
        if let Some(role) = action
            .required_roles()
            .iter()
            .find(|r| !role_pattern().is_match(r))
        {
            return Err(invalid_role(role));
        }
        if !methods.insert(action.method()) {
            return Err(RegistrationError::DuplicateAction {
                endpoint: descriptor.type_name().to_string(),
                method: action.method().to_string(),
            });
        }
    }
    Ok(())
}
