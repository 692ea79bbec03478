//! 内置端点

use chrono::Local;
use waypoint_core::{Container, ContainerResult};

use crate::context::ActionContext;
use crate::error::ActionResult;
use crate::value::Value;
use crate::{actions, Endpoint};

/// 连通性检查：`GET api/v1/ping`
#[derive(Endpoint, Default)]
#[endpoint(public)]
pub struct PingEndpoint;

#[actions]
impl PingEndpoint {
    pub fn action_default(&self, ctx: &mut ActionContext) -> ActionResult<()> {
        let ip = ctx
            .request()
            .client_ipv4()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "127.0.0.1".to_string());

        ctx.send_json(Value::map([
            ("result", Value::from("PONG")),
            ("ip", Value::from(ip)),
            ("datetime", Value::from(Local::now())),
        ]))
    }
}

/// 把内置端点注册到容器
pub fn register_builtin_endpoints(container: &Container) -> ContainerResult<()> {
    if !container.contains_type::<PingEndpoint>() {
        container.register_instance(PingEndpoint)?;
    }
    Ok(())
}
