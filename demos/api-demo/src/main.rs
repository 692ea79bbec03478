use std::sync::Arc;

use waypoint_api::endpoints::register_builtin_endpoints;
use waypoint_api::prelude::*;
use waypoint_core::EnvironmentPropertySource;

mod endpoints;

use endpoints::ArticleEndpoint;

/// 演示用的身份识别：`X-Demo-User: <id>[:role,role]`
fn demo_principal(request: &RequestInfo) -> Option<Principal> {
    let raw = request.header("x-demo-user")?;
    let (id, roles) = match raw.split_once(':') {
        Some((id, roles)) => (id, roles.split(',').map(str::trim).collect::<Vec<_>>()),
        None => (raw, Vec::new()),
    };
    Some(Principal::new(id.trim()).with_roles(roles))
}

/// 维护模式：拦截所有写操作
struct ReadOnlyMode {
    enabled: bool,
}

impl MatchExtension for ReadOnlyMode {
    fn name(&self) -> &str {
        "read-only"
    }

    fn before_process(&self, ctx: &MatchContext<'_>) -> Option<Response> {
        if !self.enabled || ctx.verb == "GET" {
            return None;
        }
        Some(
            StatusResponse::error("The API is in read-only mode")
                .with_code(503)
                .into(),
        )
    }

    fn path_patterns(&self) -> Vec<&str> {
        vec!["article/**"]
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_file = if std::path::Path::new("demos/api-demo/application.toml").exists() {
        "demos/api-demo/application.toml"
    } else {
        "application.toml"
    };

    let environment = Environment::new()
        .with_source(TomlPropertySource::from_file(config_file)?)
        .with_source(EnvironmentPropertySource::new("WAYPOINT"));

    LoggingConfig::from_environment(&environment).init()?;

    let convention = Arc::new(Convention::from_environment(&environment)?);
    let properties = ApiProperties::from_environment(&environment)?;

    let container = Container::new();
    register_builtin_endpoints(&container)?;
    container.register_singleton(|_| Ok(ArticleEndpoint::default()))?;

    let table = Arc::new(RouteTable::from_inventory()?);
    for endpoint in table.routes() {
        tracing::info!(
            route = endpoint.route(),
            actions = endpoint.actions().len(),
            public = endpoint.is_public(),
            "Endpoint registered"
        );
    }

    let dispatcher = Dispatcher::builder(table, Arc::new(container))
        .convention(convention)
        .principal_lookup(demo_principal)
        .extension(ReadOnlyMode {
            enabled: environment.get_bool_or("demo.read-only", false),
        })
        .debug(properties.debug)
        .prefix(properties.prefix.clone())
        .build();

    println!("\n📋 可用的 API 端点：\n");
    println!("  GET    /{}/v1/ping                     - 连通性检查", properties.prefix);
    println!("  GET    /{}/v1/article?page=1&limit=2   - 文章列表", properties.prefix);
    println!("  GET    /{}/v1/article/detail?id=1      - 文章详情", properties.prefix);
    println!("  GET    /{}/v1/article/select-options   - 下拉框选项", properties.prefix);
    println!("  POST   /{}/v1/article/create           - 新建文章（X-Demo-User: 1:editor）", properties.prefix);
    println!("  DELETE /{}/v1/article?id=1             - 删除文章（X-Demo-User: 1:editor）\n", properties.prefix);

    ApiServer::new(Arc::new(dispatcher), properties).run().await
}
