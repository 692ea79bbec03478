use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use waypoint_api::endpoints::register_builtin_endpoints;
use waypoint_api::prelude::*;
use waypoint_api::DispatcherBuilder;

#[derive(Endpoint, Default)]
#[endpoint(public, on_save = "persist")]
pub struct TestEndpoint {
    saves: AtomicUsize,
}

impl TestEndpoint {
    fn persist(&self) {
        self.saves.fetch_add(1, Ordering::SeqCst);
    }
}

#[actions]
impl TestEndpoint {
    pub fn post_create_user(
        &self,
        ctx: &mut ActionContext,
        username: String,
        password: String,
    ) -> ActionResult<()> {
        if password.len() < 8 {
            return ctx.send_error("Password must be at least 8 characters long.");
        }
        ctx.send_ok(Value::map([("username", username)]))
    }

    pub fn action_echo(&self, name: String, #[default(1)] page: i64, tags: Option<Vec<String>>) -> Value {
        Value::map([
            ("name", Value::from(name)),
            ("page", Value::from(page)),
            ("tags", Value::from(tags)),
        ])
    }

    pub fn action_locked(&self) -> ActionResult<Value> {
        Err(Halt::user("Article is locked"))
    }

    pub fn action_teapot(&self) -> ActionResult<Value> {
        Err(Halt::coded(418, anyhow::anyhow!("short and stout")))
    }

    pub fn action_crash(&self) -> ActionResult<Value> {
        Err(Halt::fail(anyhow::anyhow!("database is down")))
    }

    pub fn action_nothing(&self) {}

    pub fn delete_item(&self, id: i64) {
        assert!(id > 0);
    }

    pub fn action_user(&self) -> Value {
        Record::new("User")
            .with_field("username", "jan")
            .with_field("password", "plaintext")
            .into()
    }

    pub fn action_go(&self, ctx: &mut ActionContext) -> ActionResult<()> {
        ctx.redirect_url("https://example.com/login")
    }

    pub fn action_cycle(&self) -> Value {
        let node = Record::new("Node").shared();
        node.set("parent", Arc::clone(&node));
        Value::from(node)
    }

    pub fn action_deep(&self) -> Value {
        let mut value = Value::from("leaf");
        for _ in 0..40 {
            value = Value::map([("child", value)]);
        }
        value
    }

    pub fn action_boom(&self) -> Value {
        let items: Vec<i64> = Vec::new();
        let index = 3;
        Value::from(items[index])
    }

    pub fn put_import(&self, ctx: &mut ActionContext, rows: i64) -> Value {
        ctx.flash_message(format!("{} rows imported", rows), FlashKind::Success);
        Value::map([("rows", rows)])
    }

    pub fn put_archive(&self, ctx: &mut ActionContext) -> Response {
        ctx.flash_message("Archived", FlashKind::Info);
        StatusResponse::ok(StatusData::default()).with_code(202).into()
    }
}

/// 只登记在路由表里，容器中没有实例
#[derive(Endpoint)]
#[endpoint(public)]
pub struct ArchiveEndpoint;

#[actions]
impl ArchiveEndpoint {
    pub fn action_default(&self) -> Value {
        Value::List(Vec::new())
    }
}

#[derive(Endpoint, Default)]
pub struct AuditEndpoint {
    calls: AtomicUsize,
}

#[actions]
impl AuditEndpoint {
    #[role("admin")]
    pub fn action_default(&self) -> Value {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Value::map([("entries", Value::List(Vec::new()))])
    }

    pub fn action_mine(&self, ctx: &mut ActionContext) -> Value {
        Value::map([("user", ctx.principal().map(|p| p.id().to_string()))])
    }
}

struct Maintenance;

impl MatchExtension for Maintenance {
    fn name(&self) -> &str {
        "maintenance"
    }

    fn before_process(&self, _ctx: &MatchContext<'_>) -> Option<Response> {
        Some(StatusResponse::error("Down for maintenance").with_code(503).into())
    }

    fn path_patterns(&self) -> Vec<&str> {
        vec!["test/locked"]
    }
}

struct Envelope;

impl MatchExtension for Envelope {
    fn name(&self) -> &str {
        "envelope"
    }

    fn after_process(&self, _ctx: &MatchContext<'_>, response: Option<&Response>) -> Option<Response> {
        let code = response.map(Response::http_code)?;
        Some(JsonResponse::with_code(Value::map([("wrapped", true)]), code).into())
    }

    fn path_patterns(&self) -> Vec<&str> {
        vec!["audit/**"]
    }

    fn exclude_patterns(&self) -> Vec<&str> {
        vec!["audit/default"]
    }
}

fn header_principal(request: &RequestInfo) -> Option<Principal> {
    let id = request.header("x-user")?;
    let roles = request.header("x-roles").unwrap_or_default();
    Some(Principal::new(id).with_roles(roles.split(',').filter(|r| !r.is_empty())))
}

fn container() -> Arc<Container> {
    let container = Container::new();
    register_builtin_endpoints(&container).unwrap();
    container.register_instance(TestEndpoint::default()).unwrap();
    container.register_instance(AuditEndpoint::default()).unwrap();
    Arc::new(container)
}

fn dispatcher_with(
    container: &Arc<Container>,
    configure: impl FnOnce(DispatcherBuilder) -> DispatcherBuilder,
) -> Dispatcher {
    let table = Arc::new(RouteTable::from_inventory().unwrap());
    configure(Dispatcher::builder(table, container.clone())).build()
}

fn dispatcher() -> Dispatcher {
    dispatcher_with(&container(), |builder| builder)
}

#[test]
fn ping_answers_with_pong() {
    let outcome = dispatcher().dispatch(ApiRequest::get("api/v1/ping"));

    assert_eq!(outcome.status, 200);
    assert_eq!(outcome.body["result"], json!("PONG"));
    assert_eq!(outcome.body["ip"], json!("127.0.0.1"));
    assert!(outcome.body["datetime"].is_string());
}

#[test]
fn ping_reports_client_address() {
    let info = RequestInfo::new().with_remote_addr("10.0.0.7".parse().unwrap());
    let outcome = dispatcher().dispatch(ApiRequest::get("/api/v1/ping").with_info(info));
    assert_eq!(outcome.body["ip"], json!("10.0.0.7"));
}

#[test]
fn short_password_is_rejected_with_default_error_code() {
    let body = RequestParams::new()
        .with("username", "a")
        .with("password", "short");
    let outcome = dispatcher().dispatch(ApiRequest::post("api/v1/test/create-user").with_body(body));

    assert_eq!(outcome.status, 500);
    assert_eq!(outcome.body["state"], json!("error"));
    assert_eq!(outcome.body["code"], json!(500));
    assert_eq!(
        outcome.body["message"],
        json!("Password must be at least 8 characters long.")
    );
}

#[test]
fn valid_user_is_created() {
    let body = RequestParams::new()
        .with("username", "jan")
        .with("password", "long enough");
    let outcome = dispatcher().dispatch(ApiRequest::post("api/v1/test/create-user").with_body(body));

    assert_eq!(outcome.status, 200);
    assert_eq!(outcome.body["state"], json!("ok"));
    assert_eq!(outcome.body["data"]["username"], json!("jan"));
}

#[test]
fn unknown_route_is_not_found() {
    let outcome = dispatcher().dispatch(ApiRequest::get("api/v1/does-not-exist"));

    assert_eq!(outcome.status, 404);
    assert_eq!(outcome.body["state"], json!("error"));
    let message = outcome.body["message"].as_str().unwrap();
    assert!(message.contains("does-not-exist"), "{}", message);
}

#[test]
fn unknown_route_keeps_request_secrets_out() {
    let request = || {
        ApiRequest::post("api/v1/nope").with_body(
            RequestParams::new()
                .with("username", "jan")
                .with("password", "plaintext123"),
        )
    };

    let outcome = dispatcher().dispatch(request());
    assert_eq!(outcome.status, 404);
    let message = outcome.body["message"].as_str().unwrap();
    assert!(!message.contains("plaintext123"), "{}", message);
    assert!(!message.contains("Given params"), "{}", message);

    let debug = dispatcher_with(&container(), |b| b.debug(true));
    let outcome = debug.dispatch(request());
    assert_eq!(outcome.status, 404);
    let message = outcome.body["message"].as_str().unwrap();
    assert!(message.contains("Given params"), "{}", message);
    assert!(message.contains("\"username\": \"jan\""), "{}", message);
    assert!(message.contains("*****"), "{}", message);
    assert!(!message.contains("plaintext123"), "{}", message);
}

#[test]
fn endpoint_missing_from_container_is_not_found() {
    let outcome = dispatcher().dispatch(ApiRequest::get("api/v1/archive"));

    assert_eq!(outcome.status, 404);
    assert_eq!(outcome.body["state"], json!("error"));
    let message = outcome.body["message"].as_str().unwrap();
    assert!(message.contains("ArchiveEndpoint"), "{}", message);
    assert!(message.contains("not available"), "{}", message);
}

#[test]
fn role_protected_action_requires_login() {
    let container = container();
    let dispatcher = dispatcher_with(&container, |b| b);
    let audit = container.get::<AuditEndpoint>().unwrap();

    let outcome = dispatcher.dispatch(ApiRequest::get("api/v1/audit"));
    assert_eq!(outcome.status, 401);
    assert_eq!(outcome.body["state"], json!("error"));
    assert_eq!(audit.calls.load(Ordering::SeqCst), 0);

    let outcome = dispatcher.dispatch(
        ApiRequest::get("api/v1/audit").with_principal(Principal::new("7").with_roles(["editor"])),
    );
    assert_eq!(outcome.status, 403);
    assert_eq!(audit.calls.load(Ordering::SeqCst), 0);

    let outcome = dispatcher.dispatch(
        ApiRequest::get("api/v1/audit").with_principal(Principal::new("1").with_roles(["Admin"])),
    );
    assert_eq!(outcome.status, 200);
    assert_eq!(audit.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn principal_is_looked_up_from_request() {
    let dispatcher = dispatcher_with(&container(), |b| b.principal_lookup(header_principal));

    let mut info = RequestInfo::new();
    info.headers.insert("x-user", "42".parse().unwrap());
    let outcome = dispatcher.dispatch(ApiRequest::get("api/v1/audit/mine").with_info(info));

    assert_eq!(outcome.status, 200);
    assert_eq!(outcome.body["user"], json!("42"));
}

#[test]
fn permission_checks_can_be_disabled() {
    let mut convention = Convention::default();
    convention.set_ignore_default_permission(true);
    let dispatcher = dispatcher_with(&container(), |b| b.convention(Arc::new(convention)));

    let outcome = dispatcher.dispatch(ApiRequest::get("api/v1/audit"));
    assert_eq!(outcome.status, 200);
}

#[test]
fn password_is_redacted() {
    let outcome = dispatcher().dispatch(ApiRequest::get("api/v1/test/user"));

    assert_eq!(outcome.status, 200);
    assert_eq!(outcome.body["username"], json!("jan"));
    assert_eq!(outcome.body["password"], json!("*****"));
    assert!(!outcome.body.to_string().contains("plaintext"));
}

#[test]
fn query_parameters_are_bound() {
    let outcome = dispatcher().dispatch(ApiRequest::get("api/v1/test/echo?name=Jan&tags[]=a&tags[]=b"));

    assert_eq!(outcome.status, 200);
    assert_eq!(
        outcome.body,
        json!({"name": "Jan", "page": 1, "tags": ["a", "b"]})
    );
}

#[test]
fn get_ignores_request_body() {
    let outcome = dispatcher().dispatch(
        ApiRequest::get("api/v1/test/echo")
            .with_query(RequestParams::new().with("name", "query"))
            .with_body(RequestParams::new().with("name", "body")),
    );
    assert_eq!(outcome.body["name"], json!("query"));
}

#[test]
fn overrides_win_over_query() {
    let outcome = dispatcher().dispatch(
        ApiRequest::get("api/v1/test/echo?name=query&page=3")
            .with_overrides(RequestParams::new().with("name", "override")),
    );
    assert_eq!(outcome.body["name"], json!("override"));
    assert_eq!(outcome.body["page"], json!(3));
}

#[test]
fn missing_parameter_message_depends_on_debug() {
    let outcome = dispatcher().dispatch(ApiRequest::get("api/v1/test/echo"));
    assert_eq!(outcome.status, 500);
    assert_eq!(outcome.body["message"], json!(null));

    let debug = dispatcher_with(&container(), |b| b.debug(true));
    let outcome = debug.dispatch(ApiRequest::get("api/v1/test/echo"));
    let message = outcome.body["message"].as_str().unwrap();
    assert!(message.contains("\"name\""), "{}", message);
    assert!(message.contains("actionEcho"), "{}", message);
}

#[test]
fn unknown_verb_is_not_implemented() {
    let outcome = dispatcher().dispatch(ApiRequest::new("PUT", "api/v1/ping"));

    assert_eq!(outcome.status, 404);
    let message = outcome.body["message"].as_str().unwrap();
    assert!(message.contains("is not implemented"), "{}", message);
}

#[test]
fn invalid_version_is_bad_request() {
    let outcome = dispatcher().dispatch(ApiRequest::get("api/vX/ping"));
    assert_eq!(outcome.status, 400);
    assert_eq!(outcome.body["state"], json!("error"));
}

#[test]
fn user_error_message_is_shown() {
    let outcome = dispatcher().dispatch(ApiRequest::get("api/v1/test/locked"));
    assert_eq!(outcome.status, 500);
    assert_eq!(outcome.body["message"], json!("Article is locked"));
}

#[test]
fn coded_failure_keeps_its_status() {
    let outcome = dispatcher().dispatch(ApiRequest::get("api/v1/test/teapot"));
    assert_eq!(outcome.status, 418);
    assert_eq!(outcome.body["code"], json!(418));
    assert_eq!(outcome.body["message"], json!(null));
}

#[test]
fn unexpected_failure_is_hidden_unless_debug() {
    let outcome = dispatcher().dispatch(ApiRequest::get("api/v1/test/crash"));
    assert_eq!(outcome.status, 500);
    assert_eq!(outcome.body["message"], json!(null));

    let debug = dispatcher_with(&container(), |b| b.debug(true));
    let outcome = debug.dispatch(ApiRequest::get("api/v1/test/crash"));
    assert_eq!(outcome.body["message"], json!("database is down"));
}

#[test]
fn get_without_output_is_an_error() {
    let outcome = dispatcher().dispatch(ApiRequest::get("api/v1/test/nothing"));
    assert_eq!(outcome.status, 404);
    let message = outcome.body["message"].as_str().unwrap();
    assert!(message.contains("must return some output"), "{}", message);
}

#[test]
fn write_without_output_is_ok() {
    let outcome = dispatcher().dispatch(
        ApiRequest::new("DELETE", "api/v1/test/item?id=5"),
    );
    assert_eq!(outcome.status, 200);
    assert_eq!(outcome.body["state"], json!("ok"));
    assert_eq!(outcome.body["code"], json!(200));
}

#[test]
fn post_can_override_method() {
    let mut info = RequestInfo::new();
    info.headers
        .insert("x-http-method-override", "DELETE".parse().unwrap());
    let outcome = dispatcher().dispatch(
        ApiRequest::post("api/v1/test/item")
            .with_body(RequestParams::new().with("id", "9"))
            .with_info(info),
    );
    assert_eq!(outcome.status, 200);
    assert_eq!(outcome.body["state"], json!("ok"));
}

#[test]
fn redirect_sets_location() {
    let outcome = dispatcher().dispatch(ApiRequest::get("api/v1/test/go"));
    assert_eq!(outcome.status, 301);
    assert_eq!(outcome.location.as_deref(), Some("https://example.com/login"));
    assert_eq!(outcome.body, json!({"location": "https://example.com/login"}));
}

#[test]
fn cyclic_record_is_a_server_error() {
    let outcome = dispatcher().dispatch(ApiRequest::get("api/v1/test/cycle"));
    assert_eq!(outcome.status, 500);
    assert_eq!(outcome.body["state"], json!("error"));
}

#[test]
fn too_deep_output_is_a_server_error() {
    let outcome = dispatcher().dispatch(ApiRequest::get("api/v1/test/deep"));
    assert_eq!(outcome.status, 500);
    assert_eq!(outcome.body["state"], json!("error"));
    assert_eq!(outcome.body["message"], json!(null));

    let debug = dispatcher_with(&container(), |b| b.debug(true));
    let outcome = debug.dispatch(ApiRequest::get("api/v1/test/deep"));
    assert_eq!(outcome.status, 500);
    let message = outcome.body["message"].as_str().unwrap();
    assert!(message.contains("too deep"), "{}", message);
}

#[test]
fn panicking_action_becomes_server_error() {
    let dispatcher = dispatcher();
    let outcome = dispatcher.dispatch(ApiRequest::get("api/v1/test/boom"));
    assert_eq!(outcome.status, 500);
    assert_eq!(outcome.body["state"], json!("error"));
    assert_eq!(outcome.body["message"], json!(null));

    // 同一个分发器继续可用
    let outcome = dispatcher.dispatch(ApiRequest::get("api/v1/ping"));
    assert_eq!(outcome.status, 200);

    let debug = dispatcher_with(&container(), |b| b.debug(true));
    let outcome = debug.dispatch(ApiRequest::get("api/v1/test/boom"));
    assert_eq!(outcome.status, 500);
    let message = outcome.body["message"].as_str().unwrap();
    assert!(message.contains("Endpoint panicked"), "{}", message);
    assert!(message.contains("index out of bounds"), "{}", message);
}

#[test]
fn write_without_output_uses_configured_ok_code() {
    let mut convention = Convention::default();
    convention.set_default_ok_code(201).unwrap();
    let dispatcher = dispatcher_with(&container(), |b| b.convention(Arc::new(convention)));

    let outcome = dispatcher.dispatch(ApiRequest::new("DELETE", "api/v1/test/item?id=5"));
    assert_eq!(outcome.status, 201);
    assert_eq!(outcome.body["code"], json!(201));
}

#[test]
fn returned_output_carries_queued_flash_messages() {
    let outcome = dispatcher().dispatch(
        ApiRequest::new("PUT", "api/v1/test/import").with_body(RequestParams::new().with("rows", 3)),
    );
    assert_eq!(outcome.status, 200);
    assert_eq!(
        outcome.body,
        json!({"rows": 3, "flashMessages": [{"message": "3 rows imported", "type": "success"}]})
    );

    let outcome = dispatcher().dispatch(ApiRequest::new("PUT", "api/v1/test/archive"));
    assert_eq!(outcome.status, 202);
    assert_eq!(outcome.body["state"], json!("ok"));
    assert_eq!(outcome.body["flashMessages"][0]["message"], json!("Archived"));
}

#[test]
fn save_state_runs_after_success_and_short_circuit() {
    let container = container();
    let dispatcher = dispatcher_with(&container, |b| b);
    let endpoint = container.get::<TestEndpoint>().unwrap();
    let before = endpoint.saves.load(Ordering::SeqCst);

    dispatcher.dispatch(ApiRequest::get("api/v1/test/user"));
    dispatcher.dispatch(ApiRequest::get("api/v1/test/go"));
    dispatcher.dispatch(ApiRequest::get("api/v1/test/crash"));

    assert_eq!(endpoint.saves.load(Ordering::SeqCst), before + 2);
}

#[test]
fn extensions_can_answer_and_replace() {
    let dispatcher = dispatcher_with(&container(), |b| b.extension(Maintenance).extension(Envelope));

    let outcome = dispatcher.dispatch(ApiRequest::get("api/v1/test/locked"));
    assert_eq!(outcome.status, 503);
    assert_eq!(outcome.body["message"], json!("Down for maintenance"));

    let outcome = dispatcher.dispatch(
        ApiRequest::get("api/v1/audit/mine").with_principal(Principal::new("3")),
    );
    assert_eq!(outcome.body, json!({"wrapped": true}));

    let outcome = dispatcher.dispatch(
        ApiRequest::get("api/v1/audit").with_principal(Principal::new("1").with_roles(["admin"])),
    );
    assert_eq!(outcome.body, json!({"entries": []}));
}

#[test]
fn foreign_paths_are_left_alone() {
    let dispatcher = dispatcher();
    assert!(dispatcher.try_dispatch(ApiRequest::get("/assets/app.js")).is_none());
    assert!(dispatcher.try_dispatch(ApiRequest::get("/api/v1/ping")).is_some());
}

#[test]
fn internal_get_prefixes_version() {
    let dispatcher = dispatcher();
    let body = dispatcher.get("test/echo", RequestParams::new().with("name", "Eva"), "GET");
    assert_eq!(body["name"], json!("Eva"));

    let body = dispatcher.get("api/v1/ping", RequestParams::new(), "GET");
    assert_eq!(body["result"], json!("PONG"));
}

#[test]
fn empty_parameter_key_is_bad_request() {
    let outcome = dispatcher().dispatch(
        ApiRequest::get("api/v1/ping").with_overrides(RequestParams::new().with("", 1)),
    );
    assert_eq!(outcome.status, 400);
}

#[test]
fn out_of_range_error_code_is_clamped() {
    let mut convention = Convention::default();
    convention.set_default_error_code(999).unwrap();
    let dispatcher = dispatcher_with(&container(), |b| b.convention(Arc::new(convention)));

    let outcome = dispatcher.dispatch(ApiRequest::get("api/v1/test/locked"));
    assert_eq!(outcome.status, 500);
    assert_eq!(outcome.body["code"], json!(999));
}
