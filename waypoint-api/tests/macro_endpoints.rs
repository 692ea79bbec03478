use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use waypoint_api::endpoint::{EndpointActions, EndpointDescriptor, EndpointMeta, ParamKind};
use waypoint_api::prelude::*;

#[derive(Debug, Deserialize)]
pub struct Address {
    pub city: String,
}

#[derive(Endpoint, Default)]
#[endpoint(role = "Admin", role = "content-editor", on_save = "flush")]
pub struct ProductVariantEndpoint {
    flushed: AtomicBool,
}

impl ProductVariantEndpoint {
    fn flush(&self) {
        self.flushed.store(true, Ordering::SeqCst);
    }
}

#[actions]
impl ProductVariantEndpoint {
    pub fn action_default(&self, #[default(1)] page: i64, search: Option<String>) -> Value {
        Value::map([("page", Value::from(page)), ("search", Value::from(search))])
    }

    #[role("owner")]
    pub fn post_set_main_image(
        &self,
        variant_id: u32,
        ctx: &mut ActionContext,
        image_ids: Vec<i64>,
        primary: bool,
    ) -> ActionResult<()> {
        ctx.send_ok(Value::map([
            ("variantId", Value::from(variant_id)),
            ("images", Value::from(image_ids)),
            ("primary", Value::from(primary)),
        ]))
    }

    pub fn put_import(&self, data: HashMap<String, serde_json::Value>) -> Value {
        Value::from(data.len())
    }

    pub fn post_ship(&self, address: Address, weight: f64) -> ActionResult<Value> {
        if weight <= 0.0 {
            return Err(Halt::user("Weight must be positive"));
        }
        Ok(Value::map([("city", address.city)]))
    }

    fn helper(&self) -> i64 {
        7
    }

    pub fn action_helper(&self) -> Value {
        Value::from(self.helper())
    }
}

#[derive(Endpoint)]
#[endpoint(public)]
pub struct CatalogEndpoint;

#[actions]
impl CatalogEndpoint {
    pub fn action_default(&self) -> serde_json::Value {
        json!({"items": []})
    }
}

#[test]
fn derive_produces_metadata() {
    assert_eq!(ProductVariantEndpoint::type_name(), "ProductVariantEndpoint");
    assert!(!ProductVariantEndpoint::is_public());
    assert_eq!(ProductVariantEndpoint::roles(), &["Admin", "content-editor"]);
    assert!(CatalogEndpoint::is_public());
    assert!(CatalogEndpoint::roles().is_empty());
}

#[test]
fn actions_are_described() {
    let descriptor = EndpointDescriptor::of::<ProductVariantEndpoint>();
    assert_eq!(descriptor.route(), "product-variant");
    assert_eq!(descriptor.roles(), &["admin".to_string(), "content-editor".to_string()]);

    let methods: Vec<_> = descriptor.actions().iter().map(|a| a.method()).collect();
    assert_eq!(
        methods,
        vec!["actionDefault", "postSetMainImage", "putImport", "postShip", "actionHelper"]
    );

    let default = descriptor.action("actionDefault").unwrap();
    assert_eq!(default.params()[0].name, "page");
    assert_eq!(default.params()[0].kind, ParamKind::Int);
    assert_eq!(default.params()[0].default, Some(json!(1)));
    assert!(default.params()[1].nullable);
    assert_eq!(default.params()[1].kind, ParamKind::String);

    let set_image = descriptor.action("postSetMainImage").unwrap();
    let names: Vec<_> = set_image.params().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["variantId", "imageIds", "primary"]);
    assert_eq!(set_image.params()[1].kind, ParamKind::List);
    assert_eq!(set_image.params()[2].kind, ParamKind::Bool);
    assert_eq!(set_image.required_roles(), &["owner".to_string()]);

    let import = descriptor.action("putImport").unwrap();
    assert!(import.params()[0].is_data());
    assert_eq!(import.params()[0].kind, ParamKind::Map);

    let ship = descriptor.action("postShip").unwrap();
    assert_eq!(ship.params()[0].kind, ParamKind::Object("Address"));
    assert_eq!(ship.params()[1].kind, ParamKind::Float);
}

#[test]
fn private_methods_are_not_actions() {
    assert!(ProductVariantEndpoint::actions()
        .iter()
        .all(|a| a.rust_name() != "helper"));
}

#[test]
fn endpoints_are_collected_from_inventory() {
    let table = RouteTable::from_inventory().unwrap();
    assert!(table.get("product-variant").is_some());
    assert!(table.get("catalog").is_some());
    assert!(table.get("ping").is_some());
}

fn dispatcher() -> (Arc<Container>, Dispatcher) {
    let container = Container::new();
    container
        .register_instance(ProductVariantEndpoint::default())
        .unwrap();
    container.register_instance(CatalogEndpoint).unwrap();
    let container = Arc::new(container);

    let table = RouteTable::builder()
        .endpoint::<ProductVariantEndpoint>()
        .endpoint::<CatalogEndpoint>()
        .build()
        .unwrap();
    let dispatcher = Dispatcher::builder(Arc::new(table), container.clone()).build();
    (container, dispatcher)
}

fn editor() -> Principal {
    Principal::new("5").with_roles(["content-editor"])
}

#[test]
fn generated_invokers_bind_and_call() {
    let (container, dispatcher) = dispatcher();

    let outcome = dispatcher.dispatch(
        ApiRequest::get("api/v1/product-variant?search=red").with_principal(editor()),
    );
    assert_eq!(outcome.status, 200);
    assert_eq!(outcome.body, json!({"page": 1, "search": "red"}));
    assert!(container
        .get::<ProductVariantEndpoint>()
        .unwrap()
        .flushed
        .load(Ordering::SeqCst));

    let outcome = dispatcher.dispatch(
        ApiRequest::post("api/v1/product-variant/set-main-image")
            .with_body(RequestParams::from_json(json!({
                "variantId": "12",
                "imageIds": [3, 4],
                "primary": "yes"
            })))
            .with_principal(editor()),
    );
    assert_eq!(outcome.status, 200);
    assert_eq!(
        outcome.body["data"],
        json!({"variantId": 12, "images": [3, 4], "primary": true})
    );
}

#[test]
fn data_parameter_receives_all_params() {
    let (_, dispatcher) = dispatcher();
    let outcome = dispatcher.dispatch(
        ApiRequest::new("PUT", "api/v1/product-variant/import")
            .with_body(RequestParams::new().with("a", 1).with("b", 2).with("c", 3))
            .with_principal(editor()),
    );
    assert_eq!(outcome.status, 200);
    assert_eq!(outcome.body, json!(3));
}

#[test]
fn object_parameters_are_deserialized() {
    let (_, dispatcher) = dispatcher();
    let outcome = dispatcher.dispatch(
        ApiRequest::post("api/v1/product-variant/ship")
            .with_body(RequestParams::from_json(json!({
                "address": {"city": "Prague"},
                "weight": "2.5"
            })))
            .with_principal(editor()),
    );
    assert_eq!(outcome.status, 200);
    assert_eq!(outcome.body, json!({"city": "Prague"}));

    let outcome = dispatcher.dispatch(
        ApiRequest::post("api/v1/product-variant/ship")
            .with_body(RequestParams::from_json(json!({
                "address": {"city": "Prague"},
                "weight": -1
            })))
            .with_principal(editor()),
    );
    assert_eq!(outcome.body["message"], json!("Weight must be positive"));
}

#[test]
fn wrong_argument_shape_is_a_binding_failure() {
    let (_, dispatcher) = dispatcher();
    let outcome = dispatcher.dispatch(
        ApiRequest::post("api/v1/product-variant/ship")
            .with_body(RequestParams::from_json(json!({
                "address": "Prague",
                "weight": 1
            })))
            .with_principal(editor()),
    );
    assert_eq!(outcome.status, 500);
    assert_eq!(outcome.body["state"], json!("error"));
}

#[test]
fn method_roles_gate_access() {
    let (_, dispatcher) = dispatcher();
    let request = || {
        ApiRequest::post("api/v1/product-variant/set-main-image").with_body(
            RequestParams::new()
                .with("variantId", 1)
                .with("imageIds", json!([]))
                .with("primary", false),
        )
    };

    let outcome = dispatcher.dispatch(request().with_principal(Principal::new("9").with_roles(["viewer"])));
    assert_eq!(outcome.status, 403);

    let outcome = dispatcher.dispatch(request().with_principal(Principal::new("9").with_roles(["owner"])));
    assert_eq!(outcome.status, 200);
}

#[test]
fn public_endpoint_needs_no_principal() {
    let (_, dispatcher) = dispatcher();
    let outcome = dispatcher.dispatch(ApiRequest::get("api/v1/catalog"));
    assert_eq!(outcome.status, 200);
    assert_eq!(outcome.body, json!({"items": []}));
}
