//! The accumulated OpenAPI document: operations, parameters, refs, security and
//! validity against the `oas3` model.

use crudrouter::capability::{Capability, CapabilitySet};
use crudrouter::config::ApiConfig;
use crudrouter::envelope::Reply;
use crudrouter::error::RegistryError;
use crudrouter::registry::Api;
use crudrouter::resource::{BoundIds, OperationConfig, RequestContext, Resource};
use crudrouter::schema::{Fields, Schema};
use crudrouter::spec::{SecurityScheme, SpecError};
use oas3::OpenApiV3Spec;
use serde_json::{json, Value};

struct Stub {
    caps: CapabilitySet,
    security: Option<&'static str>,
}

impl Stub {
    fn new(caps: CapabilitySet) -> Self {
        Self { caps, security: None }
    }
}

impl Resource for Stub {
    fn capabilities(&self) -> CapabilitySet {
        self.caps
    }

    fn operation(&self, capability: Capability) -> OperationConfig {
        let config = OperationConfig::new();
        let config = match self.security {
            Some(scheme) => config.security(scheme),
            None => config,
        };
        if capability == Capability::Delete {
            config.description("Pluck a whisker.")
        } else {
            config
        }
    }

    fn create(&self, _ctx: &RequestContext<'_>, _parents: &BoundIds, fields: Fields) -> anyhow::Result<Reply> {
        Ok(Value::Object(fields).into())
    }
}

fn whisker_schema() -> Schema {
    Schema::new(
        "CatWhisker",
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "integer", "readOnly": true},
                "length": {"type": "number"}
            },
            "required": ["length"]
        }),
    )
    .unwrap()
}

fn whisker_api() -> Api {
    let mut api = Api::new(ApiConfig::new("Cat API").server("https://feline.io")).unwrap();
    api.resource(
        "/cats/<int:cat_id>/whiskers/<int:whisker_id>",
        "CatWhisker",
        whisker_schema(),
        Stub::new(CapabilitySet::CRUD),
    )
    .unwrap();
    api
}

#[test]
fn test_full_crud_operations_and_parameters() {
    let api = whisker_api();
    let doc = api.spec().document();

    let ops: Vec<(&str, &str)> = doc.operations().map(|(p, m, _)| (p, m)).collect();
    assert_eq!(
        ops,
        vec![
            ("/cats/{cat_id}/whiskers", "get"),
            ("/cats/{cat_id}/whiskers", "post"),
            ("/cats/{cat_id}/whiskers/{whisker_id}", "delete"),
            ("/cats/{cat_id}/whiskers/{whisker_id}", "get"),
            ("/cats/{cat_id}/whiskers/{whisker_id}", "patch"),
            ("/cats/{cat_id}/whiskers/{whisker_id}", "put"),
        ]
    );
    for (_, _, op) in doc.operations() {
        assert_eq!(op.tags, vec!["CatWhisker".to_string()]);
        assert_eq!(op.parameters[0].name, "cat_id");
        assert_eq!(op.parameters[0].schema, json!({"type": "integer"}));
    }

    let item = doc.operation("/cats/{cat_id}/whiskers/{whisker_id}", "GET").unwrap();
    assert_eq!(item.parameters.len(), 2);
    assert_eq!(item.parameters[1].name, "whisker_id");
    let collection = doc.operation("/cats/{cat_id}/whiskers", "POST").unwrap();
    assert_eq!(collection.parameters.len(), 1);
}

#[test]
fn test_status_codes_and_body_refs() {
    let api = whisker_api();
    let json = serde_json::to_value(api.spec().document()).unwrap();
    let item = &json["paths"]["/cats/{cat_id}/whiskers/{whisker_id}"];
    let collection = &json["paths"]["/cats/{cat_id}/whiskers"];

    assert!(collection["post"]["responses"].get("201").is_some());
    assert_eq!(
        collection["get"]["responses"]["200"]["content"]["application/json"]["schema"],
        json!({"type": "array", "items": {"$ref": "#/components/schemas/CatWhisker"}})
    );
    assert_eq!(
        item["put"]["requestBody"]["content"]["application/json"]["schema"],
        json!({"$ref": "#/components/schemas/CatWhisker"})
    );
    assert_eq!(
        item["patch"]["requestBody"]["content"]["application/x-www-form-urlencoded"]["schema"],
        json!({"$ref": "#/components/schemas/CatWhiskerPartial"})
    );
    assert!(item["delete"].get("requestBody").is_none());
    assert!(item["delete"]["responses"]["204"].get("content").is_none());
    assert_eq!(item["delete"]["description"], "Pluck a whisker.");
    assert_eq!(item["get"]["operationId"], "retrieve_cat_whisker");
    assert!(json["components"]["schemas"]["CatWhiskerPartial"]
        .get("required")
        .is_none());
}

#[test]
fn test_only_declared_capabilities_are_documented() {
    let mut api = Api::new(ApiConfig::new("Cat API")).unwrap();
    api.resource(
        "/cats/<int:cat_id>/syncs/<cat_sync_id>",
        "CatSync",
        Schema::new("CatSync", json!({"type": "object", "properties": {"done": {"type": "boolean"}}})).unwrap(),
        Stub::new(CapabilitySet::NON_LISTABLE_RETRIEVE.with(Capability::Create)),
    )
    .unwrap();
    let doc = api.spec().document();
    assert_eq!(doc.operations().count(), 2);
    let retrieve = doc.operation("/cats/{cat_id}/syncs/{cat_sync_id}", "get").unwrap();
    assert_eq!(retrieve.parameters[1].schema, json!({"type": "string"}));
    assert!(doc.operation("/cats/{cat_id}/syncs", "get").is_none());
    assert!(!doc.components.schemas.contains_key("CatSyncPartial"));
}

#[test]
fn test_security_requirements() {
    let mut api = Api::new(ApiConfig::new("Cat API").default_security_scheme("jwt_access_token")).unwrap();
    api.resource(
        "/cats/<int:cat_id>",
        "Cat",
        Schema::new("Cat", json!({"type": "object", "properties": {"name": {"type": "string"}}})).unwrap(),
        Stub::new(CapabilitySet::RETRIEVE),
    )
    .unwrap();
    api.resource(
        "/tokens/<int:token_id>",
        "Token",
        Schema::new("Token", json!({"type": "object", "properties": {"token": {"type": "string"}}})).unwrap(),
        Stub {
            caps: CapabilitySet::of(&[Capability::Create]),
            security: Some("jwt_refresh_token"),
        },
    )
    .unwrap();
    let doc = api.spec().document();
    let cat = doc.operation("/cats/{cat_id}", "get").unwrap();
    assert_eq!(cat.security.len(), 1);
    assert!(cat.security[0].contains_key("jwt_access_token"));
    let token = doc.operation("/tokens", "post").unwrap();
    assert!(token.security[0].contains_key("jwt_refresh_token"));

    let public = Api::new(ApiConfig::new("Open")).unwrap();
    assert!(public.spec().document().components.security_schemes.contains_key("basic_http"));
}

#[test]
fn test_public_operation_has_empty_security() {
    let mut api = Api::new(ApiConfig::new("Cat API")).unwrap();
    api.resource(
        "/cats/<int:cat_id>",
        "Cat",
        Schema::new("Cat", json!({"type": "object", "properties": {}})).unwrap(),
        Stub::new(CapabilitySet::NON_LISTABLE_RETRIEVE),
    )
    .unwrap();
    let json = serde_json::to_value(api.spec().document()).unwrap();
    assert_eq!(json["paths"]["/cats/{cat_id}"]["get"]["security"], json!([]));
}

#[test]
fn test_unknown_scheme_is_a_registration_error() {
    let mut api = Api::new(ApiConfig::new("Cat API")).unwrap();
    let err = api
        .resource(
            "/cats/<int:cat_id>",
            "Cat",
            Schema::new("Cat", json!({"type": "object", "properties": {}})).unwrap(),
            Stub {
                caps: CapabilitySet::RETRIEVE,
                security: Some("api_key"),
            },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Spec(SpecError::UnknownSecurityScheme { .. })
    ));

    assert!(matches!(
        Api::new(ApiConfig::new("Cat API").default_security_scheme("api_key")),
        Err(RegistryError::UnknownSecurityScheme(_))
    ));
}

#[test]
fn test_configured_scheme_is_declared() {
    let scheme: SecurityScheme =
        serde_json::from_value(json!({"type": "apiKey", "name": "X-Api-Key", "in": "header"})).unwrap();
    let api = Api::new(
        ApiConfig::new("Cat API")
            .security_scheme("api_key", scheme)
            .default_security_scheme("api_key"),
    )
    .unwrap();
    assert!(api.spec().get_security_scheme("api_key").is_some());
}

#[test]
fn test_duplicate_names_are_rejected() {
    let mut api = whisker_api();
    let err = api
        .resource(
            "/dogs/<int:dog_id>/whiskers/<int:whisker_id>",
            "CatWhisker",
            whisker_schema(),
            Stub::new(CapabilitySet::CRUD),
        )
        .unwrap_err();
    assert_eq!(err, RegistryError::DuplicateResource("CatWhisker".to_string()));
}

#[test]
fn test_frozen_document_parses_as_openapi() {
    let app = whisker_api().build();
    let spec: OpenApiV3Spec = serde_json::from_value(app.spec().to_json().clone()).unwrap();
    assert_eq!(spec.info.title, "Cat API");
    assert_eq!(spec.servers[0].url, "https://feline.io");

    let paths = spec.paths.as_ref().unwrap();
    let collection = &paths["/cats/{cat_id}/whiskers"];
    assert!(collection.get.is_some());
    assert!(collection.post.is_some());
    assert!(collection.put.is_none());
    let item = &paths["/cats/{cat_id}/whiskers/{whisker_id}"];
    assert!(item.patch.is_some());
    assert!(item.delete.is_some());

    let components = spec.components.as_ref().unwrap();
    assert!(components.schemas.contains_key("CatWhisker"));
    assert!(components.security_schemes.contains_key("jwt_access_token"));
}

#[test]
fn test_served_document_matches_frozen_document() {
    let app = whisker_api().build();
    let res = app.handle(&crudrouter::dispatcher::HandlerRequest::new(http::Method::GET, "/spec"));
    assert_eq!(res.status, 200);
    assert_eq!(&res.body, app.spec().to_json());
    assert_eq!(res.body["openapi"], "3.0.3");
    assert_eq!(res.body["tags"], json!([{"name": "CatWhisker"}]));
}
