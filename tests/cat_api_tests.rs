//! Cat API scenarios driven through `App::handle`, no sockets involved.
//!
//! Every request is addressed to `feline.io`, so generated links are rooted at
//! `http://feline.io`.

use crudrouter::config::ApiConfig;
use crudrouter::dispatcher::{HandlerRequest, HandlerResponse};
use crudrouter::registry::App;
use http::Method;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

mod common;
use common::tokens::{access_token, expired_token, forged_token, refresh_token};
use common::JWT_SECRET;

#[path = "../src/bin/cat_api/cats.rs"]
mod cats;
use cats::{Db, SharedDb};

struct CatApi {
    app: App,
    db: SharedDb,
}

impl CatApi {
    fn new() -> Self {
        let db: SharedDb = Arc::new(Mutex::new(Db::seeded()));
        let api = cats::build_api(ApiConfig::new("Cat API"), JWT_SECRET, Arc::clone(&db)).unwrap();
        Self {
            app: api.build(),
            db,
        }
    }

    fn request(method: Method, path: &str) -> HandlerRequest {
        HandlerRequest::new(method, path)
            .with_header("host", "feline.io")
            .with_header("authorization", format!("Bearer {}", access_token()))
    }

    fn send(&self, req: HandlerRequest) -> HandlerResponse {
        self.app.handle(&req)
    }

    fn get(&self, path: &str) -> HandlerResponse {
        self.send(Self::request(Method::GET, path))
    }

    fn db(&self) -> std::sync::MutexGuard<'_, Db> {
        self.db.lock().unwrap()
    }
}

fn link_header(res: &HandlerResponse) -> Vec<(String, String)> {
    res.get_header("Link")
        .unwrap_or("")
        .split(", ")
        .filter(|p| !p.is_empty())
        .map(|part| {
            let (url, rel) = part.split_once("; ").unwrap();
            let url = url.trim_start_matches('<').trim_end_matches('>');
            let rel = rel.trim_start_matches("rel=\"").trim_end_matches('"');
            (rel.to_string(), url.to_string())
        })
        .collect()
}

fn rel<'a>(links: &'a [(String, String)], name: &str) -> Option<&'a str> {
    links.iter().find(|(r, _)| r == name).map(|(_, u)| u.as_str())
}

#[test]
fn test_create_cat_from_form() {
    let api = CatApi::new();
    let res = api.send(
        CatApi::request(Method::POST, "/cats").with_form([("name", "Simba"), ("weight", "12.34")]),
    );
    assert_eq!(res.status, 201);
    let id = res.body["id"].as_i64().unwrap();
    assert_eq!(id, 4);
    let db = api.db();
    assert_eq!(db.cats[&id]["name"], "Simba");
    assert_eq!(db.cats[&id]["weight"], "12.34");
}

#[test]
fn test_create_cat_from_json() {
    let api = CatApi::new();
    let res = api.send(
        CatApi::request(Method::POST, "/cats").with_json(json!({"name": "Nala", "weight": "9.5"})),
    );
    assert_eq!(res.status, 201);
    assert_eq!(res.body, json!({"id": 4, "name": "Nala", "weight": "9.5"}));
}

#[test]
fn test_create_cat_rejects_read_only_and_missing_fields() {
    let api = CatApi::new();
    let res = api.send(
        CatApi::request(Method::POST, "/cats").with_json(json!({"id": 10, "name": "Nala"})),
    );
    assert_eq!(res.status, 422);
    assert_eq!(res.body["error"], "Unprocessable Entity");
    let messages = &res.body["messages"]["json"];
    assert!(messages.get("id").is_some());
    assert!(messages.get("weight").is_some());
    assert_eq!(api.db().cats.len(), 3);
}

#[test]
fn test_create_cat_whisker() {
    let api = CatApi::new();
    let res = api.send(CatApi::request(Method::POST, "/cats/1/whiskers").with_form([("length", "12.34")]));
    assert_eq!(res.status, 201);
    let id = res.body["id"].as_i64().unwrap();
    let db = api.db();
    assert_eq!(db.whiskers[&id]["cat_id"], 1);
    assert_eq!(db.whiskers[&id]["length"], "12.34");
    // cat_id is stored but not part of the schema
    assert!(res.body.get("cat_id").is_none());
}

#[test]
fn test_create_cat_action_links() {
    let api = CatApi::new();
    let res = api.send(CatApi::request(Method::POST, "/cats/1/actions").with_form([("verb", "meow")]));
    assert_eq!(res.status, 201);
    assert_eq!(res.body["links"]["collection"], "http://feline.io/cats/1/actions");
    assert_eq!(res.body["links"]["self"], "http://feline.io/cats/1/actions/1");
    assert_eq!(res.body["data"]["result"], "The cat named Garfield meowed.");
    assert!(res.body["data"].get("verb").is_none());
}

#[test]
fn test_replace_cat_action() {
    let api = CatApi::new();
    let res = api.send(CatApi::request(Method::PUT, "/cats/2/actions/1").with_json(json!({"verb": "purr"})));
    assert_eq!(res.status, 200);
    assert_eq!(res.body["data"]["result"], "The cat named Leftfield purred.");
    assert_eq!(res.body["links"]["collection"], "http://feline.io/cats/2/actions");
}

#[test]
fn test_create_cat_sync_without_body() {
    let api = CatApi::new();
    let res = api.send(CatApi::request(Method::POST, "/cats/1/syncs"));
    assert_eq!(res.status, 201);
    assert_eq!(res.body["done"], false);
    let id = res.body["id"].as_str().unwrap().to_string();
    assert!(api.db().syncs.contains_key(&id));
}

#[test]
fn test_list_cats_headed() {
    let api = CatApi::new();
    let res = api.get("/cats");
    assert_eq!(res.status, 200);
    let results = res.body.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0], json!({"id": 1, "name": "Garfield", "weight": "24.67"}));

    let exposed = res
        .get_header("Access-Control-Expose-Headers")
        .unwrap()
        .to_lowercase();
    assert!(exposed.contains("link"));
    assert!(exposed.contains("x-total-count"));
    assert!(!exposed.contains("pragma"));

    let links = link_header(&res);
    assert_eq!(rel(&links, "self"), Some("http://feline.io/cats"));
    assert_eq!(rel(&links, "next"), Some("http://feline.io/cats?page=2"));
    assert_eq!(res.get_header("X-Total-Count"), Some("3"));
    assert_eq!(res.get_header("Pragma"), Some("no-cache"));

    let res = api.get("/cats?page=2");
    assert_eq!(res.status, 200);
    assert_eq!(res.body.as_array().unwrap().len(), 1);
    assert_eq!(rel(&link_header(&res), "next"), None);
}

#[test]
fn test_list_cats_rejects_bad_page() {
    let api = CatApi::new();
    let res = api.get("/cats?page=0");
    assert_eq!(res.status, 422);
    assert!(res.body["messages"]["query"].get("page").is_some());
    // unknown query keys are ignored
    assert_eq!(api.get("/cats?sort=name").status, 200);
}

#[test]
fn test_list_cat_whiskers_wrapped() {
    let api = CatApi::new();
    let res = api.get("/cats/1/whiskers");
    assert_eq!(res.status, 200);
    let data = res.body["data"].as_array().unwrap();
    assert_eq!(data.len(), 3);
    assert_eq!(data[0], json!({"id": 1, "length": "10.57"}));
    assert_eq!(res.body["links"]["self"], "http://feline.io/cats/1/whiskers");
    assert_eq!(res.body["links"]["next"], "http://feline.io/cats/1/whiskers?page=2");

    let res = api.get("/cats/1/whiskers?page=2");
    assert_eq!(res.body["data"].as_array().unwrap().len(), 1);
    assert!(res.body["links"].get("next").is_none());
}

#[test]
fn test_retrieve_cat() {
    let api = CatApi::new();
    let res = api.get("/cats/1");
    assert_eq!(res.status, 200);
    assert_eq!(res.body, json!({"id": 1, "name": "Garfield", "weight": "24.67"}));
}

#[test]
fn test_retrieve_missing_cat_uses_error_handler() {
    let api = CatApi::new();
    let res = api.get("/cats/99");
    assert_eq!(res.status, 404);
    assert_eq!(res.body, json!({"msg": "Cat not found."}));
}

#[test]
fn test_non_integer_cat_id_is_not_found() {
    let api = CatApi::new();
    assert_eq!(api.get("/cats/garfield").status, 404);
}

#[test]
fn test_retrieve_cat_whisker() {
    let api = CatApi::new();
    let res = api.get("/cats/1/whiskers/1");
    assert_eq!(res.status, 200);
    assert_eq!(res.body, json!({"id": 1, "length": "10.57"}));
    assert_eq!(api.get("/cats/2/whiskers/1").status, 404);
}

#[test]
fn test_retrieve_cat_sync_through_group_url() {
    let api = CatApi::new();
    let sync_id = "URQpbCZ28urcWnEEeCOh3JAbol0XlAax";
    let res = api.get(&format!("/cats/1/syncs/{sync_id}"));
    assert_eq!(res.status, 200);
    assert_eq!(res.body["data"], json!({"id": sync_id, "done": true}));
    assert_eq!(
        res.body["links"]["self"],
        Value::String(format!("http://feline.io/cats/1/syncs/{sync_id}"))
    );
    assert_eq!(res.body["links"]["collection"], "http://feline.io/cats/1/syncs");
}

#[test]
fn test_cat_syncs_are_not_listable() {
    let api = CatApi::new();
    let res = api.get("/cats/1/syncs");
    assert_eq!(res.status, 405);
    assert_eq!(res.get_header("Allow"), Some("POST"));
}

#[test]
fn test_update_cat_partial_then_replace_requires_all_fields() {
    let api = CatApi::new();
    let name = "Garfield aka The Fat Cat";
    let res = api.send(CatApi::request(Method::PATCH, "/cats/1").with_form([("name", name)]));
    assert_eq!(res.status, 200);
    assert_eq!(res.body["name"], name);
    assert_eq!(res.body["weight"], "24.67");
    assert_eq!(api.db().cats[&1]["name"], name);

    let res = api.send(CatApi::request(Method::PUT, "/cats/1").with_form([("name", name)]));
    assert_eq!(res.status, 422);
    assert!(res.body["messages"]["form"].get("weight").is_some());
}

#[test]
fn test_replace_cat_whisker() {
    let api = CatApi::new();
    let res = api.send(CatApi::request(Method::PUT, "/cats/1/whiskers/1").with_form([("length", "9.99")]));
    assert_eq!(res.status, 200);
    assert_eq!(res.body["length"], "9.99");
    assert_eq!(api.db().whiskers[&1]["length"], "9.99");
}

#[test]
fn test_delete_cat_cascades_to_whiskers() {
    let api = CatApi::new();
    let res = api.send(CatApi::request(Method::DELETE, "/cats/1"));
    assert_eq!(res.status, 204);
    assert!(!res.has_body());
    let db = api.db();
    assert!(!db.cats.contains_key(&1));
    assert!(db.whiskers.values().all(|w| w["cat_id"] != 1));
}

#[test]
fn test_delete_cat_whisker() {
    let api = CatApi::new();
    let res = api.send(CatApi::request(Method::DELETE, "/cats/1/whiskers/1"));
    assert_eq!(res.status, 204);
    assert!(!api.db().whiskers.contains_key(&1));
}

#[test]
fn test_missing_or_wrong_tokens_are_unauthorized() {
    let api = CatApi::new();
    let anonymous = HandlerRequest::new(Method::GET, "/cats").with_header("host", "feline.io");
    assert_eq!(api.send(anonymous).status, 401);

    let forged = HandlerRequest::new(Method::GET, "/cats")
        .with_header("authorization", format!("Bearer {}", forged_token()));
    assert_eq!(api.send(forged).status, 401);

    let refresh = HandlerRequest::new(Method::GET, "/cats")
        .with_header("authorization", format!("Bearer {}", refresh_token()));
    assert_eq!(api.send(refresh).status, 401);

    let expired = HandlerRequest::new(Method::GET, "/cats")
        .with_header("authorization", format!("Bearer {}", expired_token()));
    assert_eq!(api.send(expired).status, 401);
}

#[test]
fn test_unauthorized_request_never_reaches_body_parsing() {
    let api = CatApi::new();
    let req = HandlerRequest::new(Method::POST, "/cats").with_json(json!({"bogus": true}));
    assert_eq!(api.send(req).status, 401);
}

#[test]
fn test_spec_document_is_public() {
    let api = CatApi::new();
    let res = api.send(HandlerRequest::new(Method::GET, "/spec"));
    assert_eq!(res.status, 200);
    assert_eq!(res.body["info"]["title"], "Cat API");
    let list_cats = &res.body["paths"]["/cats"]["get"];
    assert_eq!(list_cats["security"], json!([{"jwt_access_token": []}]));
    assert_eq!(list_cats["parameters"][0]["name"], "page");
    assert_eq!(list_cats["parameters"][0]["in"], "query");
    assert!(res.body["paths"]["/cats/{cat_id}/syncs"].get("get").is_none());
}

#[test]
fn test_every_response_carries_request_id() {
    let api = CatApi::new();
    assert!(api.get("/cats/1").get_header("X-Request-Id").is_some());
    assert!(api.get("/dogs").get_header("X-Request-Id").is_some());
}
