//! Cat API resources over an in-memory store.
//!
//! Also compiled into the integration tests, so everything here is reachable without
//! a running server.

#![allow(dead_code)]

use crudrouter::capability::{Capability, CapabilitySet};
use crudrouter::config::ApiConfig;
use crudrouter::envelope::{Envelope, Reply};
use crudrouter::error::HttpError;
use crudrouter::registry::{Api, ResourceGroup};
use crudrouter::resource::{BoundIds, OperationConfig, RequestContext, Resource};
use crudrouter::schema::{Fields, Schema};
use crudrouter::security::BearerJwtProvider;
use crudrouter::spec::JWT_ACCESS_TOKEN;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const CAT_PAGE_SIZE: usize = 2;
pub const WHISKER_PAGE_SIZE: usize = 3;

#[derive(Debug, Default)]
pub struct Db {
    pub cats: BTreeMap<i64, Value>,
    pub whiskers: BTreeMap<i64, Value>,
    pub syncs: BTreeMap<String, Value>,
}

impl Db {
    /// Three cats, four whiskers on Garfield and one finished sync.
    pub fn seeded() -> Self {
        let mut db = Db::default();
        for (id, name, weight) in [
            (1, "Garfield", "24.67"),
            (2, "Leftfield", "23.28"),
            (3, "Rightfield", "22.73"),
        ] {
            db.cats.insert(id, json!({"id": id, "name": name, "weight": weight}));
        }
        for (id, length) in [(1, "10.57"), (2, "11.03"), (3, "9.95"), (4, "10.34")] {
            db.whiskers
                .insert(id, json!({"id": id, "cat_id": 1, "length": length}));
        }
        let sync_id = "URQpbCZ28urcWnEEeCOh3JAbol0XlAax";
        db.syncs
            .insert(sync_id.to_string(), json!({"id": sync_id, "done": true}));
        db
    }

    fn require_cat(&self, cat_id: i64) -> Result<&Value, HttpError> {
        self.cats
            .get(&cat_id)
            .ok_or_else(|| HttpError::not_found("Cat not found."))
    }

    fn require_whisker(&self, cat_id: i64, whisker_id: i64) -> Result<&Value, HttpError> {
        self.require_cat(cat_id)?;
        self.whiskers
            .get(&whisker_id)
            .filter(|w| w["cat_id"] == cat_id)
            .ok_or_else(|| HttpError::not_found("Whisker not found."))
    }
}

pub type SharedDb = Arc<Mutex<Db>>;

fn lock(db: &SharedDb) -> MutexGuard<'_, Db> {
    db.lock().unwrap_or_else(PoisonError::into_inner)
}

fn next_id(map: &BTreeMap<i64, Value>) -> i64 {
    map.keys().next_back().copied().unwrap_or(0) + 1
}

/// `{**record, **fields}`
fn merge(record: &Value, fields: Fields) -> Value {
    let mut merged = record.as_object().cloned().unwrap_or_default();
    merged.extend(fields);
    Value::Object(merged)
}

fn page_of(values: Vec<Value>, page: usize, size: usize) -> (Vec<Value>, bool) {
    let start = page.saturating_sub(1) * size;
    let has_next = values.len() > page * size;
    (values.into_iter().skip(start).take(size).collect(), has_next)
}

fn page_arg(query: &Fields) -> usize {
    query
        .get("page")
        .and_then(Value::as_u64)
        .map(|p| p as usize)
        .unwrap_or(1)
}

fn page_query() -> anyhow::Result<Schema> {
    Ok(Schema::new(
        "Page",
        json!({
            "type": "object",
            "properties": {"page": {"type": "integer", "minimum": 1, "default": 1}}
        }),
    )?)
}

fn cat_id(ids: &BoundIds) -> anyhow::Result<i64> {
    ids.get_i64("cat_id")
        .ok_or_else(|| anyhow::anyhow!("cat_id is not bound"))
}

pub fn cat_schema() -> anyhow::Result<Schema> {
    Ok(Schema::new(
        "Cat",
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "integer", "readOnly": true},
                "name": {"type": "string", "minLength": 1},
                "weight": {"type": "string", "format": "decimal", "pattern": "^[0-9]+(\\.[0-9]+)?$"}
            },
            "required": ["name", "weight"]
        }),
    )?)
}

pub fn whisker_schema() -> anyhow::Result<Schema> {
    Ok(Schema::new(
        "CatWhisker",
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "integer", "readOnly": true},
                "length": {"type": "string", "format": "decimal", "pattern": "^[0-9]+(\\.[0-9]+)?$"}
            },
            "required": ["length"]
        }),
    )?)
}

pub fn action_schema() -> anyhow::Result<Schema> {
    Ok(Schema::new(
        "CatAction",
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "integer", "readOnly": true},
                "verb": {"type": "string", "writeOnly": true},
                "result": {"type": "string", "readOnly": true}
            },
            "required": ["verb"]
        }),
    )?)
}

pub fn sync_schema() -> anyhow::Result<Schema> {
    Ok(Schema::new(
        "CatSync",
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "string", "readOnly": true},
                "done": {"type": "boolean", "readOnly": true}
            }
        }),
    )?)
}

pub struct Cats {
    db: SharedDb,
    page: Schema,
}

impl Resource for Cats {
    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::CRUD
    }

    fn operation(&self, capability: Capability) -> OperationConfig {
        match capability {
            Capability::List => OperationConfig::new()
                .query(self.page.clone())
                .description("List cats, two per page."),
            _ => OperationConfig::new(),
        }
    }

    fn create(&self, _ctx: &RequestContext<'_>, _parents: &BoundIds, fields: Fields) -> anyhow::Result<Reply> {
        let mut db = lock(&self.db);
        let id = next_id(&db.cats);
        let cat = merge(&json!({"id": id}), fields);
        db.cats.insert(id, cat.clone());
        Ok(cat.into())
    }

    fn list(&self, ctx: &RequestContext<'_>, _parents: &BoundIds, query: &Fields) -> anyhow::Result<Reply> {
        let db = lock(&self.db);
        let values: Vec<Value> = db.cats.values().cloned().collect();
        let total = values.len();
        let page = page_arg(query);
        let (items, has_next) = page_of(values, page, CAT_PAGE_SIZE);

        let mut envelope = Envelope::headed(items)
            .header("X-Total-Count", total)
            .header("Pragma", "no-cache");
        if has_next {
            envelope = envelope.link("next", ctx.url_for("Cat", &[("page", json!(page + 1))])?);
        }
        Ok(envelope.into())
    }

    fn retrieve(&self, _ctx: &RequestContext<'_>, ids: &BoundIds) -> anyhow::Result<Reply> {
        let db = lock(&self.db);
        Ok(db.require_cat(cat_id(ids)?)?.clone().into())
    }

    fn update(&self, _ctx: &RequestContext<'_>, ids: &BoundIds, fields: Fields) -> anyhow::Result<Reply> {
        let id = cat_id(ids)?;
        let mut db = lock(&self.db);
        let updated = merge(db.require_cat(id)?, fields);
        db.cats.insert(id, updated.clone());
        Ok(updated.into())
    }

    fn delete(&self, _ctx: &RequestContext<'_>, ids: &BoundIds) -> anyhow::Result<()> {
        let id = cat_id(ids)?;
        let mut db = lock(&self.db);
        db.require_cat(id)?;
        db.cats.remove(&id);
        db.whiskers.retain(|_, w| w["cat_id"] != id);
        Ok(())
    }
}

pub struct CatWhiskers {
    db: SharedDb,
    page: Schema,
}

impl CatWhiskers {
    fn whisker_id(ids: &BoundIds) -> anyhow::Result<i64> {
        ids.get_i64("cat_whisker_id")
            .ok_or_else(|| anyhow::anyhow!("cat_whisker_id is not bound"))
    }
}

impl Resource for CatWhiskers {
    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::CRUD
    }

    fn operation(&self, capability: Capability) -> OperationConfig {
        match capability {
            Capability::List => OperationConfig::new().query(self.page.clone()),
            _ => OperationConfig::new(),
        }
    }

    fn create(&self, _ctx: &RequestContext<'_>, parents: &BoundIds, fields: Fields) -> anyhow::Result<Reply> {
        let cat_id = cat_id(parents)?;
        let mut db = lock(&self.db);
        db.require_cat(cat_id)?;
        let id = next_id(&db.whiskers);
        let whisker = merge(&json!({"id": id, "cat_id": cat_id}), fields);
        db.whiskers.insert(id, whisker.clone());
        Ok(whisker.into())
    }

    fn list(&self, ctx: &RequestContext<'_>, parents: &BoundIds, query: &Fields) -> anyhow::Result<Reply> {
        let cat_id = cat_id(parents)?;
        let db = lock(&self.db);
        db.require_cat(cat_id)?;
        let values: Vec<Value> = db
            .whiskers
            .values()
            .filter(|w| w["cat_id"] == cat_id)
            .cloned()
            .collect();
        let page = page_arg(query);
        let (items, has_next) = page_of(values, page, WHISKER_PAGE_SIZE);

        let mut envelope = Envelope::wrapped(items);
        if has_next {
            let next = ctx.url_for(
                "CatWhisker",
                &[("cat_id", json!(cat_id)), ("page", json!(page + 1))],
            )?;
            envelope = envelope.link("next", next);
        }
        Ok(envelope.into())
    }

    fn retrieve(&self, _ctx: &RequestContext<'_>, ids: &BoundIds) -> anyhow::Result<Reply> {
        let db = lock(&self.db);
        Ok(db
            .require_whisker(cat_id(ids)?, Self::whisker_id(ids)?)?
            .clone()
            .into())
    }

    fn update(&self, _ctx: &RequestContext<'_>, ids: &BoundIds, fields: Fields) -> anyhow::Result<Reply> {
        let whisker_id = Self::whisker_id(ids)?;
        let mut db = lock(&self.db);
        let updated = merge(db.require_whisker(cat_id(ids)?, whisker_id)?, fields);
        db.whiskers.insert(whisker_id, updated.clone());
        Ok(updated.into())
    }

    fn delete(&self, _ctx: &RequestContext<'_>, ids: &BoundIds) -> anyhow::Result<()> {
        let whisker_id = Self::whisker_id(ids)?;
        let mut db = lock(&self.db);
        db.require_whisker(cat_id(ids)?, whisker_id)?;
        db.whiskers.remove(&whisker_id);
        Ok(())
    }
}

/// Actions are not stored; every action answers as action 1.
pub struct CatActions {
    db: SharedDb,
}

impl CatActions {
    fn perform(&self, ctx: &RequestContext<'_>, cat_id: i64, fields: &Fields) -> anyhow::Result<Reply> {
        let db = lock(&self.db);
        let name = db.require_cat(cat_id)?["name"].as_str().unwrap_or_default().to_string();
        let verb = fields.get("verb").and_then(Value::as_str).unwrap_or_default();
        let url = ctx.url_for(
            "CatAction",
            &[("cat_id", json!(cat_id)), ("cat_action_id", json!(1))],
        )?;
        Ok(Envelope::wrapped(json!({
            "id": 1,
            "result": format!("The cat named {name} {verb}ed."),
        }))
        .link("self", url)
        .into())
    }
}

impl Resource for CatActions {
    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::of(&[Capability::Create, Capability::Replace, Capability::Update])
    }

    fn create(&self, ctx: &RequestContext<'_>, parents: &BoundIds, fields: Fields) -> anyhow::Result<Reply> {
        self.perform(ctx, cat_id(parents)?, &fields)
    }

    fn update(&self, ctx: &RequestContext<'_>, ids: &BoundIds, fields: Fields) -> anyhow::Result<Reply> {
        self.perform(ctx, cat_id(ids)?, &fields)
    }
}

/// Syncs have string ids and can be fetched but not listed.
pub struct CatSyncs {
    db: SharedDb,
    group: ResourceGroup,
}

impl Resource for CatSyncs {
    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::NON_LISTABLE_RETRIEVE.with(Capability::Create)
    }

    fn create(&self, _ctx: &RequestContext<'_>, parents: &BoundIds, _fields: Fields) -> anyhow::Result<Reply> {
        let mut db = lock(&self.db);
        db.require_cat(cat_id(parents)?)?;
        let id = ulid::Ulid::new().to_string();
        let sync = json!({"id": id, "done": false});
        db.syncs.insert(id, sync.clone());
        Ok(sync.into())
    }

    fn retrieve(&self, ctx: &RequestContext<'_>, ids: &BoundIds) -> anyhow::Result<Reply> {
        let cat_id = cat_id(ids)?;
        let sync_id = ids
            .get_str("cat_sync_id")
            .ok_or_else(|| anyhow::anyhow!("cat_sync_id is not bound"))?;
        let db = lock(&self.db);
        db.require_cat(cat_id)?;
        let sync = db
            .syncs
            .get(sync_id)
            .cloned()
            .ok_or_else(|| HttpError::not_found("Cat sync not found."))?;
        let url = self.group.url_for(
            ctx.base_url,
            "CatSync",
            &[("cat_id", json!(cat_id)), ("cat_sync_id", json!(sync_id))],
        )?;
        Ok(Envelope::wrapped(sync).link("self", url).into())
    }
}

/// Every operation requires an access token unless the config names another default.
pub fn build_api(config: ApiConfig, jwt_secret: &str, db: SharedDb) -> anyhow::Result<Api> {
    let config = if config.default_security_scheme.is_none() {
        config.default_security_scheme(JWT_ACCESS_TOKEN)
    } else {
        config
    };
    let mut api = Api::new(config)?;
    api.security_provider(
        JWT_ACCESS_TOKEN,
        Arc::new(BearerJwtProvider::new(jwt_secret).token_type("access")),
    )?;

    api.resource(
        "/cats/<int:cat_id>",
        "Cat",
        cat_schema()?,
        Cats {
            db: Arc::clone(&db),
            page: page_query()?,
        },
    )?;
    api.resource(
        "/cats/<int:cat_id>/whiskers/<int:cat_whisker_id>",
        "CatWhisker",
        whisker_schema()?,
        CatWhiskers {
            db: Arc::clone(&db),
            page: page_query()?,
        },
    )?;
    api.resource(
        "/cats/<int:cat_id>/actions/<int:cat_action_id>",
        "CatAction",
        action_schema()?,
        CatActions { db: Arc::clone(&db) },
    )?;

    // syncs are declared on a group nested in another group before the Api sees them
    let sync_group = ResourceGroup::new();
    sync_group.resource(
        "/cats/<int:cat_id>/syncs/<cat_sync_id>",
        "CatSync",
        sync_schema()?,
        CatSyncs {
            db,
            group: sync_group.clone(),
        },
    )?;
    let extra_group = ResourceGroup::new();
    extra_group.add_group(&sync_group)?;
    api.add_group(&extra_group)?;
    Ok(api)
}
