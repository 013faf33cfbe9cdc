//! Integration tests for the CRUD services.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use docrud_core::proto::{
    Conditions, Document, FindOptions, FindRequest, ObjectId, PopulateSpec, Value,
};
use docrud_core::{
    ConditionCaster, CrudService, DocumentStore, EntityDescriptor, EntityRegistry, Error,
    FieldDef, FieldType, FindParams, MemoryStore, PopulatePlanner, QueryConfig, QueryExecutor,
    RelationDef, RequestContext, ResponseHeaders, ScalarType, ScopeAuthorizer, ScopeRule,
    SledStore, StoreConfig, EXPOSE_HEADERS, TOTAL_COUNT_HEADER,
};
use serde_json::json;

/// Store wrapper counting every call that reaches the backend.
struct CountingStore {
    inner: MemoryStore,
    calls: AtomicUsize,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for CountingStore {
    async fn find(
        &self,
        collection: &str,
        conditions: &Conditions,
        params: &FindParams,
    ) -> Result<Vec<Document>, Error> {
        self.hit();
        self.inner.find(collection, conditions, params).await
    }

    async fn count_documents(
        &self,
        collection: &str,
        conditions: &Conditions,
    ) -> Result<u64, Error> {
        self.hit();
        self.inner.count_documents(collection, conditions).await
    }

    async fn insert(&self, collection: &str, doc: Document) -> Result<Document, Error> {
        self.hit();
        self.inner.insert(collection, doc).await
    }

    async fn find_by_id(&self, collection: &str, id: ObjectId) -> Result<Option<Document>, Error> {
        self.hit();
        self.inner.find_by_id(collection, id).await
    }

    async fn replace_by_id(
        &self,
        collection: &str,
        id: ObjectId,
        doc: Document,
    ) -> Result<Option<Document>, Error> {
        self.hit();
        self.inner.replace_by_id(collection, id, doc).await
    }

    async fn remove_by_id(&self, collection: &str, id: ObjectId) -> Result<Option<Document>, Error> {
        self.hit();
        self.inner.remove_by_id(collection, id).await
    }
}

struct Shop {
    orders: CrudService,
    customers: CrudService,
    addresses: CrudService,
    tags: CrudService,
    reviews: CrudService,
}

fn shop(store: Arc<dyn DocumentStore>) -> Shop {
    let executor = Arc::new(QueryExecutor::new(
        store,
        EntityRegistry::shared(),
        QueryConfig::default(),
    ));

    let addresses = CrudService::builder(
        EntityDescriptor::new("Address")
            .with_field(FieldDef::new("city", FieldType::scalar(ScalarType::String))),
    )
    .build(executor.clone());

    let customers = CrudService::builder(
        EntityDescriptor::new("Customer")
            .with_field(FieldDef::required("name", FieldType::scalar(ScalarType::String)))
            .with_field(FieldDef::new("age", FieldType::scalar(ScalarType::Number)))
            .with_field(FieldDef::new("tenant", FieldType::scalar(ScalarType::String)))
            .with_field(FieldDef::new("address", FieldType::reference("Address")))
            .with_relation(RelationDef::virtual_many("orders", "Order", "customer")),
    )
    .with_authorizer(Arc::new(
        ScopeAuthorizer::new()
            .with_rule(ScopeRule::attribute_eq("tenant", "tenant"))
            .with_bypass_role("admin"),
    ))
    .build(executor.clone());

    let tags = CrudService::builder(
        EntityDescriptor::new("Tag")
            .with_field(FieldDef::new("label", FieldType::scalar(ScalarType::String))),
    )
    .build(executor.clone());

    let reviews = CrudService::builder(
        EntityDescriptor::new("Review")
            .with_field(FieldDef::new("stars", FieldType::scalar(ScalarType::Number)))
            .with_field(FieldDef::new("order", FieldType::reference("Order"))),
    )
    .build(executor.clone());

    let orders = CrudService::builder(
        EntityDescriptor::new("Order")
            .with_field(FieldDef::new("total", FieldType::scalar(ScalarType::Number)))
            .with_field(FieldDef::new("placed", FieldType::scalar(ScalarType::Date)))
            .with_field(FieldDef::new("customer", FieldType::reference("Customer")))
            .with_field(FieldDef::new("tags", FieldType::reference_array("Tag")))
            .with_relation(RelationDef::virtual_many("reviews", "Review", "order")),
    )
    .build(executor);

    Shop {
        orders,
        customers,
        addresses,
        tags,
        reviews,
    }
}

fn doc(json: serde_json::Value) -> Document {
    Document::from_json(json).unwrap()
}

fn id_of(doc: &Document) -> String {
    doc.object_id().unwrap().to_hex()
}

/// One customer with an address and one order with a tag and a review.
async fn seed(shop: &Shop, tenant: &str) -> (String, String) {
    let address = shop
        .addresses
        .create(doc(json!({"city": "Oslo"})), None)
        .await
        .unwrap();
    let customer = shop
        .customers
        .create(
            doc(json!({"name": "Ada", "age": 36, "tenant": tenant, "address": id_of(&address)})),
            None,
        )
        .await
        .unwrap();
    let tag = shop
        .tags
        .create(doc(json!({"label": "gift"})), None)
        .await
        .unwrap();
    let order = shop
        .orders
        .create(
            doc(json!({
                "total": "99.5",
                "placed": "2024-03-01T10:00:00Z",
                "customer": id_of(&customer),
                "tags": [id_of(&tag)]
            })),
            None,
        )
        .await
        .unwrap();
    shop.reviews
        .create(doc(json!({"stars": 5, "order": id_of(&order)})), None)
        .await
        .unwrap();
    (id_of(&customer), id_of(&order))
}

#[tokio::test]
async fn test_populate_nested_path_leaves_other_relations_raw() {
    let shop = shop(Arc::new(MemoryStore::new()));
    let (_, order_id) = seed(&shop, "t1").await;

    let order = shop
        .orders
        .get(&order_id, &PopulateSpec::paths(["customer.address"]), None)
        .await
        .unwrap()
        .unwrap();

    let customer = order.get("customer").and_then(Value::as_document).unwrap();
    assert_eq!(customer.get("name"), Some(&Value::from("Ada")));
    let address = customer.get("address").and_then(Value::as_document).unwrap();
    assert_eq!(address.get("city"), Some(&Value::from("Oslo")));

    let tags = order.get("tags").and_then(Value::as_array).unwrap();
    assert!(tags[0].as_object_id().is_some());
    assert!(!order.contains_key("reviews"));
    assert_eq!(order.get("total"), Some(&Value::Float(99.5)));
    assert!(order.get("placed").and_then(Value::as_date).is_some());
}

#[tokio::test]
async fn test_default_populate_resolves_declared_relations() {
    let shop = shop(Arc::new(MemoryStore::new()));
    let (customer_id, order_id) = seed(&shop, "t1").await;

    let order = shop
        .orders
        .get(&order_id, &PopulateSpec::All, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.get_path("customer.name"), Some(&Value::from("Ada")));
    assert!(order.get_path("customer.address").and_then(Value::as_object_id).is_some());
    assert_eq!(order.get_path("tags.0.label"), Some(&Value::from("gift")));
    assert_eq!(order.get_path("reviews.0.stars"), Some(&Value::Int(5)));

    let customer = shop
        .customers
        .get(&customer_id, &PopulateSpec::paths(["orders.reviews"]), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(customer.get_path("orders.0.reviews.0.stars"), Some(&Value::Int(5)));
}

#[tokio::test]
async fn test_patch_preserves_unspecified_fields() {
    let shop = shop(Arc::new(MemoryStore::new()));
    let (customer_id, _) = seed(&shop, "t1").await;

    let patched = shop
        .customers
        .patch(doc(json!({"_id": customer_id, "name": "Bob", "age": null})), None)
        .await
        .unwrap();
    assert_eq!(patched.get("name"), Some(&Value::from("Bob")));
    assert_eq!(patched.get("age"), Some(&Value::Int(36)));

    let stored = shop
        .customers
        .get(&customer_id, &PopulateSpec::Skip, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.get("age"), Some(&Value::Int(36)));
    assert!(stored.get("address").and_then(Value::as_object_id).is_some());
}

#[tokio::test]
async fn test_invalid_id_never_reaches_store() {
    let store = Arc::new(CountingStore::new());
    let shop = shop(store.clone());

    assert!(shop.orders.delete("not-an-id-format", None).await.unwrap().is_none());
    assert!(shop
        .orders
        .get("not-an-id-format", &PopulateSpec::All, None)
        .await
        .unwrap()
        .is_none());
    assert_eq!(store.calls(), 0);

    let missing = ObjectId::new().to_hex();
    let result = shop
        .orders
        .patch(doc(json!({"_id": missing, "total": 1})), None)
        .await;
    assert!(result.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_paginated_find_reports_total_count() {
    let shop = shop(Arc::new(MemoryStore::new()));
    for (i, tenant) in ["a", "a", "b", "a", "a"].iter().enumerate() {
        shop.customers
            .create(
                doc(json!({"name": format!("c{}", i), "age": i, "tenant": tenant})),
                None,
            )
            .await
            .unwrap();
    }

    let headers = ResponseHeaders::new();
    headers.set(EXPOSE_HEADERS, "ETag");
    let ctx = RequestContext::new("alice")
        .with_attribute("tenant", "a")
        .with_headers(headers.clone());
    let request = FindRequest::new().with_options(
        FindOptions::new()
            .with_sort("-age")
            .with_skip(1)
            .with_limit(2),
    );

    let page = shop
        .customers
        .find(Conditions::always(), request, Some(&ctx))
        .await
        .unwrap();
    let names: Vec<&str> = page
        .iter()
        .map(|d| d.get("name").and_then(Value::as_str).unwrap())
        .collect();
    assert_eq!(names, vec!["c3", "c1"]);
    assert_eq!(headers.get(TOTAL_COUNT_HEADER).as_deref(), Some("4"));
    assert_eq!(
        headers.get(EXPOSE_HEADERS).as_deref(),
        Some("X-total-count, ETag")
    );
}

#[tokio::test]
async fn test_nested_relation_is_scoped_by_target_authorizer() {
    let shop = shop(Arc::new(MemoryStore::new()));
    let (_, order_id) = seed(&shop, "t1").await;
    let populate = PopulateSpec::paths(["customer"]);

    let insider = RequestContext::new("u1").with_attribute("tenant", "t1");
    let order = shop
        .orders
        .get(&order_id, &populate, Some(&insider))
        .await
        .unwrap()
        .unwrap();
    assert!(order.get("customer").and_then(Value::as_document).is_some());

    let outsider = RequestContext::new("u2").with_attribute("tenant", "t2");
    let order = shop
        .orders
        .get(&order_id, &populate, Some(&outsider))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.get("customer"), Some(&Value::Null));

    let admin = RequestContext::new("root").with_role("admin");
    let order = shop
        .orders
        .get(&order_id, &populate, Some(&admin))
        .await
        .unwrap()
        .unwrap();
    assert!(order.get("customer").and_then(Value::as_document).is_some());

    let anonymous = RequestContext::anonymous();
    let result = shop.orders.get(&order_id, &populate, Some(&anonymous)).await;
    assert!(matches!(result, Err(Error::Forbidden(_))));
}

#[tokio::test]
async fn test_find_without_context_matches_open_authorization() {
    let shop = shop(Arc::new(MemoryStore::new()));
    seed(&shop, "t1").await;
    seed(&shop, "t2").await;

    let conditions = Conditions::op("total", "$gte", "50");
    let without = shop
        .orders
        .find(conditions.clone(), FindRequest::new(), None)
        .await
        .unwrap();
    let open = RequestContext::anonymous();
    let with = shop
        .orders
        .find(conditions, FindRequest::new().with_populate(PopulateSpec::Skip), Some(&open))
        .await
        .unwrap();

    assert_eq!(without.len(), 2);
    let ids = |docs: &[Document]| docs.iter().map(|d| d.object_id()).collect::<Vec<_>>();
    assert_eq!(ids(without.as_slice()), ids(with.as_slice()));
}

#[tokio::test]
async fn test_cast_is_idempotent() {
    let shop = shop(Arc::new(MemoryStore::new()));
    let registry = shop.orders.executor().registry();
    let caster = ConditionCaster::new(registry, "Order");

    let raw = Conditions::from_json(json!({
        "total": {"$gte": "10", "$in": ["1", "2.5", "x"]},
        "placed": {"$lt": "2024-01-01"},
        "customer.name": "Ada",
        "customer.age": {"$not": {"$gt": "30"}},
        "tags": ObjectId::new().to_hex(),
        "$or": [{"_id": "5f2b1c9e8d3a4b0012345678"}, {"total": "abc"}]
    }))
    .unwrap();

    let once = caster.cast(raw);
    let twice = caster.cast(once.clone());
    assert_eq!(once, twice);
    assert_eq!(once.as_document().get_path("total.$gte"), Some(&Value::Int(10)));
    let age = once
        .as_document()
        .get("customer.age")
        .and_then(Value::as_document)
        .unwrap();
    assert_eq!(age.get_path("$not.$gt"), Some(&Value::Int(30)));
    assert_eq!(
        once.as_document().get("total").and_then(Value::as_document).unwrap().get("$in"),
        Some(&Value::Array(vec![
            Value::Int(1),
            Value::Float(2.5),
            Value::from("x")
        ]))
    );
}

#[tokio::test]
async fn test_planner_merges_overlapping_paths() {
    let shop = shop(Arc::new(MemoryStore::new()));
    let executor = shop.orders.executor();
    let planner = PopulatePlanner::new(executor.registry(), executor.config());

    let paths: Vec<String> = ["customer.address", "customer", "tags", "customer.orders.reviews"]
        .iter()
        .map(|p| p.to_string())
        .collect();
    let selectors: Vec<String> = ["customer.name", "customer.address.city", "total"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let nodes = planner.plan("Order", &paths, &selectors, None).await.unwrap();

    let names: Vec<&str> = nodes.iter().map(|n| n.name()).collect();
    assert_eq!(names, vec!["customer", "tags"]);
    let customer = &nodes[0];
    assert_eq!(customer.select, vec!["name"]);
    let children: Vec<&str> = customer.children.iter().map(|n| n.name()).collect();
    assert_eq!(children, vec!["address", "orders"]);
    assert_eq!(customer.child("address").unwrap().select, vec!["city"]);
    assert_eq!(
        customer.child("orders").unwrap().child("reviews").unwrap().path,
        "customer.orders.reviews"
    );
    assert!(nodes[1].select.is_empty());
}

#[tokio::test]
async fn test_sled_backed_service() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SledStore::open(StoreConfig::new(dir.path())).unwrap());
    let shop = shop(store.clone());
    let (customer_id, order_id) = seed(&shop, "t1").await;

    let order = shop
        .orders
        .get(&order_id, &PopulateSpec::paths(["customer"]), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        order.get_path("customer._id").and_then(Value::as_object_id).map(|id| id.to_hex()),
        Some(customer_id.clone())
    );

    let removed = shop
        .orders
        .find_and_delete(Conditions::eq("customer", customer_id.as_str()), None)
        .await
        .unwrap();
    assert_eq!(removed.len(), 1);
    assert_eq!(
        shop.orders
            .count_documents(Conditions::always(), Conditions::always(), None)
            .await
            .unwrap(),
        0
    );
    store.flush().unwrap();
}

#[tokio::test]
async fn test_populate_loaded_documents() {
    let shop = shop(Arc::new(MemoryStore::new()));
    seed(&shop, "t1").await;

    let raw = shop
        .orders
        .find(
            Conditions::always(),
            FindRequest::new().with_populate(PopulateSpec::Skip),
            None,
        )
        .await
        .unwrap();
    assert!(raw[0].get("customer").and_then(Value::as_object_id).is_some());

    let populated = shop
        .orders
        .populate_list(raw, &PopulateSpec::paths(["customer"]), &["customer.name".to_string()], None)
        .await
        .unwrap();
    let customer = populated[0].get("customer").and_then(Value::as_document).unwrap();
    assert_eq!(customer.keys().collect::<Vec<_>>(), vec!["_id", "name"]);
}
