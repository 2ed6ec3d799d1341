use micro_apictx::{BindQuery, QuerySchema};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    group: TestGroup,
    query: &'static str,
    body: &'static str,
}

impl TestCase {
    pub fn new(name: &'static str, group: TestGroup, query: &'static str, body: &'static str) -> Self {
        Self { name, group, query, body }
    }

    pub fn small(name: &'static str, query: &'static str, body: &'static str) -> Self {
        Self::new(name, TestGroup::Small, query, body)
    }

    pub fn large(name: &'static str, query: &'static str, body: &'static str) -> Self {
        Self::new(name, TestGroup::Large, query, body)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    pub fn query(&self) -> &'static str {
        self.query
    }

    pub fn body(&self) -> &'static str {
        self.body
    }

    /// `path?query`, the request target of this case.
    pub fn uri(&self) -> String {
        format!("/orders?{}", self.query)
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TestGroup {
    Small,
    Large,
}

/// Bind target shared by the benchmarks.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Order {
    #[validate(required)]
    pub sku: Option<String>,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: u32,
    pub page: i64,
    pub express: bool,
    pub note: String,
    pub tags: Vec<String>,
}

impl BindQuery for Order {
    fn query_schema(schema: QuerySchema<Self>) -> QuerySchema<Self> {
        schema
            .field("sku", |o: &mut Order, v: Option<String>| o.sku = v)
            .field("qty", |o: &mut Order, v: u32| o.quantity = v)
            .field("page", |o: &mut Order, v: i64| o.page = v)
            .field("express", |o: &mut Order, v: bool| o.express = v)
    }
}

pub fn create_test_cases() -> Vec<TestCase> {
    vec![
        TestCase::small("query_only", "sku=A-100&qty=3&page=1&express=true", ""),
        TestCase::small("json_only", "", r#"{"sku":"A-100","quantity":3}"#),
        TestCase::large(
            "query_and_json",
            "sku=A-100&qty=3&page=12&express=0&utm_source=newsletter&utm_campaign=spring&ref=home",
            r#"{"note":"leave at the door, ring twice","tags":["gift","fragile","priority","weekend"],"quantity":25}"#,
        ),
    ]
}
