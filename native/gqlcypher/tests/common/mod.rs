//! Shared fixtures for the integration tests
#![allow(dead_code)]

use gqlcypher::{Config, Context, Schema};
use serde_json::Value;

/// A small movie database with every feature the translators touch
pub const SCHEMA_JSON: &str = r#"{
    "nodes": [
        {
            "name": "Movie",
            "primitiveFields": [
                { "name": "id", "type": "ID", "autogenerate": true },
                { "name": "title" },
                { "name": "released", "type": "Int" }
            ],
            "relationFields": [
                {
                    "name": "actors",
                    "type": "ACTED_IN",
                    "direction": "IN",
                    "target": { "node": "Actor" },
                    "array": true,
                    "properties": "ActedIn"
                },
                {
                    "name": "genres",
                    "type": "IN_GENRE",
                    "direction": "OUT",
                    "target": { "node": "Genre" },
                    "array": true
                }
            ]
        },
        {
            "name": "Actor",
            "primitiveFields": [{ "name": "name" }],
            "relationFields": [{
                "name": "movies",
                "type": "ACTED_IN",
                "direction": "OUT",
                "target": { "node": "Movie" },
                "array": true
            }]
        },
        {
            "name": "Genre",
            "primitiveFields": [
                { "name": "id", "type": "ID", "autogenerate": true },
                { "name": "name" }
            ]
        },
        {
            "name": "Article",
            "primitiveFields": [
                { "name": "title" },
                {
                    "name": "slug",
                    "callback": { "name": "getSlug", "operations": ["CREATE"] }
                }
            ]
        },
        {
            "name": "Post",
            "primitiveFields": [{ "name": "title" }, { "name": "owner" }],
            "auth": {
                "rules": [
                    { "operations": ["READ"], "where": { "owner": "$jwt.sub" } },
                    { "operations": ["READ"], "allow": { "owner": "$jwt.sub" } },
                    { "operations": ["DELETE"], "roles": ["admin"] }
                ]
            }
        },
        {
            "name": "Screening",
            "labels": ["Screening Room"],
            "primitiveFields": [{ "name": "starts" }]
        }
    ],
    "relationships": [
        { "name": "ActedIn", "fields": [{ "name": "screenTime", "type": "Int" }] }
    ]
}"#;

pub fn schema() -> Schema {
    Schema::from_json(SCHEMA_JSON).expect("fixture schema is valid")
}

pub fn context() -> Context {
    Context::new(Config::default())
}

pub fn classic_context() -> Context {
    Context::new(Config {
        unwind_create: false,
        ..Config::default()
    })
}

pub fn subscriptions_context() -> Context {
    Context::new(Config {
        subscriptions_enabled: true,
        ..Config::default()
    })
}

pub fn variables(value: Value) -> serde_json::Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
