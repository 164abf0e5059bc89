//! Running translated statements
//!
//! The database driver and the subscription transport live outside this
//! crate. They are reached through [`Executor`] and [`EventPublisher`].

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::constants::META_VARIABLE;
use crate::cypher::CypherResult;
use crate::error::{Error, Result};
use crate::translate::subscriptions::EventMeta;

/// One result record, by column
pub type Record = Map<String, Value>;

/// Runs Cypher against the database
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, cypher: &str, params: &Map<String, Value>) -> anyhow::Result<Vec<Record>>;
}

/// Hands mutation events to subscribers
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, events: Vec<EventMeta>) -> anyhow::Result<()>;
}

/// Records of an executed statement and the events it produced
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub records: Vec<Record>,
    pub events: Vec<EventMeta>,
}

/// Runs `statement` and publishes the events found in its `meta` column.
///
/// Events are published once, in the order the statement produced them, and
/// only after the statement succeeded. Failures are not retried.
pub async fn execute_and_publish(
    statement: &CypherResult,
    executor: &dyn Executor,
    publisher: Option<&dyn EventPublisher>,
) -> Result<Execution> {
    let records = executor
        .run(&statement.cypher, &statement.params)
        .await
        .map_err(|err| Error::from_database(format!("{:#}", err)))?;

    let mut events = Vec::new();
    for record in &records {
        if let Some(meta) = record.get(META_VARIABLE) {
            events.extend(EventMeta::from_column(meta)?);
        }
    }

    if !events.is_empty() {
        match publisher {
            Some(publisher) => {
                debug!(count = events.len(), "publishing events");
                publisher
                    .publish(events.clone())
                    .await
                    .map_err(|err| Error::Publish(format!("{:#}", err)))?;
            }
            None => warn!(count = events.len(), "events produced without a publisher"),
        }
    }

    Ok(Execution { records, events })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct FixedExecutor(std::result::Result<Vec<Record>, String>);

    #[async_trait]
    impl Executor for FixedExecutor {
        async fn run(&self, _cypher: &str, _params: &Map<String, Value>) -> anyhow::Result<Vec<Record>> {
            self.0.clone().map_err(|message| anyhow::anyhow!(message))
        }
    }

    #[derive(Default)]
    struct RecordingPublisher(Mutex<Vec<Vec<EventMeta>>>);

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, events: Vec<EventMeta>) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(events);
            Ok(())
        }
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn create_event(id: i64) -> Value {
        json!({
            "event": "create",
            "id": id,
            "typename": "Movie",
            "properties": { "old": null, "new": { "title": "Heat" } },
            "timestamp": 1
        })
    }

    #[tokio::test]
    async fn publishes_meta_in_order() {
        let executor = FixedExecutor(Ok(vec![record(json!({
            "data": [],
            "meta": [create_event(1), create_event(2)]
        }))]));
        let publisher = RecordingPublisher::default();
        let statement = CypherResult::new("RETURN 1", Map::new());

        let execution = execute_and_publish(&statement, &executor, Some(&publisher))
            .await
            .unwrap();

        assert_eq!(execution.events.len(), 2);
        let published = publisher.0.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0], execution.events);
    }

    #[tokio::test]
    async fn classifies_database_errors() {
        let statement = CypherResult::new("RETURN 1", Map::new());

        let executor = FixedExecutor(Err("Caused by: FORBIDDEN".to_string()));
        let result = execute_and_publish(&statement, &executor, None).await;
        assert!(matches!(result, Err(Error::Forbidden)));

        let executor = FixedExecutor(Err(
            "Caused by: RELATIONSHIP-REQUIRED: Movie.director required exactly once".to_string(),
        ));
        let result = execute_and_publish(&statement, &executor, None).await;
        assert!(matches!(
            result,
            Err(Error::Execution {
                kind: crate::error::DatabaseErrorKind::RelationshipRequired,
                ..
            })
        ));
    }
}
