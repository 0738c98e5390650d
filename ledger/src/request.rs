//! Request/response contract for callers that cannot handle errors.
//!
//! A [`Request`] names a table and an operation; [`Store::handle`] always
//! answers with a [`Response`]. Storage faults never surface as errors here:
//! a failed read answers with no records, a failed write answers with no
//! record (or `deleted: false`), and the fault is logged. Callers that need
//! to tell "empty" from "broken" use the typed [`Table`](crate::store::Table)
//! API instead.
//!
//! On the wire, one JSON object per request:
//!
//! ```json
//! {"table": "patients", "op": "search", "criteria": "name~smith"}
//! {"table": "patients", "op": "update", "id": "0190...", "record": {"phone": "555"}}
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::query::{parse_criteria, Criteria};
use crate::record::Record;
use crate::store::{Store, Table};

/// One operation against one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub table: String,
    #[serde(flatten)]
    pub op: Operation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    List,
    Today,
    Get {
        id: String,
    },
    Add {
        record: Record,
    },
    Update {
        id: String,
        record: Record,
    },
    Delete {
        id: String,
    },
    Search {
        /// Either a search string or structured criteria.
        #[serde(deserialize_with = "criteria_from_text_or_struct")]
        criteria: Criteria,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Today => "today",
            Operation::Get { .. } => "get",
            Operation::Add { .. } => "add",
            Operation::Update { .. } => "update",
            Operation::Delete { .. } => "delete",
            Operation::Search { .. } => "search",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Records { records: Vec<Record> },
    Record { record: Option<Record> },
    Deleted { deleted: bool },
    Failed { error: String },
}

impl Request {
    pub fn new(table: impl Into<String>, op: Operation) -> Self {
        Self {
            table: table.into(),
            op,
        }
    }
}

impl Store {
    /// Answer a request. Never fails; see the module docs.
    pub fn handle(&self, request: &Request) -> Response {
        let table = match self.table(&request.table) {
            Ok(table) => table,
            Err(e) => {
                warn!(table = %request.table, error = %e, "rejected request");
                return Response::Failed {
                    error: e.to_string(),
                };
            }
        };
        answer(&table, &request.op)
    }
}

fn answer(table: &Table<'_>, op: &Operation) -> Response {
    let name = op.name();
    let log = |e: &crate::Error| warn!(table = %table.name(), op = name, error = %e, "storage fault");

    match op {
        Operation::List => records(table.list().inspect_err(log)),
        Operation::Today => records(table.today().inspect_err(log)),
        Operation::Search { criteria } => records(table.search(criteria).inspect_err(log)),
        Operation::Get { id } => record(table.get(id).inspect_err(log).ok().flatten()),
        Operation::Add { record: r } => record(table.add(r.clone()).inspect_err(log).ok()),
        Operation::Update { id, record: r } => {
            record(table.update(id, r).inspect_err(log).ok().flatten())
        }
        Operation::Delete { id } => Response::Deleted {
            deleted: table.delete(id).inspect_err(log).unwrap_or(false),
        },
    }
}

fn records(result: crate::Result<Vec<Record>>) -> Response {
    Response::Records {
        records: result.unwrap_or_default(),
    }
}

fn record(record: Option<Record>) -> Response {
    Response::Record { record }
}

fn criteria_from_text_or_struct<'de, D>(deserializer: D) -> Result<Criteria, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Input {
        Text(String),
        Structured(Criteria),
    }

    Ok(match Input::deserialize(deserializer)? {
        Input::Text(text) => parse_criteria(&text),
        Input::Structured(criteria) => criteria,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::initialize;
    use crate::Config;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup_store() -> (TempDir, Store) {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_root(tmp.path());
        initialize(&config).unwrap();
        let store = Store::open(config).unwrap();
        (tmp, store)
    }

    fn request(value: serde_json::Value) -> Request {
        serde_json::from_value(value).unwrap()
    }

    fn rec(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[test]
    fn test_request_wire_format() {
        assert_eq!(
            request(json!({"table": "labs", "op": "list"})),
            Request::new("labs", Operation::List)
        );
        assert_eq!(
            request(json!({"table": "labs", "op": "update", "id": "7", "record": {"x": 1}})),
            Request::new(
                "labs",
                Operation::Update {
                    id: "7".to_string(),
                    record: rec(json!({"x": 1}))
                }
            )
        );
        assert_eq!(
            request(json!({"table": "labs", "op": "search", "criteria": "testName~cbc smith"})),
            Request::new(
                "labs",
                Operation::Search {
                    criteria: Criteria::term("smith").contains("testName", "cbc")
                }
            )
        );
        assert_eq!(
            request(json!({"table": "labs", "op": "search", "criteria": {"term": "smith"}})),
            Request::new(
                "labs",
                Operation::Search {
                    criteria: Criteria::term("smith")
                }
            )
        );
        assert!(serde_json::from_value::<Request>(json!({"table": "labs", "op": "drop"})).is_err());
    }

    #[test]
    fn test_response_wire_format() {
        let value = serde_json::to_value(Response::Deleted { deleted: true }).unwrap();
        assert_eq!(value, json!({"kind": "deleted", "deleted": true}));

        let value = serde_json::to_value(Response::Record { record: None }).unwrap();
        assert_eq!(value, json!({"kind": "record", "record": null}));
    }

    #[test]
    fn test_handle_round_trip() {
        let (_tmp, store) = setup_store();

        let added = match store.handle(&request(
            json!({"table": "patients", "op": "add", "record": {"name": "John Smith"}}),
        )) {
            Response::Record { record: Some(r) } => r,
            other => panic!("unexpected response: {:?}", other),
        };
        let id = added.id().unwrap().to_string();

        assert_eq!(
            store.handle(&request(json!({"table": "patients", "op": "search", "criteria": "SMITH"}))),
            Response::Records {
                records: vec![added.clone()]
            }
        );
        assert_eq!(
            store.handle(&request(json!({"table": "patients", "op": "get", "id": id}))),
            Response::Record {
                record: Some(added)
            }
        );
        assert_eq!(
            store.handle(&request(json!({"table": "patients", "op": "update", "id": "nope", "record": {}}))),
            Response::Record { record: None }
        );
        assert_eq!(
            store.handle(&request(json!({"table": "patients", "op": "delete", "id": id}))),
            Response::Deleted { deleted: true }
        );
        assert_eq!(
            store.handle(&request(json!({"table": "patients", "op": "delete", "id": id}))),
            Response::Deleted { deleted: false }
        );
    }

    #[test]
    fn test_handle_unknown_table() {
        let (_tmp, store) = setup_store();
        let response = store.handle(&Request::new("invoices", Operation::List));
        assert!(matches!(response, Response::Failed { error } if error.contains("invoices")));
    }

    #[test]
    fn test_storage_fault_reads_as_empty() {
        let (_tmp, store) = setup_store();
        let labs = store.table("labs").unwrap();
        std::fs::write(labs.file().path(), "garbage").unwrap();

        // The typed API reports the fault...
        assert!(labs.list().is_err());

        // ...the request boundary answers as if the table were empty.
        assert_eq!(
            store.handle(&Request::new("labs", Operation::List)),
            Response::Records { records: vec![] }
        );
        assert_eq!(
            store.handle(&Request::new(
                "labs",
                Operation::Add {
                    record: rec(json!({"testName": "CBC"}))
                }
            )),
            Response::Record { record: None }
        );
        assert_eq!(
            store.handle(&Request::new("labs", Operation::Delete { id: "1".to_string() })),
            Response::Deleted { deleted: false }
        );
    }

    #[test]
    fn test_today_without_date_field_is_empty() {
        let (_tmp, store) = setup_store();
        assert_eq!(
            store.handle(&Request::new("medicines", Operation::Today)),
            Response::Records { records: vec![] }
        );
    }
}
