//! Remote tier.
//!
//! The remote tier is an external database reached over HTTP. Any failure to
//! get a good answer from it is reported as [`TierUnavailable`], which the
//! store treats as a signal to fall back to the file tier.
//!
//! [`RestRemote`] speaks the PostgREST dialect (as served by Supabase):
//!
//! - Collection URL: `<endpoint>/rest/v1/<collection>`
//! - Filters: `column=eq.value`, `column=ilike.*value*`, `or=(a.ilike.x,b.ilike.y)`
//! - Ordering: `order=column.desc`
//! - Auth: `apikey` header plus a bearer token, both the configured key

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Method;
use serde_json::Value;

use crate::query::{Criteria, MatchOp};
use crate::record::{Record, ID_FIELD};
use crate::table::TableSpec;

/// The remote tier could not serve a call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct TierUnavailable {
    pub reason: String,
}

impl TierUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

pub type RemoteResult<T> = std::result::Result<T, TierUnavailable>;

/// Operations a remote backend provides for one table.
///
/// Records cross this boundary with local field names; implementations do
/// their own renaming.
pub trait RemoteTier: Send + Sync {
    /// Check that the backend is reachable and accepts our credentials.
    fn ping(&self) -> RemoteResult<()>;

    /// All records, newest first when the table has a date field.
    fn list(&self, spec: &TableSpec) -> RemoteResult<Vec<Record>>;

    /// Records whose date field equals `date` (`YYYY-MM-DD`).
    fn today(&self, spec: &TableSpec, date: &str) -> RemoteResult<Vec<Record>>;

    fn get(&self, spec: &TableSpec, id: &str) -> RemoteResult<Option<Record>>;

    /// Insert a record that already carries its identifier.
    fn insert(&self, spec: &TableSpec, record: &Record) -> RemoteResult<Record>;

    /// Update the record with `id`. Whether it existed is not checked.
    fn update(&self, spec: &TableSpec, id: &str, changes: &Record) -> RemoteResult<Record>;

    fn delete(&self, spec: &TableSpec, id: &str) -> RemoteResult<bool>;

    fn search(&self, spec: &TableSpec, criteria: &Criteria) -> RemoteResult<Vec<Record>>;
}

/// Default bound on a single remote request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// PostgREST-style HTTP remote.
pub struct RestRemote {
    base_url: String,
    key: String,
    client: Client,
    timeout: Duration,
}

type Params = Vec<(String, String)>;

impl RestRemote {
    /// Create a remote for `endpoint`, authenticating with `key`.
    pub fn new(endpoint: &str, key: &str, timeout: Duration) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TierUnavailable::new(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: endpoint.trim_end_matches('/').to_string(),
            key: key.to_string(),
            client,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, spec: &TableSpec) -> String {
        format!("{}/rest/v1/{}", self.base_url, spec.collection())
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                TierUnavailable::new(format!("request timed out after {:?}", self.timeout))
            } else if e.is_connect() {
                TierUnavailable::new(format!("cannot connect to {}", self.base_url))
            } else {
                TierUnavailable::new(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TierUnavailable::new(format!(
                "HTTP {}: {}",
                status.as_u16(),
                truncate(&body, 200)
            )));
        }

        Ok(response)
    }

    /// Decode a JSON array of rows. An empty body decodes as no rows.
    fn rows(&self, spec: &TableSpec, response: Response) -> RemoteResult<Vec<Record>> {
        let body = response
            .text()
            .map_err(|e| TierUnavailable::new(format!("failed to read response: {}", e)))?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<Value> = serde_json::from_str(&body)
            .map_err(|e| TierUnavailable::new(format!("undecodable response: {}", e)))?;

        values
            .into_iter()
            .map(|v| {
                Record::from_value(v)
                    .map(|r| spec.from_remote(&r).without_nulls())
                    .ok_or_else(|| TierUnavailable::new("response row is not an object"))
            })
            .collect()
    }

    fn fetch(&self, spec: &TableSpec, params: &Params) -> RemoteResult<Vec<Record>> {
        let request = self.request(Method::GET, &self.table_url(spec)).query(params);
        let response = self.send(request)?;
        self.rows(spec, response)
    }
}

impl RemoteTier for RestRemote {
    fn ping(&self) -> RemoteResult<()> {
        let url = format!("{}/rest/v1/", self.base_url);
        self.send(self.request(Method::GET, &url))?;
        Ok(())
    }

    fn list(&self, spec: &TableSpec) -> RemoteResult<Vec<Record>> {
        self.fetch(spec, &list_params(spec))
    }

    fn today(&self, spec: &TableSpec, date: &str) -> RemoteResult<Vec<Record>> {
        let params = today_params(spec, date)
            .ok_or_else(|| TierUnavailable::new(format!("table '{}' has no date field", spec.name)))?;
        self.fetch(spec, &params)
    }

    fn get(&self, spec: &TableSpec, id: &str) -> RemoteResult<Option<Record>> {
        let params = vec![select_all(), id_param(id)];
        Ok(self.fetch(spec, &params)?.into_iter().next())
    }

    fn insert(&self, spec: &TableSpec, record: &Record) -> RemoteResult<Record> {
        let body = Value::Array(vec![spec.to_remote(record).into()]);
        let request = self
            .request(Method::POST, &self.table_url(spec))
            .header("Prefer", "return=representation")
            .json(&body);

        let response = self.send(request)?;
        let confirmed = self.rows(spec, response)?.into_iter().next();
        Ok(confirmed.unwrap_or_else(|| record.clone()))
    }

    fn update(&self, spec: &TableSpec, id: &str, changes: &Record) -> RemoteResult<Record> {
        let mut body = spec.to_remote(changes);
        body.remove(ID_FIELD);

        let request = self
            .request(Method::PATCH, &self.table_url(spec))
            .query(&[id_param(id)])
            .header("Prefer", "return=representation")
            .json(&body);

        let response = self.send(request)?;
        let confirmed = self.rows(spec, response)?.into_iter().next();
        Ok(confirmed.unwrap_or_else(|| {
            let mut record = changes.clone();
            record.set_id(id);
            record.without_nulls()
        }))
    }

    fn delete(&self, spec: &TableSpec, id: &str) -> RemoteResult<bool> {
        let request = self
            .request(Method::DELETE, &self.table_url(spec))
            .query(&[id_param(id)]);
        self.send(request)?;
        Ok(true)
    }

    fn search(&self, spec: &TableSpec, criteria: &Criteria) -> RemoteResult<Vec<Record>> {
        match search_params(spec, criteria) {
            Some(params) => self.fetch(spec, &params),
            // Not expressible as a server-side filter; filter the full
            // listing instead.
            None => Ok(criteria.filter(self.list(spec)?, &spec.search_fields)),
        }
    }
}

fn select_all() -> (String, String) {
    ("select".to_string(), "*".to_string())
}

fn id_param(id: &str) -> (String, String) {
    (ID_FIELD.to_string(), format!("eq.{}", id))
}

fn order_param(spec: &TableSpec) -> Option<(String, String)> {
    let field = spec.date_field.as_deref()?;
    Some(("order".to_string(), format!("{}.desc", spec.remote_field(field))))
}

pub(crate) fn list_params(spec: &TableSpec) -> Params {
    let mut params = vec![select_all()];
    params.extend(order_param(spec));
    params
}

pub(crate) fn today_params(spec: &TableSpec, date: &str) -> Option<Params> {
    let field = spec.date_field.as_deref()?;
    let mut params = vec![
        select_all(),
        (spec.remote_field(field).to_string(), format!("eq.{}", date)),
    ];
    params.extend(order_param(spec));
    Some(params)
}

/// Translate criteria into query parameters.
///
/// Returns `None` when the criteria cannot be expressed server-side with the
/// same meaning: a free-text term on a table with no search fields, or a
/// substring containing `*`, which `ilike` reads as a wildcard and which has
/// no escape.
pub(crate) fn search_params(spec: &TableSpec, criteria: &Criteria) -> Option<Params> {
    let starred = |s: &str| s.contains('*');
    if criteria.term.as_deref().is_some_and(starred)
        || criteria
            .filters
            .iter()
            .any(|f| f.op == MatchOp::Contains && starred(&f.value))
    {
        return None;
    }

    let mut params = vec![select_all()];

    for filter in &criteria.filters {
        let value = match filter.op {
            MatchOp::Eq => format!("eq.{}", filter.value),
            MatchOp::Contains => format!("ilike.*{}*", escape_like(&filter.value)),
        };
        params.push((spec.remote_field(&filter.field).to_string(), value));
    }

    if let Some(term) = criteria.term.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        if spec.search_fields.is_empty() {
            return None;
        }
        let pattern = quote_value(&format!("*{}*", escape_like(term)));
        let alternatives: Vec<String> = spec
            .search_fields
            .iter()
            .map(|f| format!("{}.ilike.{}", spec.remote_field(f), pattern))
            .collect();
        params.push(("or".to_string(), format!("({})", alternatives.join(","))));
    }

    params.extend(order_param(spec));
    Some(params)
}

/// Escape LIKE wildcards so they match literally.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Double-quote a value inside an `or=(...)` list.
fn quote_value(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    fn pairs(params: &Params) -> Vec<(&str, &str)> {
        params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }

    #[test]
    fn test_list_params_order_by_remote_date_column() {
        let spec = TableSpec::builtin("labs").unwrap().with_field_map("date", "lab_date");
        assert_eq!(
            pairs(&list_params(&spec)),
            vec![("select", "*"), ("order", "lab_date.desc")]
        );

        let spec = TableSpec::builtin("medicines").unwrap();
        assert_eq!(pairs(&list_params(&spec)), vec![("select", "*")]);
    }

    #[test]
    fn test_today_params() {
        let spec = TableSpec::builtin("prescriptions").unwrap();
        assert_eq!(
            pairs(&today_params(&spec, "2024-01-15").unwrap()),
            vec![("select", "*"), ("date", "eq.2024-01-15"), ("order", "date.desc")]
        );
        assert!(today_params(&TableSpec::builtin("medicines").unwrap(), "2024-01-15").is_none());
    }

    #[test]
    fn test_search_params_filters_and_term() {
        let spec = TableSpec::builtin("labs").unwrap();
        let criteria = Criteria::term("smith").eq("status", "done").contains("patientName", "jo");

        assert_eq!(
            pairs(&search_params(&spec, &criteria).unwrap()),
            vec![
                ("select", "*"),
                ("status", "eq.done"),
                ("patient_name", "ilike.*jo*"),
                ("or", r#"(patient_name.ilike."*smith*",test_name.ilike."*smith*")"#),
                ("order", "date.desc"),
            ]
        );
    }

    #[test]
    fn test_search_params_term_without_fields() {
        let spec = TableSpec::named("staff");
        assert!(search_params(&spec, &Criteria::term("x")).is_none());
        assert!(search_params(&spec, &Criteria::term("  ")).is_some());
        assert!(search_params(&spec, &Criteria::all().eq("a", "b")).is_some());
    }

    #[test]
    fn test_search_params_star_stays_client_side() {
        let spec = TableSpec::builtin("patients").unwrap();

        assert!(search_params(&spec, &Criteria::all().contains("name", "a*c")).is_none());
        assert!(search_params(&spec, &Criteria::term("a*c")).is_none());
        assert!(search_params(&spec, &Criteria::term("smith").contains("phone", "*")).is_none());

        // Equality is literal on the server, so a star there is fine
        assert_eq!(
            pairs(&search_params(&spec, &Criteria::all().eq("name", "a*c")).unwrap()),
            vec![("select", "*"), ("name", "eq.a*c"), ("order", "date.desc")]
        );
    }

    #[test]
    fn test_starred_search_filters_listing() {
        let (url, handle) = stub(
            "200 OK",
            r#"[{"id":"1","name":"abc"},{"id":"2","name":"a*c"},{"id":"3","name":"A*C clinic"}]"#,
        );
        let spec = TableSpec::builtin("patients").unwrap();

        let found = remote(&url)
            .search(&spec, &Criteria::all().contains("name", "a*c"))
            .unwrap();
        let request = handle.join().unwrap();

        let ids: Vec<_> = found.iter().filter_map(|r| r.id()).collect();
        assert_eq!(ids, vec!["2", "3"]);
        let first_line = request.lines().next().unwrap();
        assert!(!first_line.contains("ilike"), "{}", first_line);
    }

    #[test]
    fn test_escaping() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(quote_value(r#"a"b"#), r#""a\"b""#);
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
    }

    // HTTP adapter against a one-shot stub server

    fn stub(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
            request
        });
        (format!("http://{}", addr), handle)
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_string();
                let length = head
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn remote(url: &str) -> RestRemote {
        RestRemote::new(url, "secret", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_list_over_http() {
        let (url, handle) = stub(
            "200 OK",
            r#"[{"id":"2","patient_name":"Jane","date":"2024-01-16"},{"id":"1","patient_name":"John","date":"2024-01-15"}]"#,
        );
        let spec = TableSpec::builtin("labs").unwrap();

        let records = remote(&url).list(&spec).unwrap();
        let request = handle.join().unwrap();

        assert_eq!(records.len(), 2);
        assert!(records[0].has_id("2"));
        assert_eq!(records[0].text("patientName").as_deref(), Some("Jane"));

        let first_line = request.lines().next().unwrap();
        assert!(first_line.starts_with("GET /rest/v1/labs?"), "{}", first_line);
        assert!(first_line.contains("order=date.desc"), "{}", first_line);
        let lower = request.to_lowercase();
        assert!(lower.contains("apikey: secret"));
        assert!(lower.contains("authorization: bearer secret"));
    }

    #[test]
    fn test_insert_over_http() {
        let (url, handle) = stub(
            "201 Created",
            r#"[{"id":"abc","patient_name":"John","created_at":"2024-01-15T10:00:00Z"}]"#,
        );
        let spec = TableSpec::builtin("prescriptions").unwrap();
        let record = Record::new().with("id", "abc").with("patientName", "John");

        let confirmed = remote(&url).insert(&spec, &record).unwrap();
        let request = handle.join().unwrap();

        assert!(confirmed.has_id("abc"));
        assert_eq!(confirmed.text("created_at").as_deref(), Some("2024-01-15T10:00:00Z"));
        assert!(request.starts_with("POST /rest/v1/prescriptions "));
        assert!(request.to_lowercase().contains("prefer: return=representation"));
        let body = request.split("\r\n\r\n").nth(1).unwrap();
        let sent: Value = serde_json::from_str(body).unwrap();
        assert_eq!(sent, json!([{"id": "abc", "patient_name": "John"}]));
    }

    #[test]
    fn test_update_without_representation_echoes_changes() {
        let (url, handle) = stub("204 No Content", "");
        let spec = TableSpec::builtin("patients").unwrap();
        let changes = Record::new().with("name", "B");

        let updated = remote(&url).update(&spec, "7", &changes).unwrap();
        let request = handle.join().unwrap();

        assert_eq!(updated, Record::new().with("id", "7").with("name", "B"));
        assert!(request.starts_with("PATCH /rest/v1/patients?id=eq.7 "));
    }

    #[test]
    fn test_update_drops_cleared_fields() {
        let (url, handle) = stub("200 OK", r#"[{"id":"7","name":"B","phone":null}]"#);
        let spec = TableSpec::builtin("patients").unwrap();
        let changes = Record::new().with("phone", Value::Null);

        let updated = remote(&url).update(&spec, "7", &changes).unwrap();
        let request = handle.join().unwrap();

        assert_eq!(updated, Record::new().with("id", "7").with("name", "B"));
        let body = request.split("\r\n\r\n").nth(1).unwrap();
        let sent: Value = serde_json::from_str(body).unwrap();
        assert_eq!(sent, json!({"phone": null}));
    }

    #[test]
    fn test_update_echo_drops_cleared_fields() {
        let (url, handle) = stub("204 No Content", "");
        let spec = TableSpec::builtin("patients").unwrap();
        let changes = Record::new().with("name", "B").with("phone", Value::Null);

        let updated = remote(&url).update(&spec, "7", &changes).unwrap();
        handle.join().unwrap();

        assert_eq!(updated, Record::new().with("id", "7").with("name", "B"));
    }

    #[test]
    fn test_delete_over_http() {
        let (url, handle) = stub("204 No Content", "");
        let spec = TableSpec::builtin("opticals").unwrap();

        assert!(remote(&url).delete(&spec, "9").unwrap());
        assert!(handle.join().unwrap().starts_with("DELETE /rest/v1/opticals?id=eq.9 "));
    }

    #[test]
    fn test_error_status_is_unavailable() {
        let (url, handle) = stub("401 Unauthorized", r#"{"message":"Invalid API key"}"#);
        let spec = TableSpec::builtin("labs").unwrap();

        let err = remote(&url).list(&spec).unwrap_err();
        handle.join().unwrap();

        assert!(err.reason.starts_with("HTTP 401"), "{}", err);
        assert!(err.reason.contains("Invalid API key"));
    }

    #[test]
    fn test_garbage_body_is_unavailable() {
        let (url, handle) = stub("200 OK", r#"{"not":"an array"}"#);
        let spec = TableSpec::builtin("labs").unwrap();

        let err = remote(&url).list(&spec).unwrap_err();
        handle.join().unwrap();
        assert!(err.reason.contains("undecodable"), "{}", err);
    }

    #[test]
    fn test_connection_refused_is_unavailable() {
        // Grab a free port, then close it
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let remote = remote(&format!("http://127.0.0.1:{}", port));

        assert!(remote.ping().is_err());
        assert!(remote.list(&TableSpec::builtin("labs").unwrap()).is_err());
    }

    #[test]
    fn test_timeout_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let _ = read_request(&mut stream);
                thread::sleep(Duration::from_secs(3));
            }
        });

        let remote = RestRemote::new(&format!("http://{}", addr), "k", Duration::from_millis(200)).unwrap();
        let err = remote.ping().unwrap_err();
        assert!(err.reason.contains("timed out"), "{}", err);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let remote = remote("https://example.supabase.co/");
        assert_eq!(remote.base_url(), "https://example.supabase.co");
        assert_eq!(
            remote.table_url(&TableSpec::builtin("labs").unwrap()),
            "https://example.supabase.co/rest/v1/labs"
        );
    }
}
