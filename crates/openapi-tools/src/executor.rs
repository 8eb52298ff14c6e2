//! Turns one flat JSON argument object into an HTTP call and normalizes the outcome.
//!
//! Path, query and header parameters are picked out of the arguments by name; for methods that
//! carry a body, everything left over (minus the security header names) becomes the JSON body.
//! Every outcome, including bad input and transport failures, ends up as a
//! [`ToolExecutionResult`]; nothing escapes as an error.

use crate::config::{AUTHORIZATION_HEADER, SecurityConfig, TRAFFIC_CODE_HEADER, is_security_name};
use crate::extract::value_to_string;
use crate::model::{Endpoint, ParamLocation};
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use swagger_agent_http_tools::runtime::{HttpToolsError, HttpTransport};
use swagger_agent_http_tools::semantics::method_carries_body;
use thiserror::Error;
use url::Url;

/// Outcome of a tool call as handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecutionResult {
    pub http_status_code: u16,
    pub body: String,
}

impl ToolExecutionResult {
    /// Result whose body is `{"error": <message>, "status": <status>}`.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            http_status_code: status,
            body: json!({ "error": message.into(), "status": status }).to_string(),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        json!({ "httpStatusCode": self.http_status_code, "body": self.body }).to_string()
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Invalid JSON arguments: {0}")]
    InvalidArguments(String),
    #[error("Missing required path parameter: {0}")]
    MissingPathParameter(String),
    #[error("Invalid header '{name}': {message}")]
    InvalidHeader { name: String, message: String },
    #[error("Invalid request URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },
    #[error(transparent)]
    Http(#[from] HttpToolsError),
}

impl ExecutionError {
    /// Caller mistakes are 400, everything else is 500.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidArguments(_)
            | Self::MissingPathParameter(_)
            | Self::InvalidHeader { .. } => 400,
            Self::InvalidUrl { .. } | Self::Http(_) => 500,
        }
    }
}

impl From<ExecutionError> for ToolExecutionResult {
    fn from(err: ExecutionError) -> Self {
        ToolExecutionResult::error(err.status(), err.to_string())
    }
}

/// Everything needed to issue the call, before it touches the network.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    /// JSON body text; only set for methods that carry a body.
    pub body: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RequestExecutor {
    transport: HttpTransport,
    security: SecurityConfig,
}

impl RequestExecutor {
    #[must_use]
    pub fn new(transport: HttpTransport, security: SecurityConfig) -> Self {
        Self {
            transport,
            security,
        }
    }

    /// Parse `arguments` as a JSON object and run the call.
    pub async fn execute(&self, endpoint: &Endpoint, arguments: &str) -> ToolExecutionResult {
        match parse_arguments(arguments) {
            Ok(args) => self.execute_value(endpoint, args).await,
            Err(e) => {
                tracing::debug!(operation = %endpoint.operation_id, "Rejecting arguments: {e}");
                e.into()
            }
        }
    }

    /// Run the call with already-parsed arguments. Anything but an object is rejected with 400.
    pub async fn execute_value(&self, endpoint: &Endpoint, arguments: Value) -> ToolExecutionResult {
        let Value::Object(args) = arguments else {
            return ExecutionError::InvalidArguments("arguments must be a JSON object".to_string())
                .into();
        };

        match self.send(endpoint, &args).await {
            Ok(result) => result,
            Err(e) => {
                if e.status() >= 500 {
                    tracing::warn!(
                        operation = %endpoint.operation_id,
                        method = %endpoint.method,
                        path = %endpoint.path,
                        "Tool call failed: {e}"
                    );
                } else {
                    tracing::debug!(operation = %endpoint.operation_id, "Rejecting arguments: {e}");
                }
                e.into()
            }
        }
    }

    async fn send(
        &self,
        endpoint: &Endpoint,
        args: &Map<String, Value>,
    ) -> Result<ToolExecutionResult, ExecutionError> {
        let prepared = self.prepare(endpoint, args)?;

        let mut request = self
            .transport
            .client()
            .request(prepared.method, prepared.url)
            .headers(prepared.headers);
        if let Some(body) = prepared.body {
            request = request.body(body);
        }
        let request = request.build().map_err(HttpToolsError::from)?;

        let response = self.transport.execute(request).await?;
        Ok(ToolExecutionResult {
            http_status_code: response.status,
            body: response.body,
        })
    }

    /// Split `args` into path, query, headers and body for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if a path parameter is missing, a header is not a valid HTTP header, or
    /// the resulting URL does not parse.
    pub fn prepare(
        &self,
        endpoint: &Endpoint,
        args: &Map<String, Value>,
    ) -> Result<PreparedRequest, ExecutionError> {
        let mut path = endpoint.path.clone();
        let mut query: Vec<(String, String)> = Vec::new();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = self.security.bearer_token() {
            insert_header(&mut headers, AUTHORIZATION_HEADER, &format!("Bearer {token}"))?;
        }
        if let Some(code) = self.security.traffic_code() {
            insert_header(&mut headers, TRAFFIC_CODE_HEADER, code)?;
        }

        for param in endpoint.visible_parameters() {
            let value = args.get(&param.name).filter(|v| !v.is_null());
            match param.location {
                ParamLocation::Path => {
                    let value = value
                        .ok_or_else(|| ExecutionError::MissingPathParameter(param.name.clone()))?;
                    path = path.replace(
                        &format!("{{{}}}", param.name),
                        &encode_component(&value_to_string(value)),
                    );
                }
                ParamLocation::Query => {
                    if let Some(value) = value {
                        append_query(&mut query, &param.name, value);
                    }
                }
                ParamLocation::Header => {
                    if let Some(value) = value {
                        insert_header(&mut headers, &param.name, &value_to_string(value))?;
                    }
                }
            }
        }

        let raw_url = build_url(&endpoint.base_url, &path, &query);
        let url = Url::parse(&raw_url).map_err(|e| ExecutionError::InvalidUrl {
            url: raw_url.clone(),
            message: e.to_string(),
        })?;

        let body = method_carries_body(&endpoint.method).then(|| {
            let body: Map<String, Value> = args
                .iter()
                .filter(|(key, _)| endpoint.parameter(key).is_none() && !is_security_name(key))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Value::Object(body).to_string()
        });

        Ok(PreparedRequest {
            method: endpoint.method.clone(),
            url,
            headers,
            body,
        })
    }
}

fn parse_arguments(arguments: &str) -> Result<Value, ExecutionError> {
    serde_json::from_str(arguments).map_err(|e| ExecutionError::InvalidArguments(e.to_string()))
}

/// Arrays become repeated `name=value` pairs; everything else one pair.
fn append_query(query: &mut Vec<(String, String)>, name: &str, value: &Value) {
    match value {
        Value::Array(items) => query.extend(
            items
                .iter()
                .filter(|v| !v.is_null())
                .map(|v| (name.to_string(), value_to_string(v))),
        ),
        other => query.push((name.to_string(), value_to_string(other))),
    }
}

fn build_url(base_url: &str, path: &str, query: &[(String, String)]) -> String {
    let mut url = format!("{}{}", base_url.trim_end_matches('/'), path);
    for (i, (key, value)) in query.iter().enumerate() {
        url.push(if i == 0 { '?' } else { '&' });
        url.push_str(&encode_component(key));
        url.push('=');
        url.push_str(&encode_component(value));
    }
    url
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), ExecutionError> {
    let invalid = |message: String| ExecutionError::InvalidHeader {
        name: name.to_string(),
        message,
    };
    let header_name =
        HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
    let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
    headers.insert(header_name, header_value);
    Ok(())
}

/// Percent-encode everything except RFC 3986 unreserved characters.
fn encode_component(s: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if is_unreserved(b) {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}

fn is_unreserved(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Parameter;
    use indexmap::IndexMap;
    use swagger_agent_http_tools::config::TransportConfig;
    use swagger_agent_test_support::{EchoServer, pick_unused_port};

    fn param(name: &str, location: ParamLocation) -> Parameter {
        Parameter {
            name: name.to_string(),
            location,
            description: None,
            required: location == ParamLocation::Path,
            param_type: "string".to_string(),
            format: None,
            default: None,
            enum_values: Vec::new(),
            items: None,
        }
    }

    fn endpoint(method: Method, path: &str, base_url: &str, params: Vec<Parameter>) -> Endpoint {
        Endpoint {
            operation_id: "op".to_string(),
            method,
            path: path.to_string(),
            summary: None,
            description: None,
            base_url: base_url.to_string(),
            project_id: "shop".to_string(),
            parameters: params,
            request_body: None,
            responses: IndexMap::new(),
            tags: Vec::new(),
        }
    }

    fn executor(security: SecurityConfig) -> RequestExecutor {
        let transport = HttpTransport::new(&TransportConfig::default()).unwrap();
        RequestExecutor::new(transport, security)
    }

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn path_and_query_are_percent_encoded() {
        let ep = endpoint(
            Method::GET,
            "/files/{name}",
            "http://api.test/v1/",
            vec![
                param("name", ParamLocation::Path),
                param("q", ParamLocation::Query),
                param("tag", ParamLocation::Query),
                param("missing", ParamLocation::Query),
            ],
        );
        let prepared = executor(SecurityConfig::default())
            .prepare(
                &ep,
                &args(json!({"name": "a b/c", "q": "x&y=z", "tag": ["red", null, 2]})),
            )
            .unwrap();
        assert_eq!(
            prepared.url.as_str(),
            "http://api.test/v1/files/a%20b%2Fc?q=x%26y%3Dz&tag=red&tag=2"
        );
        assert!(prepared.body.is_none());
    }

    #[test]
    fn missing_or_null_path_parameter_is_rejected() {
        let ep = endpoint(
            Method::GET,
            "/users/{id}",
            "http://api.test",
            vec![param("id", ParamLocation::Path)],
        );
        let exec = executor(SecurityConfig::default());
        for input in [json!({}), json!({"id": null})] {
            let err = exec.prepare(&ep, &args(input)).unwrap_err();
            assert_eq!(err.status(), 400);
            assert_eq!(err.to_string(), "Missing required path parameter: id");
        }
    }

    #[test]
    fn body_excludes_parameters_and_security_names() {
        let ep = endpoint(
            Method::POST,
            "/orders",
            "http://api.test",
            vec![
                param("traceId", ParamLocation::Header),
                param("dryRun", ParamLocation::Query),
            ],
        );
        let prepared = executor(SecurityConfig::default())
            .prepare(
                &ep,
                &args(json!({
                    "sku": "X1",
                    "traceId": "abc",
                    "authorization": "Bearer stolen",
                    "qty": 3,
                    "dryRun": false
                })),
            )
            .unwrap();
        assert_eq!(prepared.body.as_deref(), Some(r#"{"sku":"X1","qty":3}"#));
        assert_eq!(prepared.headers["traceId"], "abc");
        assert_eq!(prepared.headers[CONTENT_TYPE], "application/json");
        assert!(prepared.headers.get(AUTHORIZATION_HEADER).is_none());
        assert_eq!(prepared.url.query(), Some("dryRun=false"));
    }

    #[test]
    fn empty_body_is_sent_as_empty_object() {
        let ep = endpoint(Method::PUT, "/ping", "http://api.test", Vec::new());
        let prepared = executor(SecurityConfig::default())
            .prepare(&ep, &Map::new())
            .unwrap();
        assert_eq!(prepared.body.as_deref(), Some("{}"));
    }

    #[test]
    fn security_headers_come_from_configuration_only() {
        let ep = endpoint(
            Method::GET,
            "/me",
            "http://api.test",
            vec![param("Traffic-Code", ParamLocation::Header)],
        );
        let exec = executor(SecurityConfig {
            authorization_token: Some("tok".to_string()),
            traffic_code: Some("  ".to_string()),
        });
        let prepared = exec
            .prepare(&ep, &args(json!({"Traffic-Code": "from-caller"})))
            .unwrap();
        assert_eq!(prepared.headers[AUTHORIZATION_HEADER], "Bearer tok");
        assert!(prepared.headers.get(TRAFFIC_CODE_HEADER).is_none());
    }

    #[test]
    fn invalid_header_value_is_a_bad_request() {
        let ep = endpoint(
            Method::GET,
            "/x",
            "http://api.test",
            vec![param("X-Note", ParamLocation::Header)],
        );
        let err = executor(SecurityConfig::default())
            .prepare(&ep, &args(json!({"X-Note": "line\nbreak"})))
            .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[tokio::test]
    async fn invalid_json_and_non_objects_are_rejected() {
        let ep = endpoint(Method::GET, "/x", "http://api.test", Vec::new());
        let exec = executor(SecurityConfig::default());

        let result = exec.execute(&ep, "{not json").await;
        assert_eq!(result.http_status_code, 400);
        let body: Value = serde_json::from_str(&result.body).unwrap();
        assert_eq!(body["status"], 400);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid JSON arguments"));

        let result = exec.execute(&ep, "[1, 2]").await;
        assert_eq!(result.http_status_code, 400);
    }

    #[tokio::test]
    async fn upstream_status_and_body_pass_through() {
        let server = EchoServer::start().await.unwrap();
        let ep = endpoint(
            Method::DELETE,
            "/status/{code}",
            server.base_url(),
            vec![param("code", ParamLocation::Path)],
        );

        let result = executor(SecurityConfig::default())
            .execute(&ep, r#"{"code": 409}"#)
            .await;
        assert_eq!(result.http_status_code, 409);
        let echoed: Value = serde_json::from_str(&result.body).unwrap();
        assert_eq!(echoed["method"], "DELETE");
        assert_eq!(echoed["path"], "/status/409");
        assert_eq!(echoed["body"], "");

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn connection_failure_becomes_500() {
        let port = pick_unused_port().unwrap();
        let ep = endpoint(
            Method::GET,
            "/ping",
            &format!("http://127.0.0.1:{port}"),
            Vec::new(),
        );
        let result = executor(SecurityConfig::default()).execute(&ep, "{}").await;
        assert_eq!(result.http_status_code, 500);
        let body: Value = serde_json::from_str(&result.body).unwrap();
        assert_eq!(body["status"], 500);
        assert!(body["error"].is_string());
    }

    #[test]
    fn result_serializes_in_camel_case() {
        let result = ToolExecutionResult {
            http_status_code: 201,
            body: "{}".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"httpStatusCode": 201, "body": "{}"})
        );
        assert_eq!(result.to_json(), r#"{"httpStatusCode":201,"body":"{}"}"#);
    }
}
