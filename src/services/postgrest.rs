//! Hosted data API client.
//!
//! Provides an HTTP client for the backend's PostgREST endpoint: a small
//! query builder for table reads and writes, and the `DataSource`
//! implementation the ticket service runs against in production.

use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::{AppError, ROW_SECURITY_CODE};
use crate::models::{
    CommentRecord, Label, Profile, Session, TicketFilter, TicketLabelLink, TicketRecord,
    TicketStatus,
};
use crate::services::data_source::{CommentInsert, DataSource, TicketInsert, TicketRow};

/// Projection used for every ticket read: the row, its comments, and its labels
/// joined through the association table.
pub const TICKET_SELECT: &str =
    "*,comments(id,body,created_at,author_id),tickets_labels(label:labels(id,name))";

/// PostgREST code for a single-object request that matched zero or several rows.
const NO_SINGLE_ROW_CODE: &str = "PGRST116";

const SINGLE_OBJECT_MIME: &str = "application/vnd.pgrst.object+json";

/// Data API client configuration.
#[derive(Debug, Clone)]
pub struct PostgrestConfig {
    /// Base URL of the backend (e.g., `https://xyz.supabase.co`).
    pub base_url: String,

    /// Public anonymous key, sent as `apikey` and as the bearer for anonymous calls.
    pub anon_key: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for PostgrestConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            anon_key: String::new(),
            timeout_secs: 30,
        }
    }
}

impl From<&AppConfig> for PostgrestConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.backend_url.clone(),
            anon_key: config.anon_key.clone(),
            timeout_secs: config.timeout_secs,
        }
    }
}

/// A table-scoped request: projection, filters, ordering and row expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    table: String,
    params: Vec<(String, String)>,
    single: bool,
}

impl TableQuery {
    /// Start a query against `table`.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            params: Vec::new(),
            single: false,
        }
    }

    /// Column projection, including nested relations. Whitespace is dropped.
    pub fn select(mut self, columns: &str) -> Self {
        let compact: String = columns.split_whitespace().collect();
        self.params.push(("select".to_string(), compact));
        self
    }

    /// `column = value`.
    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.params
            .push((column.to_string(), format!("eq.{}", value)));
        self
    }

    /// `column IN (values...)`.
    pub fn in_list(mut self, column: &str, values: &[String]) -> Self {
        let list = values
            .iter()
            .map(|v| quote_value(v))
            .collect::<Vec<_>>()
            .join(",");
        self.params
            .push((column.to_string(), format!("in.({})", list)));
        self
    }

    /// Case-insensitive substring match on any of `columns` (OR of ILIKE predicates).
    ///
    /// Wildcards in `term` match literally, except `*`, which the gateway
    /// always reads as `%` and is sent as a one-character wildcard instead.
    pub fn ilike_any(mut self, columns: &[&str], term: &str) -> Self {
        let pattern = quote_value(&format!("*{}*", escape_ilike(term)));
        let predicates = columns
            .iter()
            .map(|c| format!("{}.ilike.{}", c, pattern))
            .collect::<Vec<_>>()
            .join(",");
        self.params
            .push(("or".to_string(), format!("({})", predicates)));
        self
    }

    /// Order the top-level rows.
    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.params
            .push(("order".to_string(), order_clause(column, ascending)));
        self
    }

    /// Order the rows of an embedded relation.
    pub fn order_embedded(mut self, relation: &str, column: &str, ascending: bool) -> Self {
        self.params.push((
            format!("{}.order", relation),
            order_clause(column, ascending),
        ));
        self
    }

    /// Expect exactly one row; zero or several is an error.
    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    pub fn is_single(&self) -> bool {
        self.single
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Path of the table endpoint.
    pub fn endpoint(&self) -> String {
        format!("/rest/v1/{}", self.table)
    }

    /// URL-encoded query string, as sent on the wire.
    pub fn to_query_string(&self) -> String {
        self.params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// The id this query is pinned to, if any.
    fn id_filter(&self) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == "id")
            .and_then(|(_, v)| v.strip_prefix("eq."))
    }
}

fn order_clause(column: &str, ascending: bool) -> String {
    format!("{}.{}", column, if ascending { "asc" } else { "desc" })
}

/// Escape ILIKE wildcards in a search term.
fn escape_ilike(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        match ch {
            '%' | '_' | '\\' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            '*' => escaped.push('_'),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Double-quote a filter value so commas and parentheses stay literal.
fn quote_value(value: &str) -> String {
    format!(
        "\"{}\"",
        value.replace('\\', "\\\\").replace('"', "\\\"")
    )
}

/// Error payload shared by the data and auth APIs.
///
/// The data API sends `{code, message, details, hint}`; the auth API sends
/// `{code, msg}` or `{error, error_description}` with a numeric code.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorBody {
    pub(crate) fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    pub(crate) fn code(&self) -> Option<String> {
        match &self.code {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    pub(crate) fn message(&self) -> Option<String> {
        self.message
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.error_description.clone())
            .or_else(|| self.error.clone())
    }
}

/// Map a failed data API response to an error.
///
/// A single-row read that matched nothing is `NotFound`. A 401 that is not a
/// row security denial is `Authentication`. Anything else is a `Backend`
/// error carrying the backend's message and code verbatim.
pub(crate) fn map_error(status: StatusCode, body: &str, query: &TableQuery) -> AppError {
    let parsed = ErrorBody::parse(body);
    let code = parsed.code();

    if code.as_deref() == Some(NO_SINGLE_ROW_CODE) {
        return match query.id_filter() {
            Some(id) => AppError::not_found_with_id(query.table_name(), id),
            None => AppError::not_found(query.table_name()),
        };
    }

    if status == StatusCode::UNAUTHORIZED && code.as_deref() != Some(ROW_SECURITY_CODE) {
        return AppError::authentication(
            parsed
                .message()
                .unwrap_or_else(|| "Session expired or invalid. Please sign in again.".to_string()),
        );
    }

    let message = parsed
        .message()
        .unwrap_or_else(|| format!("Request failed ({}): {}", status.as_u16(), body));

    AppError::backend_full(message, code, status.as_u16(), query.endpoint())
}

/// Data API client.
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    client: Client,
    config: PostgrestConfig,
}

impl PostgrestClient {
    /// Create a new data API client.
    pub fn new(config: PostgrestConfig) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();

        let key_value = header::HeaderValue::from_str(&config.anon_key)
            .map_err(|_| AppError::config("Invalid anon key format"))?;
        headers.insert("apikey", key_value);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Full URL for an endpoint path.
    fn api_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    /// Bearer for a call: the caller's access token, or the anon key.
    fn bearer<'a>(&'a self, session: &'a Session) -> &'a str {
        session.access_token().unwrap_or(&self.config.anon_key)
    }

    fn request(&self, method: Method, session: &Session, query: &TableQuery) -> RequestBuilder {
        let mut request = self
            .client
            .request(method, self.api_url(&query.endpoint()))
            .bearer_auth(self.bearer(session))
            .query(query.params());

        if query.is_single() {
            request = request.header(header::ACCEPT, SINGLE_OBJECT_MIME);
        }
        request
    }

    /// Turn a non-success response into an error, keeping the backend's message.
    async fn error_from_response(response: Response, query: &TableQuery) -> AppError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        map_error(status, &body, query)
    }

    /// Handle API response errors and decode the body.
    async fn handle_response<T: DeserializeOwned>(
        response: Response,
        query: &TableQuery,
    ) -> Result<T, AppError> {
        if response.status().is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| AppError::internal(format!("Failed to parse response: {}", e)))
        } else {
            Err(Self::error_from_response(response, query).await)
        }
    }

    /// Run a read.
    pub async fn select<T: DeserializeOwned>(
        &self,
        session: &Session,
        query: &TableQuery,
    ) -> Result<T, AppError> {
        log::debug!("[rest] GET {}?{}", query.endpoint(), query.to_query_string());
        let response = self.request(Method::GET, session, query).send().await?;
        Self::handle_response(response, query).await
    }

    /// Insert `body` and return the inserted representation projected by `query`.
    pub async fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        session: &Session,
        query: &TableQuery,
        body: &B,
    ) -> Result<T, AppError> {
        log::debug!("[rest] POST {}", query.endpoint());
        let response = self
            .request(Method::POST, session, query)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        Self::handle_response(response, query).await
    }

    /// Insert `body` without reading anything back.
    pub async fn insert_minimal<B: Serialize + ?Sized>(
        &self,
        session: &Session,
        query: &TableQuery,
        body: &B,
    ) -> Result<(), AppError> {
        log::debug!("[rest] POST {} (minimal)", query.endpoint());
        let response = self
            .request(Method::POST, session, query)
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from_response(response, query).await)
        }
    }

    /// Update the rows matched by `query` and return their representation.
    pub async fn update<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        session: &Session,
        query: &TableQuery,
        body: &B,
    ) -> Result<T, AppError> {
        log::debug!("[rest] PATCH {}?{}", query.endpoint(), query.to_query_string());
        let response = self
            .request(Method::PATCH, session, query)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        Self::handle_response(response, query).await
    }
}

/// Build the listing query for the given filters.
pub fn ticket_list_query(filter: &TicketFilter) -> TableQuery {
    let mut query = TableQuery::table("tickets")
        .select(TICKET_SELECT)
        .order("created_at", false)
        .order_embedded("comments", "created_at", true);

    if let Some(status) = filter.status {
        query = query.eq("status", status.as_str());
    }

    if let Some(term) = filter.search_term() {
        query = query.ilike_any(&["title", "description"], term);
    }

    query
}

/// Build the single-ticket query.
pub fn ticket_detail_query(id: &str) -> TableQuery {
    TableQuery::table("tickets")
        .select(TICKET_SELECT)
        .eq("id", id)
        .order_embedded("comments", "created_at", true)
        .single()
}

#[async_trait]
impl DataSource for PostgrestClient {
    async fn fetch_tickets(
        &self,
        session: &Session,
        filter: &TicketFilter,
    ) -> Result<Vec<TicketRow>, AppError> {
        self.select(session, &ticket_list_query(filter)).await
    }

    async fn fetch_ticket(&self, session: &Session, id: &str) -> Result<TicketRow, AppError> {
        self.select(session, &ticket_detail_query(id)).await
    }

    async fn fetch_profiles(
        &self,
        session: &Session,
        user_ids: &[String],
    ) -> Result<Vec<Profile>, AppError> {
        let query = TableQuery::table("profiles")
            .select("user_id,display_name,role")
            .in_list("user_id", user_ids);
        self.select(session, &query).await
    }

    async fn insert_ticket(
        &self,
        session: &Session,
        ticket: &TicketInsert,
    ) -> Result<TicketRecord, AppError> {
        let query = TableQuery::table("tickets").select("*").single();
        self.insert(session, &query, ticket).await
    }

    async fn insert_ticket_labels(
        &self,
        session: &Session,
        links: &[TicketLabelLink],
    ) -> Result<(), AppError> {
        let query = TableQuery::table("tickets_labels");
        self.insert_minimal(session, &query, links).await
    }

    async fn update_ticket_status(
        &self,
        session: &Session,
        id: &str,
        status: TicketStatus,
    ) -> Result<TicketRecord, AppError> {
        let query = TableQuery::table("tickets")
            .eq("id", id)
            .select("*")
            .single();
        self.update(session, &query, &serde_json::json!({ "status": status }))
            .await
    }

    async fn insert_comment(
        &self,
        session: &Session,
        comment: &CommentInsert,
    ) -> Result<CommentRecord, AppError> {
        let query = TableQuery::table("comments").select("*").single();
        self.insert(session, &query, comment).await
    }

    async fn fetch_labels(&self, session: &Session) -> Result<Vec<Label>, AppError> {
        let query = TableQuery::table("labels").select("*").order("name", true);
        self.select(session, &query).await
    }

    async fn insert_label(&self, session: &Session, name: &str) -> Result<Label, AppError> {
        let query = TableQuery::table("labels").select("*").single();
        self.insert(session, &query, &serde_json::json!({ "name": name }))
            .await
    }

    async fn update_label(
        &self,
        session: &Session,
        id: &str,
        name: &str,
    ) -> Result<Label, AppError> {
        let query = TableQuery::table("labels")
            .eq("id", id)
            .select("*")
            .single();
        self.update(session, &query, &serde_json::json!({ "name": name }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param<'a>(query: &'a TableQuery, key: &str) -> Option<&'a str> {
        query
            .params()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_list_query_without_filters() {
        let query = ticket_list_query(&TicketFilter::default());

        assert_eq!(query.endpoint(), "/rest/v1/tickets");
        assert_eq!(param(&query, "select"), Some(TICKET_SELECT));
        assert_eq!(param(&query, "order"), Some("created_at.desc"));
        assert_eq!(param(&query, "comments.order"), Some("created_at.asc"));
        assert!(param(&query, "status").is_none());
        assert!(param(&query, "or").is_none());
        assert!(!query.is_single());
    }

    #[test]
    fn test_list_query_with_status_and_search() {
        let filter = TicketFilter {
            status: Some(TicketStatus::Closed),
            search: Some("login".to_string()),
        };
        let query = ticket_list_query(&filter);

        assert_eq!(param(&query, "status"), Some("eq.closed"));
        assert_eq!(
            param(&query, "or"),
            Some(r#"(title.ilike."*login*",description.ilike."*login*")"#)
        );
    }

    #[test]
    fn test_search_term_is_quoted() {
        let query = TableQuery::table("tickets").ilike_any(&["title"], r#"a,(b) "c""#);
        assert_eq!(
            param(&query, "or"),
            Some(r#"(title.ilike."*a,(b) \"c\"*")"#)
        );
    }

    #[test]
    fn test_search_wildcards_match_literally() {
        let filter = TicketFilter {
            status: None,
            search: Some("100%".to_string()),
        };
        let query = ticket_list_query(&filter);
        assert_eq!(
            param(&query, "or"),
            Some(r#"(title.ilike."*100\\%*",description.ilike."*100\\%*")"#)
        );

        assert_eq!(escape_ilike(r"snake_case\path"), r"snake\_case\\path");
        assert_eq!(escape_ilike("a*b"), "a_b");
    }

    #[test]
    fn test_detail_query_expects_single_row() {
        let query = ticket_detail_query("abc");
        assert!(query.is_single());
        assert_eq!(param(&query, "id"), Some("eq.abc"));
        assert_eq!(query.id_filter(), Some("abc"));
    }

    #[test]
    fn test_in_list_and_query_string() {
        let query = TableQuery::table("profiles")
            .select("user_id, display_name, role")
            .in_list("user_id", &["u1".to_string(), "u2".to_string()]);

        assert_eq!(param(&query, "select"), Some("user_id,display_name,role"));
        assert_eq!(param(&query, "user_id"), Some(r#"in.("u1","u2")"#));
        assert_eq!(
            query.to_query_string(),
            "select=user_id%2Cdisplay_name%2Crole&user_id=in.%28%22u1%22%2C%22u2%22%29"
        );
    }

    #[test]
    fn test_error_body_variants() {
        let rest = ErrorBody::parse(
            r#"{"code":"42501","details":null,"hint":null,"message":"new row violates row-level security policy for table \"tickets_labels\""}"#,
        );
        assert_eq!(rest.code().as_deref(), Some("42501"));
        assert!(rest.message().unwrap().contains("row-level security"));

        let auth = ErrorBody::parse(r#"{"code":429,"msg":"Email rate limit exceeded"}"#);
        assert_eq!(auth.code().as_deref(), Some("429"));
        assert_eq!(auth.message().as_deref(), Some("Email rate limit exceeded"));

        let plain = ErrorBody::parse("<html>bad gateway</html>");
        assert!(plain.message().is_none());
    }

    #[test]
    fn test_no_single_row_is_not_found() {
        let body = r#"{"code":"PGRST116","details":"The result contains 0 rows","hint":null,"message":"JSON object requested, multiple (or no) rows returned"}"#;
        let err = map_error(StatusCode::NOT_ACCEPTABLE, body, &ticket_detail_query("abc"));

        match err {
            AppError::NotFound { resource, id } => {
                assert_eq!(resource, "tickets");
                assert_eq!(id.as_deref(), Some("abc"));
            }
            other => panic!("expected not found, got {:?}", other),
        }
    }

    #[test]
    fn test_unauthorized_is_authentication_error() {
        let body = r#"{"code":"PGRST301","details":null,"hint":null,"message":"JWT expired"}"#;
        let err = map_error(
            StatusCode::UNAUTHORIZED,
            body,
            &ticket_list_query(&TicketFilter::default()),
        );

        match err {
            AppError::Authentication { message } => assert_eq!(message, "JWT expired"),
            other => panic!("expected authentication error, got {:?}", other),
        }
    }

    #[test]
    fn test_row_security_denial_is_backend_error() {
        let body = r#"{"code":"42501","details":null,"hint":null,"message":"new row violates row-level security policy for table \"tickets_labels\""}"#;
        let query = TableQuery::table("tickets_labels");
        let err = map_error(StatusCode::UNAUTHORIZED, body, &query);

        assert!(err.is_row_security_violation());
        match err {
            AppError::Backend {
                message,
                code,
                status_code,
                endpoint,
            } => {
                assert_eq!(
                    message,
                    r#"new row violates row-level security policy for table "tickets_labels""#
                );
                assert_eq!(code.as_deref(), Some("42501"));
                assert_eq!(status_code, Some(401));
                assert_eq!(endpoint.as_deref(), Some("/rest/v1/tickets_labels"));
            }
            other => panic!("expected backend error, got {:?}", other),
        }
    }

    #[test]
    fn test_unparseable_body_keeps_status() {
        let err = map_error(
            StatusCode::BAD_GATEWAY,
            "<html>bad gateway</html>",
            &TableQuery::table("labels"),
        );
        assert_eq!(
            err.raw_message(),
            "Request failed (502): <html>bad gateway</html>"
        );
    }

    #[test]
    fn test_client_rejects_invalid_key() {
        let config = PostgrestConfig {
            base_url: "https://x.supabase.co".to_string(),
            anon_key: "bad\nkey".to_string(),
            timeout_secs: 30,
        };
        assert!(matches!(
            PostgrestClient::new(config),
            Err(AppError::Config { .. })
        ));
    }
}
