use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{instrument, Span};

use crate::api_error::{classify, new_generic_error};
use crate::error::{CrmError, Result};
use crate::models::*;
use crate::rate_limit::{RateLimiter, RouteClass};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

const API_PREFIX: &str = "/api";
const VERSIONED_PREFIX: &str = "/api/v5";
const API_KEY_HEADER: &str = "x-api-key";

// ---------------------------------------------------------------------------
// Query construction
// ---------------------------------------------------------------------------

/// Ordered query-string pairs with the API's `filter[...]` conventions.
#[derive(Debug, Default)]
struct Query(Vec<(String, String)>);

impl Query {
    fn push(&mut self, key: impl Into<String>, value: impl Display) {
        self.0.push((key.into(), value.to_string()));
    }

    fn push_opt<V: Display>(&mut self, key: &str, value: Option<V>) {
        if let Some(v) = value {
            self.push(key, v);
        }
    }

    fn filter<V: Display>(&mut self, field: &str, value: Option<V>) {
        self.push_opt(&format!("filter[{field}]"), value);
    }

    fn filter_list<V: Display>(&mut self, field: &str, values: &[V]) {
        for v in values {
            self.push(format!("filter[{field}][]"), v);
        }
    }

    fn paging(&mut self, limit: Option<u32>, page: Option<u32>) {
        self.push_opt("limit", limit);
        self.push_opt("page", page);
    }
}

fn encode<T: Serialize + ?Sized>(entity: &T) -> Result<String> {
    serde_json::to_string(entity).map_err(CrmError::Encode)
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Status and body of a completed HTTP exchange.
struct RawResponse {
    status: u16,
    body: Vec<u8>,
}

/// Shared HTTP plumbing used by every sub-client.
struct BaseClient {
    base_url: String,
    http: HttpClient,
    limiter: Option<Arc<RateLimiter>>,
}

impl BaseClient {
    fn url(&self, path: &str, versioned: bool) -> String {
        let prefix = if versioned { VERSIONED_PREFIX } else { API_PREFIX };
        format!("{}{prefix}{path}", self.base_url)
    }

    fn pace(&self, path: &str) {
        if let Some(limiter) = &self.limiter {
            limiter.acquire(RouteClass::for_path(path));
        }
    }

    #[instrument(
        name = "crm_request",
        skip(self, query),
        fields(
            http.method = "GET",
            http.url = tracing::field::Empty,
            http.status_code = tracing::field::Empty,
        )
    )]
    fn get(&self, path: &str, query: &Query, versioned: bool) -> Result<RawResponse> {
        self.pace(path);
        let url = self.url(path, versioned);
        Span::current().record("http.url", url.as_str());

        let response = self.http.get(&url).query(&query.0).send()?;
        Self::read(response)
    }

    #[instrument(
        name = "crm_request",
        skip(self, form),
        fields(
            http.method = "POST",
            http.url = tracing::field::Empty,
            http.status_code = tracing::field::Empty,
        )
    )]
    fn post(&self, path: &str, form: &[(&str, String)]) -> Result<RawResponse> {
        self.pace(path);
        let url = self.url(path, true);
        Span::current().record("http.url", url.as_str());

        let response = self.http.post(&url).form(form).send()?;
        Self::read(response)
    }

    fn read(response: reqwest::blocking::Response) -> Result<RawResponse> {
        let status = response.status().as_u16();
        Span::current().record("http.status_code", status);
        let body = response.bytes()?.to_vec();
        Ok(RawResponse { status, body })
    }

    /// Map a raw response onto a typed value or a classified error.
    ///
    /// 5xx responses other than 503 carry no usable body and become generic
    /// errors; every other 4xx/5xx body goes through [`classify`].
    fn decode<T: DeserializeOwned>(&self, response: RawResponse) -> Result<T> {
        let RawResponse { status, body } = response;

        if status >= 500 && status != 503 {
            tracing::warn!(status, "server error");
            return Err(
                new_generic_error(format!("HTTP request error. Status code: {status}.")).into(),
            );
        }

        if status >= 400 {
            let err = classify(&body).map_err(CrmError::Decode)?;
            return Err(err.into());
        }

        serde_json::from_slice(&body).map_err(CrmError::Decode)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &Query) -> Result<T> {
        let response = self.get(path, query, true)?;
        self.decode(response)
    }

    fn post_json<T: DeserializeOwned>(&self, path: &str, form: &[(&str, String)]) -> Result<T> {
        let response = self.post(path, form)?;
        self.decode(response)
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Builder for configuring a [`Client`].
pub struct ClientBuilder {
    url: String,
    api_key: String,
    timeout: Duration,
    user_agent: String,
    rate_limit: bool,
}

impl ClientBuilder {
    fn new(url: &str, api_key: &str) -> Self {
        Self {
            url: url.trim().trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: concat!("retailcrm-client/", env!("CARGO_PKG_VERSION")).to_string(),
            rate_limit: true,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    /// Enable or disable client-side request pacing.
    pub fn rate_limit(mut self, enabled: bool) -> Self {
        self.rate_limit = enabled;
        self
    }

    /// Build the [`Client`].
    ///
    /// Fails when the URL is not an `http(s)` URL, the API key is empty, or
    /// the HTTP client cannot be constructed.
    pub fn build(self) -> Result<Client> {
        if !(self.url.starts_with("https://") || self.url.starts_with("http://")) {
            return Err(CrmError::InvalidConfig {
                message: format!("URL must start with http:// or https://, got {:?}", self.url),
            });
        }
        if self.api_key.is_empty() {
            return Err(CrmError::InvalidConfig {
                message: "API key must not be empty".into(),
            });
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut key = HeaderValue::from_str(&self.api_key).map_err(|e| {
            CrmError::InvalidConfig {
                message: format!("Invalid API key header value: {e}"),
            }
        })?;
        key.set_sensitive(true);
        headers.insert(HeaderName::from_static(API_KEY_HEADER), key);

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(self.timeout)
            .user_agent(self.user_agent)
            .build()?;

        Ok(Client {
            base: BaseClient {
                base_url: self.url,
                http,
                limiter: self.rate_limit.then(|| Arc::new(RateLimiter::new())),
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Public client
// ---------------------------------------------------------------------------

/// Main entry point for the RetailCRM API.
///
/// ```no_run
/// use retailcrm_client::{Client, CustomersRequest};
///
/// let client = Client::new("https://demo.retailcrm.pro", "api-key").unwrap();
/// let page = client.customers().list(&CustomersRequest::default()).unwrap();
/// for c in &page.customers {
///     println!("{:?} {:?}", c.id, c.email);
/// }
/// ```
pub struct Client {
    base: BaseClient,
}

impl Client {
    /// Create a client with default settings.
    ///
    /// * `url`     – account root, e.g. `https://demo.retailcrm.pro`
    /// * `api_key` – key sent in the `X-API-KEY` header
    pub fn new(url: &str, api_key: &str) -> Result<Self> {
        Self::builder(url, api_key).build()
    }

    pub fn builder(url: &str, api_key: &str) -> ClientBuilder {
        ClientBuilder::new(url, api_key)
    }

    pub fn base_url(&self) -> &str {
        &self.base.base_url
    }

    /// API versions available on the account.
    pub fn api_versions(&self) -> Result<ApiVersionsResponse> {
        let response = self.base.get("/api-versions", &Query::default(), false)?;
        self.base.decode(response)
    }

    /// Scopes and sites the configured key grants access to.
    pub fn credentials(&self) -> Result<CredentialsResponse> {
        let response = self.base.get("/credentials", &Query::default(), false)?;
        self.base.decode(response)
    }

    // -- sub-client accessors ------------------------------------------------

    pub fn customers(&self) -> CustomersClient<'_> {
        CustomersClient { base: &self.base }
    }

    pub fn orders(&self) -> OrdersClient<'_> {
        OrdersClient { base: &self.base }
    }

    pub fn users(&self) -> UsersClient<'_> {
        UsersClient { base: &self.base }
    }

    pub fn tasks(&self) -> TasksClient<'_> {
        TasksClient { base: &self.base }
    }

    pub fn notes(&self) -> NotesClient<'_> {
        NotesClient { base: &self.base }
    }

    pub fn payments(&self) -> PaymentsClient<'_> {
        PaymentsClient { base: &self.base }
    }

    pub fn inventories(&self) -> InventoriesClient<'_> {
        InventoriesClient { base: &self.base }
    }

    pub fn telephony(&self) -> TelephonyClient<'_> {
        TelephonyClient { base: &self.base }
    }
}

fn entity_form(
    field: &'static str,
    json: String,
    site: Option<&str>,
) -> Vec<(&'static str, String)> {
    let mut form = vec![(field, json)];
    if let Some(site) = site {
        form.push(("site", site.to_string()));
    }
    form
}

fn lookup_query(by: By, site: Option<&str>) -> Query {
    let mut query = Query::default();
    query.push("by", by.as_str());
    query.push_opt("site", site);
    query
}

// ===========================================================================
// Sub-clients
// ===========================================================================

// ---- Customers ------------------------------------------------------------

pub struct CustomersClient<'a> {
    base: &'a BaseClient,
}

/// Filter for listing customers.
#[derive(Debug, Clone, Default)]
pub struct CustomersRequest {
    pub ids: Vec<i64>,
    pub external_ids: Vec<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub manager: Option<String>,
    pub vip: Option<bool>,
    pub sites: Vec<String>,
    pub limit: Option<u32>,
    pub page: Option<u32>,
}

impl CustomersRequest {
    fn to_query(&self) -> Query {
        let mut query = Query::default();
        query.filter_list("ids", &self.ids);
        query.filter_list("externalIds", &self.external_ids);
        query.filter("name", self.name.as_deref());
        query.filter("email", self.email.as_deref());
        query.filter("manager", self.manager.as_deref());
        query.filter("vip", self.vip.map(u8::from));
        query.filter_list("sites", &self.sites);
        query.paging(self.limit, self.page);
        query
    }
}

impl CustomersClient<'_> {
    /// List customers matching the filter.
    pub fn list(&self, request: &CustomersRequest) -> Result<CustomersResponse> {
        self.base.get_json("/customers", &request.to_query())
    }

    /// Get a single customer by id or external id.
    pub fn get(&self, id: &str, by: By, site: Option<&str>) -> Result<CustomerResponse> {
        self.base
            .get_json(&format!("/customers/{id}"), &lookup_query(by, site))
    }

    /// Create a customer, returning its new id.
    pub fn create(&self, customer: &Customer, site: Option<&str>) -> Result<IdResponse> {
        let form = entity_form("customer", encode(customer)?, site);
        self.base.post_json("/customers/create", &form)
    }

    /// Edit a customer identified by its `id` or `externalId` field.
    pub fn edit(&self, customer: &Customer, by: By, site: Option<&str>) -> Result<IdResponse> {
        let id = match by {
            By::Id => customer.id.map(|id| id.to_string()),
            By::ExternalId => customer.external_id.clone(),
        }
        .ok_or_else(|| CrmError::InvalidConfig {
            message: format!("customer has no {} to edit by", by.as_str()),
        })?;

        let mut form = entity_form("customer", encode(customer)?, site);
        form.push(("by", by.as_str().to_string()));
        self.base.post_json(&format!("/customers/{id}/edit"), &form)
    }
}

// ---- Orders ---------------------------------------------------------------

pub struct OrdersClient<'a> {
    base: &'a BaseClient,
}

/// Filter for listing orders.
#[derive(Debug, Clone, Default)]
pub struct OrdersRequest {
    pub ids: Vec<i64>,
    pub external_ids: Vec<String>,
    pub numbers: Vec<String>,
    pub customer_id: Option<i64>,
    pub email: Option<String>,
    pub extended_status: Vec<String>,
    pub sites: Vec<String>,
    pub created_at_from: Option<String>,
    pub created_at_to: Option<String>,
    pub limit: Option<u32>,
    pub page: Option<u32>,
}

impl OrdersRequest {
    fn to_query(&self) -> Query {
        let mut query = Query::default();
        query.filter_list("ids", &self.ids);
        query.filter_list("externalIds", &self.external_ids);
        query.filter_list("numbers", &self.numbers);
        query.filter("customerId", self.customer_id);
        query.filter("email", self.email.as_deref());
        query.filter_list("extendedStatus", &self.extended_status);
        query.filter_list("sites", &self.sites);
        query.filter("createdAtFrom", self.created_at_from.as_deref());
        query.filter("createdAtTo", self.created_at_to.as_deref());
        query.paging(self.limit, self.page);
        query
    }
}

impl OrdersClient<'_> {
    /// List orders matching the filter.
    pub fn list(&self, request: &OrdersRequest) -> Result<OrdersResponse> {
        self.base.get_json("/orders", &request.to_query())
    }

    /// Get a single order by id or external id.
    pub fn get(&self, id: &str, by: By, site: Option<&str>) -> Result<OrderResponse> {
        self.base
            .get_json(&format!("/orders/{id}"), &lookup_query(by, site))
    }

    /// Create an order, returning its new id.
    pub fn create(&self, order: &Order, site: Option<&str>) -> Result<IdResponse> {
        let form = entity_form("order", encode(order)?, site);
        self.base.post_json("/orders/create", &form)
    }
}

// ---- Users ----------------------------------------------------------------

pub struct UsersClient<'a> {
    base: &'a BaseClient,
}

/// Filter for listing users.
#[derive(Debug, Clone, Default)]
pub struct UsersRequest {
    pub email: Option<String>,
    pub active: Option<bool>,
    pub is_manager: Option<bool>,
    pub groups: Vec<String>,
    pub limit: Option<u32>,
    pub page: Option<u32>,
}

impl UsersRequest {
    fn to_query(&self) -> Query {
        let mut query = Query::default();
        query.filter("email", self.email.as_deref());
        query.filter("active", self.active.map(u8::from));
        query.filter("isManager", self.is_manager.map(u8::from));
        query.filter_list("groups", &self.groups);
        query.paging(self.limit, self.page);
        query
    }
}

impl UsersClient<'_> {
    /// List users matching the filter.
    pub fn list(&self, request: &UsersRequest) -> Result<UsersResponse> {
        self.base.get_json("/users", &request.to_query())
    }

    /// Get a single user by id.
    pub fn get(&self, id: i64) -> Result<UserResponse> {
        self.base
            .get_json(&format!("/users/{id}"), &Query::default())
    }
}

// ---- Tasks ----------------------------------------------------------------

pub struct TasksClient<'a> {
    base: &'a BaseClient,
}

/// Filter for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TasksRequest {
    pub performers: Vec<i64>,
    pub status: Option<String>,
    pub text: Option<String>,
    pub limit: Option<u32>,
    pub page: Option<u32>,
}

impl TasksRequest {
    fn to_query(&self) -> Query {
        let mut query = Query::default();
        query.filter_list("performers", &self.performers);
        query.filter("status", self.status.as_deref());
        query.filter("text", self.text.as_deref());
        query.paging(self.limit, self.page);
        query
    }
}

impl TasksClient<'_> {
    /// List tasks matching the filter.
    pub fn list(&self, request: &TasksRequest) -> Result<TasksResponse> {
        self.base.get_json("/tasks", &request.to_query())
    }

    /// Get a single task by id.
    pub fn get(&self, id: i64) -> Result<TaskResponse> {
        self.base
            .get_json(&format!("/tasks/{id}"), &Query::default())
    }

    /// Create a task, returning its new id.
    pub fn create(&self, task: &Task, site: Option<&str>) -> Result<IdResponse> {
        let form = entity_form("task", encode(task)?, site);
        self.base.post_json("/tasks/create", &form)
    }
}

// ---- Customer notes -------------------------------------------------------

pub struct NotesClient<'a> {
    base: &'a BaseClient,
}

/// Filter for listing customer notes.
#[derive(Debug, Clone, Default)]
pub struct NotesRequest {
    pub ids: Vec<i64>,
    pub customer_ids: Vec<i64>,
    pub customer_external_ids: Vec<String>,
    pub text: Option<String>,
    pub limit: Option<u32>,
    pub page: Option<u32>,
}

impl NotesRequest {
    fn to_query(&self) -> Query {
        let mut query = Query::default();
        query.filter_list("ids", &self.ids);
        query.filter_list("customerIds", &self.customer_ids);
        query.filter_list("customerExternalIds", &self.customer_external_ids);
        query.filter("text", self.text.as_deref());
        query.paging(self.limit, self.page);
        query
    }
}

impl NotesClient<'_> {
    /// List customer notes matching the filter.
    pub fn list(&self, request: &NotesRequest) -> Result<NotesResponse> {
        self.base.get_json("/customers/notes", &request.to_query())
    }

    /// Attach a note to a customer.
    pub fn create(&self, note: &Note, site: Option<&str>) -> Result<IdResponse> {
        let form = entity_form("note", encode(note)?, site);
        self.base.post_json("/customers/notes/create", &form)
    }
}

// ---- Payments -------------------------------------------------------------

pub struct PaymentsClient<'a> {
    base: &'a BaseClient,
}

impl PaymentsClient<'_> {
    /// Add a payment to an order.
    pub fn create(&self, payment: &Payment, site: Option<&str>) -> Result<IdResponse> {
        let form = entity_form("payment", encode(payment)?, site);
        self.base.post_json("/orders/payments/create", &form)
    }

    /// Delete a payment by id.
    pub fn delete(&self, id: i64) -> Result<SuccessResponse> {
        let form = [("id", id.to_string())];
        self.base
            .post_json(&format!("/orders/payments/{id}/delete"), &form)
    }
}

// ---- Store inventories ----------------------------------------------------

pub struct InventoriesClient<'a> {
    base: &'a BaseClient,
}

/// Filter for listing offer stock levels.
#[derive(Debug, Clone, Default)]
pub struct InventoriesRequest {
    pub ids: Vec<i64>,
    pub sites: Vec<String>,
    pub product_active: Option<bool>,
    pub details: Option<bool>,
    pub limit: Option<u32>,
    pub page: Option<u32>,
}

impl InventoriesRequest {
    fn to_query(&self) -> Query {
        let mut query = Query::default();
        query.filter_list("ids", &self.ids);
        query.filter_list("sites", &self.sites);
        query.filter("productActive", self.product_active.map(u8::from));
        query.filter("details", self.details.map(u8::from));
        query.paging(self.limit, self.page);
        query
    }
}

impl InventoriesClient<'_> {
    /// List stock levels per offer.
    pub fn list(&self, request: &InventoriesRequest) -> Result<InventoriesResponse> {
        self.base.get_json("/store/inventories", &request.to_query())
    }

    /// Upload stock levels for a batch of offers.
    pub fn upload(
        &self,
        offers: &[OfferInventory],
        site: Option<&str>,
    ) -> Result<InventoriesUploadResponse> {
        let form = entity_form("offers", encode(offers)?, site);
        self.base.post_json("/store/inventories/upload", &form)
    }
}

// ---- Telephony ------------------------------------------------------------

/// Telephony routes, paced by their own request budget.
pub struct TelephonyClient<'a> {
    base: &'a BaseClient,
}

impl TelephonyClient<'_> {
    /// Find the manager responsible for a phone number.
    ///
    /// With `details` the response also carries the matched customer and
    /// their open orders.
    pub fn manager(&self, phone: &str, details: bool) -> Result<TelephonyManagerResponse> {
        let mut query = Query::default();
        query.push("phone", phone);
        query.push("details", u8::from(details));
        self.base.get_json("/telephony/manager", &query)
    }
}
