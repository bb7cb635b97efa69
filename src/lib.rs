//! RetailCRM API client library for Rust.
//!
//! A blocking client for the RetailCRM REST API (v5) with typed requests and
//! responses, client-side request pacing, and a classified error taxonomy
//! for API failures.
//!
//! # Quick Start
//!
//! ```no_run
//! use retailcrm_client::{Client, ErrorKind, OrdersRequest};
//!
//! let client = Client::new("https://demo.retailcrm.pro", "api-key").unwrap();
//!
//! match client.orders().list(&OrdersRequest::default()) {
//!     Ok(page) => println!("{} orders", page.pagination.total_count),
//!     Err(e) if e.is_kind(ErrorKind::InvalidCredentials) => eprintln!("bad key"),
//!     Err(e) => eprintln!("{e}"),
//! }
//! ```

pub mod api_error;
pub mod client;
pub mod error;
pub mod errors_list;
pub mod models;
pub mod rate_limit;

// Re-export the main public types at the crate root for convenience.
pub use api_error::{
    classify, find_api_error, matches_kind, new_generic_error, ApiError, ErrorKind,
};
pub use client::{
    Client, ClientBuilder, CustomersClient, CustomersRequest, InventoriesClient,
    InventoriesRequest, NotesClient, NotesRequest, OrdersClient, OrdersRequest, PaymentsClient,
    TasksClient, TasksRequest, TelephonyClient, UsersClient, UsersRequest,
};
pub use error::{CrmError, Result};
pub use errors_list::ErrorsList;
pub use models::*;
pub use rate_limit::{RateLimiter, RouteClass};
