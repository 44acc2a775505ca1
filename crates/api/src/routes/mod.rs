//! Route handlers grouped by area.

pub mod admin;
pub mod auth;
pub mod blog;
pub mod cart;
pub mod catalog;
pub mod health;
pub mod instructor;
pub mod metrics;
pub mod orders;
pub mod seo;

use application::Services;
use common::PageRequest;
use serde::Deserialize;

/// Shared application state for route handlers.
pub struct AppState<S> {
    pub services: Services<S>,
}

impl<S> AppState<S> {
    pub fn new(services: Services<S>) -> Self {
        Self { services }
    }
}

/// `?page=&per_page=` on listing endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageQuery {
    pub fn request(&self) -> PageRequest {
        PageRequest::from_query(self.page, self.per_page)
    }
}
