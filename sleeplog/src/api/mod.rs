//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//! - **[`extractors`]**: Body, query and path extractors that reject with JSON errors
//!
//! # API Structure
//!
//! Everything is served under `/api`:
//!
//! - **Health** (`/api/health`): Liveness, no authentication
//! - **Sleep records** (`/api/sleep-records/*`): The caller's nights, chart series and analysis
//! - **Users** (`/api/users/*`): Account listing and self-service management
//!
//! # OpenAPI Documentation
//!
//! All endpoints are documented with `utoipa` annotations. Interactive documentation is
//! available at `/api/docs` when the server is running.

pub mod extractors;
pub mod handlers;
pub mod models;
