//! OpenAPI documentation for the `/api` surface.
//!
//! [`ApiDoc`] collects every handler's `#[utoipa::path]` annotation. The generated document is
//! served at `/api/openapi.json` and rendered with RapiDoc at `/api/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

use crate::api;
use crate::intervals::{AxisTick, ChartAxes, ChartAxis, DerivedChartPoint};

/// Security scheme for the identity header set by the auth proxy.
struct ProxyHeaderSecurityAddon;

impl Modify for ProxyHeaderSecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "X-Sleeplog-User-Email".to_string(),
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "x-sleeplog-user-email",
                    "Email of the signed-in user, set by the trusted auth proxy in front of this service. \
                     The header name is configurable with `auth.proxy_header.header_name`.",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Sleeplog API",
        description = "Record nightly sleep and wake times, chart recent nights, and ask a language model about the pattern."
    ),
    servers((url = "/api", description = "Sleeplog API server")),
    modifiers(&ProxyHeaderSecurityAddon),
    paths(
        api::handlers::health::health,
        api::handlers::sleep_records::list_sleep_records,
        api::handlers::sleep_records::create_sleep_record,
        api::handlers::sleep_records::update_sleep_record,
        api::handlers::sleep_records::delete_sleep_record,
        api::handlers::sleep_records::get_sleep_chart,
        api::handlers::sleep_records::analyze_sleep_records,
        api::handlers::users::list_users,
        api::handlers::users::create_user,
        api::handlers::users::get_user,
        api::handlers::users::update_user,
        api::handlers::users::delete_user,
    ),
    components(schemas(
        api::handlers::health::HealthResponse,
        api::models::sleep_records::SleepRecordCreate,
        api::models::sleep_records::SleepRecordUpdate,
        api::models::sleep_records::SleepRecordResponse,
        api::models::sleep_records::ChartResponse,
        api::models::sleep_records::AnalysisResponse,
        api::models::users::Role,
        api::models::users::UserCreate,
        api::models::users::UserUpdate,
        api::models::users::UserResponse,
        DerivedChartPoint,
        ChartAxes,
        ChartAxis,
        AxisTick,
    )),
    tags(
        (name = "health", description = "Liveness check"),
        (name = "sleep-records", description = "The caller's logged nights.

A night is stored as a date plus bedtime and wake time in `HH:MM`. A wake time earlier than the bedtime \
means the next morning. Durations and chart values are derived on read and never stored."),
        (name = "users", description = "Accounts. Every user may manage their own; admins may manage everyone's."),
    )
)]
pub struct ApiDoc;
