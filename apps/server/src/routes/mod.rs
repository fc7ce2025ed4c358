use actix_web::web;

use crate::error::ApiError;

mod api;
mod health;

/// Register every route plus the query-string error format
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    );

    health::routes(cfg);
    api::routes(cfg);
}
