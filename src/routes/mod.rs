pub mod auth;
pub mod coaches;
pub mod documents;
pub mod health;
pub mod leads;
pub mod my_tasks;
pub mod otp;
pub mod tasks;
pub mod users;

use actix_web::web;

use crate::error::AppError;

// Erreurs d'extraction (JSON, chemin, query) au même format JSON que AppError
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| AppError::Validation(err.to_string()).into())
}

fn path_config() -> web::PathConfig {
    web::PathConfig::default()
        .error_handler(|err, _req| AppError::Validation(err.to_string()).into())
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| AppError::Validation(err.to_string()).into())
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(json_config())
            .app_data(path_config())
            .app_data(query_config())
            .service(health::health_check)
            .configure(auth::auth_routes)
            .configure(otp::otp_routes)
            .configure(users::users_routes)
            .configure(coaches::coaches_routes)
            .configure(leads::leads_routes)
            .configure(tasks::tasks_routes)
            .configure(my_tasks::my_tasks_routes)
            .configure(documents::documents_routes)
    );
}
