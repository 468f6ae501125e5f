use std::sync::Arc;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer};

mod api;
mod auth;
mod clock;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod models;
mod routes;
mod service;
mod store;
mod utils;

use config::Config;
use db::init_db;

use crate::auth::jwt::TokenKeys;
use crate::clock::{Clock, SystemClock};
use crate::docs::ApiDoc;
use crate::routes::RateLimits;
use crate::service::{
    attendance::AttendanceLedger, authenticator::Authenticator, bootstrap::BootstrapService,
};
use crate::store::Stores;
use crate::utils::email_cache::{EmailCache, warmup_email_cache};
use crate::utils::email_filter::{EmailFilter, warmup_email_filter};
use tracing::{error, info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi; // needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let stores = match &config.database_url {
        Some(url) => Stores::mysql(init_db(url).await?),
        None => {
            warn!("DATABASE_URL not set, state lives in memory and is lost on restart");
            Stores::memory()
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.utc_offset));
    let email_filter = Arc::new(EmailFilter::new());
    let email_cache = Arc::new(EmailCache::new());

    let authenticator = Data::new(Authenticator::new(
        stores.credentials.clone(),
        stores.directory.clone(),
        clock.clone(),
        TokenKeys::new(&config.jwt_secret, config.access_token_ttl),
        email_filter.clone(),
        email_cache.clone(),
    ));
    let bootstrap = Data::new(BootstrapService::new(
        stores.credentials.clone(),
        clock.clone(),
        &config.admin_email_tld,
    ));
    let ledger = Data::new(AttendanceLedger::new(
        stores.attendance.clone(),
        stores.directory.clone(),
        stores.statuses.clone(),
        clock,
    ));
    let limits = RateLimits::from_config(&config)?;

    let credentials_for_filter = stores.credentials.clone();
    actix_web::rt::spawn(async move {
        if let Err(e) = warmup_email_filter(&email_filter, &*credentials_for_filter, 100).await {
            error!(error = ?e, "Failed to warmup email filter");
        }
    });

    let credentials_for_cache = stores.credentials.clone();
    actix_web::rt::spawn(async move {
        if let Err(e) = warmup_email_cache(&email_cache, &*credentials_for_cache, 250).await {
            error!(error = ?e, "Failed to warmup email cache");
        }
    });

    let server_addr = config.server_addr.clone();
    let api_prefix = config.api_prefix.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                // wildcard {_:.*} so the UI's JS/CSS assets resolve
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(authenticator.clone())
            .app_data(bootstrap.clone())
            .app_data(ledger.clone())
            .configure(|cfg| routes::configure(cfg, &api_prefix, &limits))
    })
    .bind(server_addr)?
    .run()
    .await?;

    Ok(())
}
