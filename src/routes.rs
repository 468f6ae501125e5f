use std::sync::Arc;

use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use anyhow::anyhow;

use crate::{
    api::attendance,
    auth::{handlers, middleware::auth_middleware},
    config::Config,
    error::AppError,
};

type Limiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

/// Per-IP limiters. Built once so every worker shares the same buckets.
#[derive(Clone)]
pub struct RateLimits {
    login: Limiter,
    bootstrap: Limiter,
    protected: Limiter,
}

fn build_limiter(requests_per_min: u32) -> anyhow::Result<Limiter> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / u64::from(requests_per_min)).max(1);

    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("invalid rate limit: {requests_per_min}/min"))?;

    Ok(Arc::new(Governor::new(&cfg)))
}

impl RateLimits {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            login: build_limiter(config.rate_login_per_min)?,
            bootstrap: build_limiter(config.rate_bootstrap_per_min)?,
            protected: build_limiter(config.rate_protected_per_min)?,
        })
    }
}

pub fn configure(cfg: &mut web::ServiceConfig, api_prefix: &str, limits: &RateLimits) {
    // malformed bodies and queries share the error envelope
    cfg.app_data(
        web::JsonConfig::default().error_handler(|err, _req| AppError::from(err).into()),
    )
    .app_data(web::QueryConfig::default().error_handler(|err, _req| AppError::from(err).into()));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/init-data")
                    .wrap(limits.bootstrap.clone())
                    .route(web::post().to(handlers::init_data)),
            )
            .service(
                web::resource("/check-init")
                    .wrap(limits.bootstrap.clone())
                    .route(web::get().to(handlers::check_init)),
            )
            .service(
                web::resource("/login")
                    .wrap(limits.login.clone())
                    .route(web::post().to(handlers::login)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(limits.protected.clone()) // rate limiting
            .service(
                web::scope("/auth")
                    .route("/change-password", web::post().to(handlers::change_password))
                    .route("/register", web::post().to(handlers::register)),
            )
            .service(
                web::scope("/attendance")
                    .route("/check-in", web::post().to(attendance::check_in))
                    .route("/check-out", web::post().to(attendance::check_out))
                    .route("/absence", web::post().to(attendance::mark_absence))
                    .route("/self", web::get().to(attendance::list_self))
                    .route("/admin", web::get().to(attendance::list_admin))
                    .route("/statuses", web::get().to(attendance::statuses)),
            ),
    );
}
