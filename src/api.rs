use crate::{
    config_server::{ConfigServerHandle, SaveSettingsRequest},
    http_client::handle_service_result,
};
use actix_web::{HttpResponse, Responder, web};
use log::{debug, warn};
use serde_valid::Validate;

/// HTTP handlers of the local configuration server
#[derive(Clone)]
pub struct Api {
    pub config_server: ConfigServerHandle,
}

impl Api {
    pub fn new(config_server: ConfigServerHandle) -> Self {
        Api { config_server }
    }

    /// Register all configuration routes
    pub fn routes(cfg: &mut web::ServiceConfig) {
        cfg.route("/", web::get().to(Api::index))
            .route("/save", web::post().to(Api::save))
            .route("/status", web::get().to(Api::status))
            .route("/reboot", web::post().to(Api::reboot))
            .route("/reset", web::post().to(Api::reset))
            .route("/scan", web::get().to(Api::scan))
            .route("/test-connection", web::get().to(Api::test_connection))
            .route("/version", web::get().to(Api::version));
    }

    pub async fn index(api: web::Data<Self>) -> impl Responder {
        debug!("index() called");
        handle_service_result(api.config_server.settings().await, "settings")
    }

    pub async fn save(body: web::Json<SaveSettingsRequest>, api: web::Data<Self>) -> impl Responder {
        debug!("save() called");

        let request = body.into_inner();
        if let Err(e) = request.validate() {
            warn!("rejected settings: {e}");
            return HttpResponse::BadRequest().body(e.to_string());
        }

        handle_service_result(api.config_server.save(request).await, "save")
    }

    pub async fn status(api: web::Data<Self>) -> impl Responder {
        debug!("status() called");
        handle_service_result(api.config_server.status().await, "status")
    }

    pub async fn reboot(api: web::Data<Self>) -> impl Responder {
        debug!("reboot() called");
        handle_service_result(api.config_server.reboot().await, "reboot")
    }

    pub async fn reset(api: web::Data<Self>) -> impl Responder {
        debug!("reset() called");
        handle_service_result(api.config_server.reset().await, "reset")
    }

    pub async fn scan(api: web::Data<Self>) -> impl Responder {
        debug!("scan() called");
        handle_service_result(api.config_server.scan().await, "scan")
    }

    pub async fn test_connection(api: web::Data<Self>) -> impl Responder {
        debug!("test_connection() called");
        handle_service_result(api.config_server.test_connection().await, "test_connection")
    }

    pub async fn version() -> impl Responder {
        HttpResponse::Ok().body(env!("CARGO_PKG_VERSION"))
    }
}
