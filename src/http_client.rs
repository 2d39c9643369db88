use crate::{
    config_server::{ConnectionTest, DeviceStatus, SettingsView},
    network_link::WifiNetwork,
};
use actix_web::HttpResponse;
use anyhow::{Context, Result, ensure};
use log::error;
use reqwest::Response;
use serde::Serialize;

/// Trait for converting service results into HTTP responses
pub trait ServiceResultResponse {
    fn into_response(self) -> HttpResponse;
}

impl ServiceResultResponse for () {
    fn into_response(self) -> HttpResponse {
        HttpResponse::Ok().finish()
    }
}

impl ServiceResultResponse for DeviceStatus {
    fn into_response(self) -> HttpResponse {
        json_response(&self, "DeviceStatus")
    }
}

impl ServiceResultResponse for SettingsView {
    fn into_response(self) -> HttpResponse {
        json_response(&self, "SettingsView")
    }
}

impl ServiceResultResponse for ConnectionTest {
    fn into_response(self) -> HttpResponse {
        json_response(&self, "ConnectionTest")
    }
}

impl ServiceResultResponse for Vec<WifiNetwork> {
    fn into_response(self) -> HttpResponse {
        json_response(&self, "network list")
    }
}

fn json_response<T: Serialize>(value: &T, name: &str) -> HttpResponse {
    match serde_json::to_string(value) {
        Ok(json) => HttpResponse::Ok()
            .content_type("application/json")
            .body(json),
        Err(e) => {
            error!("failed to serialize {name}: {e:#}");
            HttpResponse::InternalServerError().body("failed to serialize response")
        }
    }
}

/// Handle Result and convert the data into a Response
///
/// Successful results are converted through [`ServiceResultResponse`], errors are
/// logged and answered with `500 Internal Server Error`.
///
/// # Arguments
/// * `result` - The Result to handle
/// * `operation` - Context message describing the operation
pub fn handle_service_result<T>(result: Result<T>, operation: &str) -> HttpResponse
where
    T: ServiceResultResponse,
{
    match result {
        Ok(data) => data.into_response(),
        Err(e) => {
            error!("{operation} failed: {e:#}");
            HttpResponse::InternalServerError().body(e.to_string())
        }
    }
}

/// Handle HTTP response by checking status and extracting body
///
/// # Arguments
/// * `res` - The HTTP response to handle
/// * `context_msg` - Context message describing the request (e.g., "GET http://host/api/v1/drives")
///
/// # Returns
/// * `Ok(String)` - The response body if the status is successful
/// * `Err` - If the status is not successful or reading the body fails
pub async fn handle_http_response(res: Response, context_msg: &str) -> Result<String> {
    let status = res.status();
    let body = res.text().await.context("failed to read response body")?;

    ensure!(
        status.is_success(),
        "{context_msg} failed with status {status} and body: {body}"
    );

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{body::to_bytes, http::StatusCode};

    #[actix_web::test]
    async fn unit_result_is_empty_ok() {
        let response = handle_service_result(Ok(()), "noop");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn error_result_is_internal_server_error_with_message() {
        let response = handle_service_result::<()>(Err(anyhow::anyhow!("disk full")), "save");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body())
            .await
            .expect("should read body");
        assert_eq!(body, "disk full");
    }

    #[actix_web::test]
    async fn json_results_set_content_type() {
        let response = handle_service_result(
            Ok(vec![WifiNetwork {
                ssid: "backup-lan".to_string(),
                rssi: -48,
                secure: true,
            }]),
            "scan",
        );
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
    }
}
