// src/api.rs
use actix_web::{delete, get, post, web, Error, HttpRequest, HttpResponse};

use crate::app_state::AppState;
use crate::service::{delete_service, download_service, upload_service};

#[post("/objects")]
pub async fn upload(payload: web::Payload, req: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    upload_service(payload, req, app_state).await
}

#[get("/objects/{owner}/{file}")]
pub async fn download(path: web::Path<(String, String)>, req: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let (owner, file) = path.into_inner();
    download_service(owner, file, req, app_state).await
}

#[delete("/objects/{owner}/{file}")]
pub async fn remove(path: web::Path<(String, String)>, req: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let (owner, file) = path.into_inner();
    delete_service(owner, file, req, app_state).await
}

/// Register every object route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(upload).service(download).service(remove);
}
