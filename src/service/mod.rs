//service/mod.rs
pub mod storage_service;
pub mod user_context;

use actix_web::error::ErrorBadRequest;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use futures::{future, stream, Stream, StreamExt};
use log::{debug, info, warn};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::app_state::AppState;
use crate::bridge::{UploadHeader, UploadMessage};
use crate::service::user_context::{OwnerContext, METADATA_HEADER_PREFIX};
use crate::storage::{StorageError, StoragePath};

fn header_value(req: &HttpRequest, name: &str) -> Result<Option<String>, Error> {
    match req.headers().get(name) {
        Some(value) => value
            .to_str()
            .map(|v| Some(v.to_string()))
            .map_err(|_| ErrorBadRequest(format!("Invalid {} header value", name))),
        None => Ok(None),
    }
}

fn header_handler(req: &HttpRequest) -> Result<OwnerContext, Error> {
    let owner_id = header_value(req, "User")?.ok_or_else(|| ErrorBadRequest("Missing User header"))?;

    let mut context = OwnerContext::new(owner_id);
    context.title = header_value(req, "Title")?;
    context.client_path = header_value(req, "Client-Path")?;

    for (header_name, header_value) in req.headers() {
        if let Some(key) = header_name.as_str().strip_prefix(METADATA_HEADER_PREFIX) {
            if let Ok(value_str) = header_value.to_str() {
                context.set_metadata(key.to_string(), value_str.to_string());
            }
        }
    }

    Ok(context)
}

/// Future that carries the `owner` MDC entry with it.
///
/// The MDC is thread-local and handlers interleave at every await, so the
/// entry is set for the duration of each poll only.
struct WithOwner<F> {
    owner: String,
    inner: Pin<Box<F>>,
}

impl<F: Future> Future for WithOwner<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<F::Output> {
        log_mdc::insert("owner", &self.owner);
        let result = self.inner.as_mut().poll(cx);
        log_mdc::remove("owner");
        result
    }
}

fn with_owner<F: Future>(owner: String, inner: F) -> WithOwner<F> {
    WithOwner {
        owner,
        inner: Box::pin(inner),
    }
}

/// Marks the stream error raised when a body passes `server.max_payload_size`
#[derive(Debug, thiserror::Error)]
#[error("request body exceeds {limit} bytes")]
struct PayloadLimitExceeded {
    limit: u64,
}

/// Header message followed by one message per request body chunk.
///
/// The body is cut off with an error once more than `limit` bytes arrived.
fn payload_messages(
    header: UploadHeader,
    payload: web::Payload,
    limit: u64,
) -> impl Stream<Item = io::Result<UploadMessage>> + Unpin {
    let mut received = 0u64;
    let body = payload.map(move |chunk| -> io::Result<UploadMessage> {
        let chunk = chunk.map_err(|e| io::Error::other(e.to_string()))?;
        received += chunk.len() as u64;
        if received > limit {
            return Err(io::Error::other(PayloadLimitExceeded { limit }));
        }
        Ok(UploadMessage::chunk(chunk))
    });
    Box::pin(stream::once(future::ready(Ok(UploadMessage::header(header)))).chain(body))
}

fn is_payload_limit(error: &io::Error) -> bool {
    error
        .get_ref()
        .is_some_and(|inner| inner.is::<PayloadLimitExceeded>())
}

/// Parse `{owner}/{file}` and check it belongs to the requesting owner.
///
/// Another owner's object is reported as missing rather than forbidden.
fn owned_path(context: &OwnerContext, owner: &str, file: &str) -> Result<StoragePath, StorageError> {
    let path = StoragePath::parse(&format!("{}/{}", owner, file))?;
    if path.owner_id() != context.owner_id {
        warn!("Owner {} asked for object of {}", context.owner_id, path.owner_id());
        return Err(StorageError::NotFound(path.to_string()));
    }
    Ok(path)
}

pub async fn upload_service(payload: web::Payload, req: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let context = header_handler(&req)?;
    let owner = context.owner_id.clone();

    with_owner(owner, async move {
        let header = context
            .upload_header()
            .ok_or_else(|| ErrorBadRequest("Missing Title header"))?;
        debug!("Upload called for owner: {}, title: {:?}", context.owner_id, header.title);

        let limit = app_state.config.server.max_payload_size;
        let receipt = app_state
            .storage_service
            .upload(&context.owner_id, payload_messages(header, payload, limit))
            .await
            .map_err(|e| match e {
                StorageError::Stream(ref source) if is_payload_limit(source) => {
                    warn!("Upload for {} rejected: body exceeds {} bytes", context.owner_id, limit);
                    StorageError::PayloadTooLarge(limit)
                }
                other => other,
            })?;

        info!("Stored {} ({} bytes)", receipt.storage_path, receipt.size);
        Ok::<_, Error>(HttpResponse::Ok().json(receipt))
    })
    .await
}

pub async fn download_service(owner: String, file: String, req: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let context = header_handler(&req)?;
    let tag = context.owner_id.clone();

    with_owner(tag, async move {
        let path = owned_path(&context, &owner, &file)?;
        debug!("Download called for {}", path);

        let blocks = app_state.storage_service.download(&path).await?;
        Ok::<_, Error>(HttpResponse::Ok()
            .content_type("application/octet-stream")
            .streaming(blocks))
    })
    .await
}

pub async fn delete_service(owner: String, file: String, req: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let context = header_handler(&req)?;
    let tag = context.owner_id.clone();

    with_owner(tag, async move {
        let path = owned_path(&context, &owner, &file)?;

        app_state.storage_service.delete(&path).await?;
        info!("Deleted {}", path);
        Ok::<_, Error>(HttpResponse::NoContent().finish())
    })
    .await
}
