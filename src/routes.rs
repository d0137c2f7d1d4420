use std::sync::Arc;

use bytes::Bytes;
use poem::http::StatusCode;
use poem::web::{Data, Json, Path, Query};
use poem::{get, handler, post, put, Endpoint, EndpointExt, Response, Route};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::controller::{ImageController, SaveOptions};
use crate::error::ImageError;
use crate::formats::{ImageFit, ImageFormat};
use crate::id::ImageId;
use crate::processor::Resize;
use crate::request::ServeParams;
use crate::response::{error_response, image_response, json_response};

/// Builds the app: signed serving urls under `/images` and the admin
/// api under `/v1`. `defaults` are the ingest options uploads start from.
pub fn app(controller: Arc<ImageController>, defaults: SaveOptions) -> impl Endpoint {
    let admin = Route::new()
        .at("/images", post(upload_image).get(list_images))
        .at("/images/:id", get(get_image_info).delete(delete_image))
        .at("/images/:id/alt", put(set_alt_text))
        .at("/cache/sweep", post(sweep_cache));

    Route::new()
        .at("/images/:file", get(serve_image))
        .nest("/v1", admin)
        .data(controller)
        .data(defaults)
}

#[handler]
pub async fn serve_image(
    Path(file): Path<String>,
    Query(params): Query<ServeParams>,
    Data(controller): Data<&Arc<ImageController>>,
) -> Response {
    let req = match controller.parse_request(&file, &params) {
        Ok(req) => req,
        Err(e) => return error_response(e),
    };

    // Dropped along with this future when the client goes away, which
    // releases any wait on the converter.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    match controller.serve(req, &cancel).await {
        Ok(served) => image_response(served),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    pub format: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fit: Option<String>,
    pub store: Option<String>,
    pub alt_text: Option<String>,

    #[serde(default)]
    pub raw: bool,
}

impl UploadParams {
    fn into_options(self, defaults: SaveOptions) -> Result<SaveOptions, ImageError> {
        let format = match self.format.as_deref() {
            Some(format) => ImageFormat::from_extension(format)?,
            None => defaults.format,
        };

        let max_size = match (self.width, self.height) {
            (None, None) => defaults.max_size,
            (Some(w), Some(h)) if w > 0 && h > 0 => {
                let fit = match self.fit.as_deref() {
                    Some(fit) => ImageFit::from_token(fit)?,
                    None => ImageFit::default(),
                };
                Some(Resize::new(w, h, fit))
            },
            _ => return Err(ImageError::bad_request("width and height must both be given and non-zero")),
        };

        Ok(SaveOptions {
            format,
            max_size,
            store: self.store.or(defaults.store),
            alt_text: self.alt_text,
            raw: self.raw,
            store_metadata: defaults.store_metadata,
        })
    }
}

#[handler]
pub async fn upload_image(
    Query(params): Query<UploadParams>,
    Data(controller): Data<&Arc<ImageController>>,
    Data(defaults): Data<&SaveOptions>,
    body: Bytes,
) -> Response {
    let options = match params.into_options(defaults.clone()) {
        Ok(options) => options,
        Err(e) => return error_response(e),
    };

    let record = match controller.save(body, options).await {
        Ok(record) => record,
        Err(e) => return error_response(e),
    };

    match controller.image(record.id).await {
        Ok(image) => json_response(StatusCode::OK, Some(json!(image))),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Comma separated image ids.
    pub ids: String,
}

#[handler]
pub async fn list_images(
    Query(params): Query<ListParams>,
    Data(controller): Data<&Arc<ImageController>>,
) -> Response {
    let ids = match params
        .ids
        .split(',')
        .filter(|v| !v.is_empty())
        .map(|v| v.parse::<ImageId>())
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(ids) => ids,
        Err(e) => return error_response(e),
    };

    match controller.images(&ids).await {
        Ok(images) => json_response(StatusCode::OK, Some(json!(images))),
        Err(e) => error_response(e),
    }
}

#[handler]
pub async fn get_image_info(
    Path(id): Path<String>,
    Data(controller): Data<&Arc<ImageController>>,
) -> Response {
    let result = match id.parse::<ImageId>() {
        Ok(id) => controller.image(id).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(image) => json_response(StatusCode::OK, Some(json!(image))),
        Err(e) => error_response(e),
    }
}

#[handler]
pub async fn delete_image(
    Path(id): Path<String>,
    Data(controller): Data<&Arc<ImageController>>,
) -> Response {
    let result = match id.parse::<ImageId>() {
        Ok(id) => controller.delete(id).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => json_response(StatusCode::OK, None),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct AltTextPayload {
    pub alt_text: Option<String>,
}

#[handler]
pub async fn set_alt_text(
    Path(id): Path<String>,
    Json(payload): Json<AltTextPayload>,
    Data(controller): Data<&Arc<ImageController>>,
) -> Response {
    let result = match id.parse::<ImageId>() {
        Ok(id) => controller.set_alt_text(id, payload.alt_text).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => json_response(StatusCode::OK, None),
        Err(e) => error_response(e),
    }
}

#[handler]
pub async fn sweep_cache(Data(controller): Data<&Arc<ImageController>>) -> Response {
    match controller.sweep_cache().await {
        Ok(removed) => json_response(
            StatusCode::OK,
            Some(json!({
                "removed": removed,
            })),
        ),
        Err(e) => error_response(e),
    }
}
