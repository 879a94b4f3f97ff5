use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Extension, Multipart, Path, Request},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use headers::{Authorization, ContentType, HeaderMapExt, authorization::Bearer};
use mime::Mime;
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use crate::config::AppConfig;
use crate::errors::{ApiError, UploadError};
use crate::upload::{
    Category, DocumentStore, StoredFileReference, UploadRequest, normalize_prefix,
};

/// References produced by a document submission, keyed by record column.
#[derive(Debug, Default, Serialize)]
pub struct DocumentPaths {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_path: Option<StoredFileReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cv_path: Option<StoredFileReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_path: Option<StoredFileReference>,
}

impl DocumentPaths {
    fn set(&mut self, category: Category, reference: StoredFileReference) {
        let slot = match category {
            Category::Photo => &mut self.photo_path,
            Category::Cv => &mut self.cv_path,
            Category::Id => &mut self.id_path,
        };
        *slot = Some(reference);
    }
}

#[derive(Debug, Default, Serialize)]
struct SubmissionResponse {
    #[serde(flatten)]
    paths: DocumentPaths,
    /// Form field name to message, only for the fields that failed.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    errors: BTreeMap<&'static str, String>,
}

impl IntoResponse for SubmissionResponse {
    fn into_response(self) -> Response {
        let status = if self.errors.is_empty() {
            StatusCode::OK
        } else {
            StatusCode::UNPROCESSABLE_ENTITY
        };
        (status, Json(self)).into_response()
    }
}

pub fn app(store: Arc<dyn DocumentStore>, config: &AppConfig) -> Router {
    let mut documents = Router::new()
        .route("/", get(health))
        .route("/documents/new", post(create_documents))
        .route("/documents", post(update_documents))
        .layer(DefaultBodyLimit::max(config.max_body_bytes));

    if let Some(token) = config.auth_token.clone() {
        documents = documents.layer(middleware::from_fn(move |req: Request, next: Next| {
            let token = token.clone();
            async move {
                match req.headers().typed_get::<Authorization<Bearer>>() {
                    Some(auth) if auth.token() == token => next.run(req).await,
                    _ => ApiError::Unauthorized.into_response(),
                }
            }
        }));
    }

    // Serve under the same prefix the store writes into references.
    let uploads_route = format!("{}/{{file_name}}", normalize_prefix(store.public_prefix()));

    Router::new()
        .route(&uploads_route, get(get_upload))
        .merge(documents)
        .layer(Extension(store))
}

async fn health() -> &'static str {
    concat!("OK\nstaffdocs-server ", env!("CARGO_PKG_VERSION"))
}

/// New employee: all three documents must be present.
async fn create_documents(
    Extension(store): Extension<Arc<dyn DocumentStore>>,
    multipart: Multipart,
) -> Result<SubmissionResponse, ApiError> {
    submit(store.as_ref(), multipart, true).await
}

/// Existing employee: absent documents keep their current reference.
async fn update_documents(
    Extension(store): Extension<Arc<dyn DocumentStore>>,
    multipart: Multipart,
) -> Result<SubmissionResponse, ApiError> {
    submit(store.as_ref(), multipart, false).await
}

async fn submit(
    store: &dyn DocumentStore,
    mut multipart: Multipart,
    required: bool,
) -> Result<SubmissionResponse, ApiError> {
    let mut pending: HashMap<Category, UploadRequest> = HashMap::new();

    while let Some(field) = multipart.next_field().await? {
        let Some(category) = field.name().and_then(Category::from_field) else {
            tracing::debug!("Ignoring multipart field {:?}", field.name());
            continue;
        };
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await?;

        // Browsers submit an empty part for an untouched file input.
        if data.is_empty() {
            continue;
        }
        pending.insert(category, UploadRequest::new(category, filename, data.to_vec()));
    }

    let mut response = SubmissionResponse::default();

    if required {
        for category in Category::ALL {
            if !pending.contains_key(&category) {
                response
                    .errors
                    .insert(category.field_name(), format!("{} is required", category.label()));
            }
        }
        if !response.errors.is_empty() {
            return Ok(response);
        }
    }

    let [photo, cv, id] = Category::ALL.map(|category| pending.remove(&category));
    let (photo, cv, id) = tokio::join!(
        store_one(store, photo),
        store_one(store, cv),
        store_one(store, id)
    );

    for result in [photo, cv, id].into_iter().flatten() {
        match result {
            Ok((category, reference)) => response.paths.set(category, reference),
            Err(e) => {
                response
                    .errors
                    .insert(e.category().field_name(), e.to_string());
            }
        }
    }

    Ok(response)
}

async fn store_one(
    store: &dyn DocumentStore,
    request: Option<UploadRequest>,
) -> Option<Result<(Category, StoredFileReference), UploadError>> {
    let request = request?;
    let category = request.category;
    Some(store.store(request).await.map(|reference| (category, reference)))
}

async fn get_upload(
    Path(file_name): Path<String>,
    Extension(store): Extension<Arc<dyn DocumentStore>>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = store.open(&file_name).await?;

    let mut response = Bytes::from(bytes).into_response();
    response
        .headers_mut()
        .typed_insert(ContentType::from(content_type_for(&file_name)));

    Ok(response)
}

fn content_type_for(file_name: &str) -> Mime {
    mime_guess::from_path(file_name).first_or_octet_stream()
}
