//! HTTP surface: routes for Image API 2 and 3 on top of the request engine.

use std::path::Path as FsPath;
use std::sync::Arc;

use axum::extract::{Path, RawQuery, State};
use axum::http::header::{ACCEPT, CONTENT_TYPE, HOST, LINK, LOCATION};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use crate::api::identifier::{apply_slash_substitute, encode_identifier, split_scale_constraint};
use crate::api::info::{ComplianceLevel, InfoLimits, virtual_size};
use crate::api::parameters::{Parameters, SizeComponent};
use crate::api::query::Query;
use crate::api::{
    ApiVersion, LimitError, RequestLimits, constrain_to_max_pixels, v2, v3, validate_request,
};
use crate::config::{IiifConfig, ServerConfig};
use crate::delegate::{Delegate, DelegateError, StaticDelegate};
use crate::error::IiifError;
use crate::geometry::ScaleConstraint;
use crate::image_loader::{ImageLoader, LoaderError, read_image, read_info};
use crate::image_ops::{ProcessingError, apply, available_output_formats, encode};

const JSON_LD: &str = "application/ld+json";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Iiif(#[from] IiifError),
    #[error(transparent)]
    Limit(#[from] LimitError),
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error(transparent)]
    Processing(#[from] ProcessingError),
    #[error("Cannot serialize information document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Iiif(IiifError::InvalidArgument(_)) => StatusCode::BAD_REQUEST,
            Self::Iiif(IiifError::UnsupportedFormat(_))
            | Self::Processing(ProcessingError::UnsupportedFormat(_)) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            Self::Limit(LimitError::BadRequest(_)) => StatusCode::BAD_REQUEST,
            Self::Limit(LimitError::Forbidden(_)) | Self::Loader(LoaderError::Forbidden(_)) => {
                StatusCode::FORBIDDEN
            }
            Self::Loader(LoaderError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Loader(_) | Self::Processing(_) | Self::Json(_) | Self::Join(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{self}");
        } else {
            warn!(%status, "{self}");
        }
        (status, self.to_string()).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    config: Arc<ServerConfig>,
    loader: Arc<ImageLoader>,
    delegate: Option<Arc<dyn Delegate>>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Result<Self, DelegateError> {
        let delegate = StaticDelegate::from_config(&config.delegate)?;
        let delegate: Option<Arc<dyn Delegate>> = if delegate.is_empty() {
            None
        } else {
            Some(Arc::new(delegate))
        };
        let loader = ImageLoader::from_config(&config.source);
        Ok(Self {
            config: Arc::new(config),
            loader: Arc::new(loader),
            delegate,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/iiif/2", version_routes(ApiVersion::V2))
        .nest("/iiif/3", version_routes(ApiVersion::V3))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

type ImagePath = (String, String, String, String, String);

fn version_routes(version: ApiVersion) -> Router<AppState> {
    Router::new()
        .route(
            "/{identifier}",
            get(
                move |state: State<AppState>, headers: HeaderMap, identifier: Path<String>| {
                    redirect_to_info(version, state, headers, identifier)
                },
            ),
        )
        .route(
            "/{identifier}/info.json",
            get(
                move |state: State<AppState>,
                      headers: HeaderMap,
                      identifier: Path<String>,
                      query: RawQuery| {
                    get_info(version, state, headers, identifier, query)
                },
            ),
        )
        .route(
            "/{identifier}/{region}/{size}/{rotation}/{quality_format}",
            get(
                move |state: State<AppState>,
                      headers: HeaderMap,
                      path: Path<ImagePath>,
                      query: RawQuery| async move {
                    match version {
                        ApiVersion::V2 => {
                            get_image::<v2::Size>(version, state, headers, path, query).await
                        }
                        ApiVersion::V3 => {
                            get_image::<v3::Size>(version, state, headers, path, query).await
                        }
                    }
                },
            ),
        )
}

/// Root URI that `id`s and `Link` headers are built on.
fn base_uri(config: &ServerConfig, headers: &HeaderMap) -> String {
    if let Some(uri) = &config.server.base_uri {
        return uri.trim_end_matches('/').to_owned();
    }
    let host = headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}")
}

fn version_uri(config: &ServerConfig, headers: &HeaderMap, version: ApiVersion) -> String {
    format!("{}/iiif/{version}", base_uri(config, headers))
}

/// An identifier as it appears in a request URI, split into the source image
/// it names and the scale constraint it carries.
#[derive(Debug, PartialEq)]
enum ResolvedIdentifier {
    Source {
        uri_identifier: String,
        source_identifier: String,
        scale_constraint: Option<ScaleConstraint>,
    },
    /// The client should use this identifier instead.
    Redirect(String),
}

fn resolve_identifier(config: &IiifConfig, identifier: &str) -> Result<ResolvedIdentifier, IiifError> {
    let delimiter = &config.scale_constraint_delimiter;
    let (base, scale_constraint) = split_scale_constraint(identifier, delimiter)?;
    match scale_constraint {
        Some(sc) if !sc.has_effect() => Ok(ResolvedIdentifier::Redirect(base.to_owned())),
        Some(sc) if sc.reduced() != sc => Ok(ResolvedIdentifier::Redirect(format!(
            "{base}{}",
            sc.reduced().to_identifier_suffix(delimiter)
        ))),
        _ => Ok(ResolvedIdentifier::Source {
            uri_identifier: identifier.to_owned(),
            source_identifier: apply_slash_substitute(base, config.slash_substitute.as_deref()),
            scale_constraint,
        }),
    }
}

fn moved_permanently(location: String) -> Response {
    debug!(%location, "redirecting to normalized identifier");
    (StatusCode::MOVED_PERMANENTLY, [(LOCATION, location)]).into_response()
}

fn with_query(mut uri: String, query: Option<&str>) -> String {
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        uri.push('?');
        uri.push_str(query);
    }
    uri
}

async fn redirect_to_info(
    version: ApiVersion,
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(identifier): Path<String>,
) -> Response {
    let location = format!(
        "{}/{}/info.json",
        version_uri(&state.config, &headers, version),
        encode_identifier(&identifier)
    );
    (StatusCode::SEE_OTHER, [(LOCATION, location)]).into_response()
}

/// `application/ld+json` only when the client asks for it.
fn info_content_type(version: ApiVersion, headers: &HeaderMap) -> String {
    let wants_ld = headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .any(|h| h.contains(JSON_LD));
    if !wants_ld {
        return "application/json".to_owned();
    }
    let context = match version {
        ApiVersion::V2 => v2::IMAGE_2_CONTEXT,
        ApiVersion::V3 => v3::IMAGE_3_CONTEXT,
    };
    format!("{JSON_LD};profile=\"{context}\"")
}

async fn get_info(
    version: ApiVersion,
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(identifier): Path<String>,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, ServerError> {
    let root = version_uri(&state.config, &headers, version);
    let (uri_identifier, source_identifier, scale_constraint) =
        match resolve_identifier(&state.config.iiif, &identifier)? {
            ResolvedIdentifier::Redirect(id) => {
                let location = format!("{root}/{}/info.json", encode_identifier(&id));
                return Ok(moved_permanently(with_query(location, raw_query.as_deref())));
            }
            ResolvedIdentifier::Source {
                uri_identifier,
                source_identifier,
                scale_constraint,
            } => (uri_identifier, source_identifier, scale_constraint),
        };
    let query = Query::from(raw_query.as_deref().unwrap_or_default());
    let page_index = query.page_index()?;

    let path = state.loader.resolve(&source_identifier).await?;
    let info = tokio::task::spawn_blocking(move || read_info(&path)).await??;

    let image_uri = format!("{root}/{}", encode_identifier(&uri_identifier));
    let limits = InfoLimits::from_config(&state.config.iiif);
    let formats = available_output_formats();
    let body = match version {
        ApiVersion::V2 => {
            let mut factory = v2::ImageInfoFactory::new(limits);
            if let Some(delegate) = &state.delegate {
                factory = factory.with_delegate(delegate.clone());
            }
            let doc = factory.new_image_info(&formats, &image_uri, &info, page_index, scale_constraint)?;
            serde_json::to_vec(&doc)?
        }
        ApiVersion::V3 => {
            let mut factory = v3::ImageInfoFactory::new(limits);
            if let Some(delegate) = &state.delegate {
                factory = factory.with_delegate(delegate.clone());
            }
            let doc = factory.new_image_info(&formats, &image_uri, &info, page_index, scale_constraint)?;
            serde_json::to_vec(&doc)?
        }
    };
    Ok(([(CONTENT_TYPE, info_content_type(version, &headers))], body).into_response())
}

struct Rendered {
    data: Vec<u8>,
    media_type: &'static str,
    canonical: String,
}

async fn get_image<S>(
    version: ApiVersion,
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((identifier, region, size, rotation, quality_format)): Path<ImagePath>,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, ServerError>
where
    S: SizeComponent + Send + 'static,
{
    let root = version_uri(&state.config, &headers, version);
    let (uri_identifier, source_identifier, scale_constraint) =
        match resolve_identifier(&state.config.iiif, &identifier)? {
            ResolvedIdentifier::Redirect(id) => {
                let location = format!(
                    "{root}/{}/{region}/{size}/{rotation}/{quality_format}",
                    encode_identifier(&id)
                );
                return Ok(moved_permanently(with_query(location, raw_query.as_deref())));
            }
            ResolvedIdentifier::Source {
                uri_identifier,
                source_identifier,
                scale_constraint,
            } => (uri_identifier, source_identifier, scale_constraint),
        };
    let (quality, format) = quality_format
        .rsplit_once('.')
        .filter(|(q, f)| !q.is_empty() && !f.is_empty())
        .ok_or_else(|| IiifError::invalid("Invalid quality and format: missing extension"))?;
    let query = Query::from(raw_query.as_deref().unwrap_or_default());
    let params = Parameters::<S>::new(uri_identifier, &region, &size, &rotation, quality, format)?
        .with_query(query);
    let page_index = params.query().page_index()?;

    let output = params.output_format().to_format();
    if !available_output_formats().contains(&output) {
        return Err(ProcessingError::UnsupportedFormat(output).into());
    }

    let path = state.loader.resolve(&source_identifier).await?;
    let config = state.config.clone();
    let rendered = tokio::task::spawn_blocking(move || {
        render(&config.iiif, &path, &params, page_index, scale_constraint)
    })
    .await??;

    let mut response = ([(CONTENT_TYPE, rendered.media_type)], rendered.data).into_response();
    let mut links = vec![format!("<{root}/{}>;rel=\"canonical\"", rendered.canonical)];
    if version == ApiVersion::V2 {
        links.push(format!(
            "<{}>;rel=\"profile\"",
            ComplianceLevel::Level2.v2_profile_uri()
        ));
    }
    if let Ok(value) = HeaderValue::from_str(&links.join(",")) {
        response.headers_mut().insert(LINK, value);
    }
    Ok(response)
}

fn render<S: SizeComponent>(
    config: &IiifConfig,
    path: &FsPath,
    params: &Parameters<S>,
    page_index: usize,
    scale_constraint: Option<ScaleConstraint>,
) -> Result<Rendered, ServerError> {
    let info = read_info(path)?;
    let sc = scale_constraint.unwrap_or_default();
    let virtual_size = virtual_size(&info, page_index, &sc)?;
    let info_limits = InfoLimits::from_config(config);

    let mut ops = params
        .to_operation_list(info_limits.max_scale)
        .with_page_index(page_index)
        .with_scale_constraint(sc);
    if params.size().is_max() {
        constrain_to_max_pixels(
            &mut ops,
            &virtual_size,
            info_limits.effective_max_pixels(&virtual_size),
        );
    }
    let limits = RequestLimits {
        max_pixels: config.max_pixels,
        max_scale: info_limits.max_scale,
        restrict_to_sizes: config.restrict_to_sizes,
    };
    validate_request(
        &ops,
        &virtual_size,
        params.size().is_upscaling_allowed(),
        &limits,
        &info_limits.sizes(&virtual_size),
    )?;
    debug!(
        operations = %ops.operations().iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
        "processing"
    );

    let format = params.output_format().to_format();
    let image = apply(read_image(path)?, &ops);
    Ok(Rendered {
        data: encode(&image, format)?,
        media_type: format.media_type(),
        canonical: params.to_canonical_string(&virtual_size),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use image::{GenericImageView, Rgb, RgbImage};
    use serde_json::Value;
    use tower::ServiceExt;

    const BASE: &str = "https://images.example.org";

    fn fixture(configure: impl FnOnce(&mut ServerConfig)) -> (tempfile::TempDir, Router) {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(400, 300, Rgb([30, 120, 200]))
            .save(dir.path().join("test.png"))
            .unwrap();
        std::fs::create_dir(dir.path().join("maps")).unwrap();
        RgbImage::from_pixel(40, 30, Rgb([0, 0, 0]))
            .save(dir.path().join("maps/old.png"))
            .unwrap();
        let mut config = ServerConfig::default();
        config.server.base_uri = Some(BASE.to_owned());
        config.source.root = dir.path().to_path_buf();
        configure(&mut config);
        let app = router(AppState::new(config).unwrap());
        (dir, app)
    }

    async fn get(app: &Router, uri: &str) -> Response {
        app.clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    fn header<'a>(response: &'a Response, name: &str) -> &'a str {
        response.headers()[name].to_str().unwrap()
    }

    #[tokio::test]
    async fn test_base_uri_redirects_to_info() {
        let (_dir, app) = fixture(|_| {});
        let response = get(&app, "/iiif/3/test.png").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            header(&response, "location"),
            "https://images.example.org/iiif/3/test.png/info.json"
        );
    }

    #[tokio::test]
    async fn test_v3_info() {
        let (_dir, app) = fixture(|_| {});
        let response = get(&app, "/iiif/3/test.png/info.json").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "content-type"), "application/json");
        let json: Value = serde_json::from_slice(&body(response).await).unwrap();
        assert_eq!(json["id"], "https://images.example.org/iiif/3/test.png");
        assert_eq!(json["type"], "ImageService3");
        assert_eq!(json["width"], 400);
        assert_eq!(json["height"], 300);
        assert_eq!(json["extraFormats"], serde_json::json!(["gif", "tif", "webp"]));
    }

    #[tokio::test]
    async fn test_json_ld_when_accepted() {
        let (_dir, app) = fixture(|_| {});
        let request = Request::builder()
            .uri("/iiif/2/test.png/info.json")
            .header(ACCEPT, "application/ld+json")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(
            header(&response, "content-type"),
            "application/ld+json;profile=\"http://iiif.io/api/image/2/context.json\""
        );
        let json: Value = serde_json::from_slice(&body(response).await).unwrap();
        assert_eq!(json["@id"], "https://images.example.org/iiif/2/test.png");
    }

    #[tokio::test]
    async fn test_encoded_slash_in_identifier() {
        let (_dir, app) = fixture(|_| {});
        let response = get(&app, "/iiif/3/maps%2Fold/info.json").await;
        assert_eq!(response.status(), StatusCode::OK);
        let json: Value = serde_json::from_slice(&body(response).await).unwrap();
        assert_eq!(json["id"], "https://images.example.org/iiif/3/maps%2Fold");
    }

    #[tokio::test]
    async fn test_slash_substitute() {
        let (_dir, app) = fixture(|config| config.iiif.slash_substitute = Some("~".into()));
        let response = get(&app, "/iiif/3/maps~old.png/full/max/0/default.png").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_v3_image() {
        let (_dir, app) = fixture(|_| {});
        let response = get(&app, "/iiif/3/test.png/full/pct:50/0/default.png").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "content-type"), "image/png");
        assert_eq!(
            header(&response, "link"),
            "<https://images.example.org/iiif/3/test.png/full/200,150/0/default.png>;rel=\"canonical\""
        );
        let image = image::load_from_memory(&body(response).await).unwrap();
        assert_eq!(image.dimensions(), (200, 150));
    }

    #[tokio::test]
    async fn test_v2_image_links() {
        let (_dir, app) = fixture(|_| {});
        let response = get(&app, "/iiif/2/test.png/full/full/0/default.jpg").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "content-type"), "image/jpeg");
        let link = header(&response, "link");
        assert!(link.contains("rel=\"canonical\""));
        assert!(link.contains("<http://iiif.io/api/image/2/level2.json>;rel=\"profile\""));
    }

    #[tokio::test]
    async fn test_client_errors() {
        let (_dir, app) = fixture(|_| {});
        let cases = [
            ("/iiif/3/test.png/full/max/0/sepia.png", StatusCode::BAD_REQUEST),
            ("/iiif/3/test.png/full/max/0/default.xyz", StatusCode::UNSUPPORTED_MEDIA_TYPE),
            ("/iiif/3/test.png/full/max/0/default.jp2", StatusCode::UNSUPPORTED_MEDIA_TYPE),
            ("/iiif/3/test.png/full/800,/0/default.png", StatusCode::BAD_REQUEST),
            ("/iiif/3/test.png/full/max/0/default", StatusCode::BAD_REQUEST),
            ("/iiif/3/test.png/full/max/0/default.png?page=2", StatusCode::BAD_REQUEST),
            ("/iiif/3/test.png/info.json?page=0", StatusCode::BAD_REQUEST),
            ("/iiif/3/missing.png/info.json", StatusCode::NOT_FOUND),
            ("/iiif/3/..%2Fsecret.png/info.json", StatusCode::FORBIDDEN),
            ("/iiif/4/test.png/info.json", StatusCode::NOT_FOUND),
        ];
        for (uri, status) in cases {
            assert_eq!(get(&app, uri).await.status(), status, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_upscaling_with_caret() {
        let (_dir, app) = fixture(|_| {});
        let response = get(&app, "/iiif/3/test.png/full/^800,/0/default.png").await;
        assert_eq!(response.status(), StatusCode::OK);
        let image = image::load_from_memory(&body(response).await).unwrap();
        assert_eq!(image.dimensions(), (800, 600));
    }

    #[tokio::test]
    async fn test_max_pixels() {
        let (_dir, app) = fixture(|config| config.iiif.max_pixels = 30_000);
        let response = get(&app, "/iiif/3/test.png/full/400,/0/default.png").await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = get(&app, "/iiif/3/test.png/full/max/0/default.png").await;
        assert_eq!(response.status(), StatusCode::OK);
        let image = image::load_from_memory(&body(response).await).unwrap();
        assert!(image.width() * image.height() <= 30_000);
    }

    #[tokio::test]
    async fn test_scale_constraint() {
        let (_dir, app) = fixture(|_| {});
        let response = get(&app, "/iiif/3/test.png-1:2/info.json").await;
        assert_eq!(response.status(), StatusCode::OK);
        let json: Value = serde_json::from_slice(&body(response).await).unwrap();
        assert_eq!(json["id"], "https://images.example.org/iiif/3/test.png-1:2");
        assert_eq!(json["width"], 200);

        let response = get(&app, "/iiif/3/test.png-1:2/full/max/0/default.png").await;
        let image = image::load_from_memory(&body(response).await).unwrap();
        assert_eq!(image.dimensions(), (200, 150));
    }

    #[tokio::test]
    async fn test_scale_constraint_redirects() {
        let (_dir, app) = fixture(|_| {});
        let response = get(&app, "/iiif/3/test.png-2:4/info.json").await;
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            header(&response, "location"),
            "https://images.example.org/iiif/3/test.png-1:2/info.json"
        );

        let response = get(&app, "/iiif/2/test.png-3:3/full/full/0/default.png?page=1").await;
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            header(&response, "location"),
            "https://images.example.org/iiif/2/test.png/full/full/0/default.png?page=1"
        );
    }

    #[tokio::test]
    async fn test_delegate_keys() {
        let (_dir, app) = fixture(|config| {
            config.delegate.v3_extra_keys.insert(
                "rights".into(),
                toml::Value::String("http://creativecommons.org/licenses/by/4.0/".into()),
            );
        });
        let response = get(&app, "/iiif/3/test.png/info.json").await;
        let json: Value = serde_json::from_slice(&body(response).await).unwrap();
        assert_eq!(json["rights"], "http://creativecommons.org/licenses/by/4.0/");

        let response = get(&app, "/iiif/2/test.png/info.json").await;
        let json: Value = serde_json::from_slice(&body(response).await).unwrap();
        assert!(json.get("rights").is_none());
    }

    #[tokio::test]
    async fn test_cors() {
        let (_dir, app) = fixture(|_| {});
        let request = Request::builder()
            .uri("/iiif/3/test.png/info.json")
            .header("origin", "https://viewer.example.com")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(header(&response, "access-control-allow-origin"), "*");
    }

    #[test]
    fn test_resolve_identifier() {
        let config = IiifConfig::default();
        assert_eq!(
            resolve_identifier(&config, "a/b-1:4").unwrap(),
            ResolvedIdentifier::Source {
                uri_identifier: "a/b-1:4".into(),
                source_identifier: "a/b".into(),
                scale_constraint: ScaleConstraint::new(1, 4).ok(),
            }
        );
        assert_eq!(
            resolve_identifier(&config, "b-2:2").unwrap(),
            ResolvedIdentifier::Redirect("b".into())
        );
        assert!(resolve_identifier(&config, "b-3:2").is_err());
    }
}
