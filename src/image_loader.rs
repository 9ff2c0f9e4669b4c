use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use image::{DynamicImage, ImageDecoder, ImageReader};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::api::identifier::encode_identifier;
use crate::config::{SourceConfig, SourceKind};
use crate::format::Format;
use crate::geometry::Orientation;
use crate::info::Info;

const DEFAULT_USER_AGENT: &str =
    concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Image not found: {0}")]
    NotFound(String),
    #[error("Identifier not allowed: {0}")]
    Forbidden(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Upstream request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Cannot decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Where source images come from.
pub enum ImageLoader {
    Local(LocalLoader),
    Proxy(ProxyLoader),
}

impl ImageLoader {
    pub fn from_config(config: &SourceConfig) -> Self {
        match config.kind {
            SourceKind::Filesystem => Self::Local(LocalLoader::new(&config.root)),
            SourceKind::Http => Self::Proxy(ProxyLoader::new(
                config.base_url.clone().unwrap_or_default(),
                &config.cache_dir,
            )),
        }
    }

    /// Path of a local file holding the image for `identifier`.
    pub async fn resolve(&self, identifier: &str) -> Result<PathBuf, LoaderError> {
        match self {
            Self::Local(loader) => loader.resolve(identifier),
            Self::Proxy(loader) => loader.fetch(identifier).await,
        }
    }
}

pub struct LocalLoader {
    root: PathBuf,
}

impl LocalLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Finds the file named exactly `identifier` under the root, or failing
    /// that a file in the same directory whose stem is the identifier's last
    /// segment (so `maps/old` finds `maps/old.tif`).
    pub fn resolve(&self, identifier: &str) -> Result<PathBuf, LoaderError> {
        let relative = Path::new(identifier);
        if identifier.is_empty()
            || !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(LoaderError::Forbidden(identifier.to_owned()));
        }
        let exact = self.root.join(relative);
        if exact.is_file() {
            return Ok(exact);
        }
        let (Some(dir), Some(stem)) = (exact.parent(), relative.file_name()) else {
            return Err(LoaderError::NotFound(identifier.to_owned()));
        };
        find_by_stem(dir, stem.to_string_lossy().as_ref())
            .ok_or_else(|| LoaderError::NotFound(identifier.to_owned()))
    }
}

fn find_by_stem(dir: &Path, stem: &str) -> Option<PathBuf> {
    let mut matches: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .file_stem()
                .is_some_and(|s| s.to_string_lossy() == stem)
        })
        .map(|entry| entry.into_path())
        .collect();
    matches.sort();
    matches.into_iter().next()
}

/// Fetches images over HTTP and keeps them in a local cache directory.
pub struct ProxyLoader {
    base_url: String,
    cache_dir: PathBuf,
    client: reqwest::Client,
}

impl ProxyLoader {
    pub fn new(base_url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into(),
            cache_dir: cache_dir.into(),
            client,
        }
    }

    fn cache_path(&self, identifier: &str) -> PathBuf {
        let digest = Sha256::digest(identifier.as_bytes());
        self.cache_dir.join(base16ct::lower::encode_string(&digest))
    }

    pub async fn fetch(&self, identifier: &str) -> Result<PathBuf, LoaderError> {
        let path = self.cache_path(identifier);
        if tokio::fs::try_exists(&path).await? {
            debug!(identifier, path = %path.display(), "proxy cache hit");
            return Ok(path);
        }
        let url = self.upstream_url(identifier);
        info!(%url, "fetching upstream image");
        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(LoaderError::NotFound(identifier.to_owned()));
        }
        let bytes = response.error_for_status()?.bytes().await?;

        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let (cache_dir, target) = (self.cache_dir.clone(), path.clone());
        tokio::task::spawn_blocking(move || store(&cache_dir, &target, &bytes))
            .await
            .map_err(io::Error::other)??;
        Ok(path)
    }

    /// `<base_url>/<identifier>`, joined with exactly one slash.
    fn upstream_url(&self, identifier: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            encode_identifier(identifier)
        )
    }
}

/// Writes `bytes` to a temporary file in `cache_dir` and moves it to `path`.
/// Concurrent fetches of the same image each write their own file; losing
/// the race to another writer is not an error.
fn store(cache_dir: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = tempfile::NamedTempFile::new_in(cache_dir)?;
    file.write_all(bytes)?;
    match file.persist(path) {
        Ok(_) => Ok(()),
        Err(_) if path.is_file() => Ok(()),
        Err(e) => Err(e.error),
    }
}

/// Reads dimensions, format and orientation without decoding pixels.
pub fn read_info(path: &Path) -> Result<Info, LoaderError> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let format = reader.format().and_then(Format::from_image_format);
    let mut decoder = reader.into_decoder()?;
    let orientation = decoder
        .orientation()
        .map(Orientation::from)
        .unwrap_or_default();
    let (width, height) = decoder.dimensions();
    Ok(Info::builder()
        .with_size(width, height)
        .with_orientation(orientation)
        .with_format(format)
        .build())
}

/// Decodes the image at `path` with its EXIF orientation applied, so that
/// its pixels match the size reported by [`crate::api::info::virtual_size`].
pub fn read_image(path: &Path) -> Result<DynamicImage, LoaderError> {
    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}
