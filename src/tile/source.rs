//! Tile sources: where tile images and metadata come from.
//!
//! The viewer never decodes bytes itself; it asks a [`TileSource`] for a
//! decoded image and later hands the image back through
//! [`TileSource::release_image`] when the tile is evicted.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageReader, RgbaImage};
use std::io::Cursor;
use tracing::debug;
use url::Url;

use crate::error::LoadError;

// =============================================================================
// TileImage
// =============================================================================

/// A decoded tile image with known pixel dimensions.
pub trait TileImage {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

impl TileImage for RgbaImage {
    fn width(&self) -> u32 {
        self.dimensions().0
    }

    fn height(&self) -> u32 {
        self.dimensions().1
    }
}

// =============================================================================
// TileSource Trait
// =============================================================================

/// Asynchronous loader for a Zoomify tile set.
///
/// Loads are fire-and-forget from the viewer's point of view: a load is never
/// aborted at the transport level, its result is simply discarded if nobody
/// wants it any more.
#[async_trait]
pub trait TileSource: Send + Sync + 'static {
    /// Decoded image type handed to the display surface.
    type Image: TileImage + Send + Sync + 'static;

    /// Base location of the tile set (URL or directory).
    fn base(&self) -> &str;

    /// Fetch a text resource (the metadata document).
    async fn fetch_text(&self, url: &str) -> Result<String, LoadError>;

    /// Fetch and decode a tile image.
    async fn load_image(&self, url: &str) -> Result<Self::Image, LoadError>;

    /// Give back an image that is no longer displayed.
    ///
    /// Sources backed by host memory that is not reclaimed on drop override
    /// this to detach the image explicitly.
    fn release_image(&self, image: Self::Image) {
        drop(image);
    }
}

/// Decode JPEG (or any enabled format) bytes into an RGBA image.
pub fn decode_image(url: &str, data: &[u8]) -> Result<RgbaImage, LoadError> {
    let decode_err = |message: String| LoadError::Decode {
        url: url.to_string(),
        message,
    };

    let image = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| decode_err(e.to_string()))?
        .decode()
        .map_err(|e| decode_err(e.to_string()))?;

    Ok(image.to_rgba8())
}

// =============================================================================
// HTTP Source
// =============================================================================

/// Tile source served over HTTP(S).
#[derive(Clone)]
pub struct HttpTileSource {
    client: reqwest::Client,
    base: String,
}

impl HttpTileSource {
    /// Create a source for a base URL such as `https://host/tiles/image`.
    pub fn new(base: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base)
    }

    /// Create a source reusing an existing client.
    pub fn with_client(client: reqwest::Client, base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    async fn get(&self, url: &str) -> Result<Bytes, LoadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LoadError::Connection(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LoadError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(LoadError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| LoadError::Connection(e.to_string()))
    }
}

#[async_trait]
impl TileSource for HttpTileSource {
    type Image = RgbaImage;

    fn base(&self) -> &str {
        &self.base
    }

    async fn fetch_text(&self, url: &str) -> Result<String, LoadError> {
        let data = self.get(url).await?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    async fn load_image(&self, url: &str) -> Result<RgbaImage, LoadError> {
        let data = self.get(url).await?;
        debug!(url, bytes = data.len(), "Fetched tile");
        decode_image(url, &data)
    }
}

// =============================================================================
// Filesystem Source
// =============================================================================

/// Tile source reading an unpacked Zoomify directory.
#[derive(Debug, Clone)]
pub struct FsTileSource {
    base: String,
}

impl FsTileSource {
    /// Create a source rooted at a directory containing `ImageProperties.xml`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let base = root.to_string_lossy().trim_end_matches('/').to_string();
        Self { base }
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LoadError::NotFound(path.to_string())
            } else {
                LoadError::Io(format!("{}: {}", path, e))
            }
        })
    }
}

#[async_trait]
impl TileSource for FsTileSource {
    type Image = RgbaImage;

    fn base(&self) -> &str {
        &self.base
    }

    async fn fetch_text(&self, url: &str) -> Result<String, LoadError> {
        let data = self.read(url).await?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    async fn load_image(&self, url: &str) -> Result<RgbaImage, LoadError> {
        let data = self.read(url).await?;
        decode_image(url, &data)
    }
}

// =============================================================================
// Location Dispatch
// =============================================================================

/// Either an HTTP or a filesystem source, chosen from a location string.
#[derive(Clone)]
pub enum AnyTileSource {
    Http(HttpTileSource),
    Fs(FsTileSource),
}

impl AnyTileSource {
    /// `http://` and `https://` locations are fetched over the network,
    /// anything else is treated as a local directory.
    pub fn from_location(location: &str) -> Self {
        match Url::parse(location) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
                Self::Http(HttpTileSource::new(location))
            }
            _ => Self::Fs(FsTileSource::new(location)),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

#[async_trait]
impl TileSource for AnyTileSource {
    type Image = RgbaImage;

    fn base(&self) -> &str {
        match self {
            Self::Http(s) => s.base(),
            Self::Fs(s) => s.base(),
        }
    }

    async fn fetch_text(&self, url: &str) -> Result<String, LoadError> {
        match self {
            Self::Http(s) => s.fetch_text(url).await,
            Self::Fs(s) => s.fetch_text(url).await,
        }
    }

    async fn load_image(&self, url: &str) -> Result<RgbaImage, LoadError> {
        match self {
            Self::Http(s) => s.load_image(url).await,
            Self::Fs(s) => s.load_image(url).await,
        }
    }
}
