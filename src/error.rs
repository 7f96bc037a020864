use thiserror::Error;

/// Errors raised while fetching or decoding a single resource
/// (a tile image, the thumbnail or the metadata document).
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// Resource does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Server answered with a non-success status
    #[error("HTTP {status} while fetching {url}")]
    Http { status: u16, url: String },

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Bytes were fetched but could not be decoded as an image
    #[error("Decode error for {url}: {message}")]
    Decode { url: String, message: String },

    /// Local filesystem error
    #[error("I/O error: {0}")]
    Io(String),
}

/// Errors describing a malformed or unreachable `ImageProperties.xml`.
///
/// Any of these is fatal for the image: no partial pyramid is built.
#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    /// The metadata document could not be fetched
    #[error("Failed to fetch image properties: {0}")]
    Fetch(#[from] LoadError),

    /// The document is not well-formed XML
    #[error("Malformed image properties XML: {0}")]
    Xml(String),

    /// No `IMAGE_PROPERTIES` element in the document
    #[error("Missing IMAGE_PROPERTIES element")]
    MissingElement,

    /// A required attribute is absent
    #[error("Missing required attribute: {0}")]
    MissingAttribute(&'static str),

    /// An attribute is present but not a non-negative integer
    #[error("Invalid value for {name}: {value:?}")]
    InvalidAttribute { name: &'static str, value: String },

    /// A dimension is zero
    #[error("{name} must be greater than zero")]
    ZeroDimension { name: &'static str },

    /// The tile set would need more tile groups than can be addressed
    #[error("Too many tiles for {width}x{height} with tile size {tile_size}")]
    TooManyTiles {
        width: u32,
        height: u32,
        tile_size: u32,
    },
}

/// Fatal errors that keep a viewer from becoming usable.
#[derive(Debug, Clone, Error)]
pub enum ViewerError {
    /// Image metadata is malformed or missing (InvalidMetadata)
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(#[from] MetadataError),

    /// The host surface lacks a required drawing capability
    #[error("Unsupported surface: {reason}")]
    UnsupportedSurface { reason: String },

    /// Viewer options failed validation
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
}
