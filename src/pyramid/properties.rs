//! `ImageProperties.xml` parsing.
//!
//! A Zoomify tile set is described by a single element:
//!
//! ```xml
//! <IMAGE_PROPERTIES WIDTH="4000" HEIGHT="3000" NUMTILES="257"
//!                   NUMIMAGES="1" VERSION="1.8" TILESIZE="256" />
//! ```
//!
//! Only `WIDTH`, `HEIGHT` and `TILESIZE` are used.

use serde::Serialize;

use crate::error::MetadataError;

/// Element carrying the image attributes.
const PROPERTIES_ELEMENT: &str = "IMAGE_PROPERTIES";

/// Image dimensions and tile size read from the metadata document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageProperties {
    /// Full resolution width in pixels
    pub width: u32,

    /// Full resolution height in pixels
    pub height: u32,

    /// Tile edge length in pixels
    pub tile_size: u32,
}

/// Parse an `ImageProperties.xml` document.
///
/// Missing, non-numeric, negative or zero attributes are all reported as
/// [`MetadataError`]s.
pub fn parse_image_properties(xml: &str) -> Result<ImageProperties, MetadataError> {
    let doc = roxmltree::Document::parse(xml.trim_start_matches('\u{feff}'))
        .map_err(|e| MetadataError::Xml(e.to_string()))?;

    let element = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name().eq_ignore_ascii_case(PROPERTIES_ELEMENT))
        .ok_or(MetadataError::MissingElement)?;

    let attr = |name: &'static str| -> Result<u32, MetadataError> {
        let raw = element
            .attributes()
            .find(|a| a.name().eq_ignore_ascii_case(name))
            .map(|a| a.value())
            .ok_or(MetadataError::MissingAttribute(name))?;

        let value: u32 = raw
            .trim()
            .parse()
            .map_err(|_| MetadataError::InvalidAttribute {
                name,
                value: raw.to_string(),
            })?;

        if value == 0 {
            return Err(MetadataError::ZeroDimension { name });
        }
        Ok(value)
    };

    Ok(ImageProperties {
        width: attr("WIDTH")?,
        height: attr("HEIGHT")?,
        tile_size: attr("TILESIZE")?,
    })
}
