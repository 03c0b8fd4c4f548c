//! glasslens-export: Pure serializers for lens output (sans-IO)
//!
//! Turns generated maps and filter graphs into formats a browser or
//! image tool can consume: PNG bytes, `data:` URLs, and an SVG document
//! holding the graph as a `<filter>` element.

pub mod png;
pub mod svg;

pub use png::{encode_png, to_data_url};
pub use svg::{SvgMetadata, to_svg_filter};

/// Errors raised while serializing lens output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum ExportError {
    /// PNG encoding failed.
    #[error("PNG encoding failed: {0}")]
    PngEncode(String),

    /// An operation references a name that is neither the scene, a
    /// source buffer, nor an earlier result.
    #[error("graph references unknown source `{0}`")]
    MissingSource(String),

    /// The operation has no SVG filter primitive equivalent.
    #[error("operation cannot be expressed as an SVG filter primitive: {0}")]
    Unsupported(String),
}

impl From<image::ImageError> for ExportError {
    fn from(err: image::ImageError) -> Self {
        Self::PngEncode(err.to_string())
    }
}
