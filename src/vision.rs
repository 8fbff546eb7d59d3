//! Prepares rendered PNGs for vision-model consumption.
//!
//! Provider vision endpoints cap input dimensions, so oversized renders
//! are downscaled (aspect preserved) before being inlined as base64.

use std::io::Cursor;
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::imageops::FilterType;
use miette::Diagnostic;
use thiserror::Error;
use tracing::debug;

use crate::model::ProviderFamily;
use crate::providers::ImageAttachment;

#[derive(Debug, Error, Diagnostic)]
pub enum VisionError {
    #[error("could not read image {path}: {source}")]
    #[diagnostic(code(diaforge::vision::read))]
    Read {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("could not re-encode image {path}: {source}")]
    #[diagnostic(code(diaforge::vision::encode))]
    Encode {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

/// Longest edge accepted by the family's vision endpoint, if capped.
#[must_use]
pub fn max_edge_for(family: ProviderFamily) -> Option<u32> {
    match family {
        ProviderFamily::Anthropic => Some(1092),
        ProviderFamily::Gemini => Some(3072),
        ProviderFamily::OpenAi => None,
    }
}

/// Load a rendered PNG, downscale it to the family's cap if needed, and
/// return it as an inline base64 attachment.
pub fn attachment_for(
    path: &Path,
    family: ProviderFamily,
) -> Result<ImageAttachment, VisionError> {
    let display = path.display().to_string();
    let img = image::open(path).map_err(|source| VisionError::Read {
        path: display.clone(),
        source,
    })?;

    let img = match max_edge_for(family) {
        Some(cap) if img.width() > cap || img.height() > cap => {
            debug!(
                width = img.width(),
                height = img.height(),
                cap,
                "downscaling render for vision input"
            );
            img.resize(cap, cap, FilterType::Triangle)
        }
        _ => img,
    };

    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|source| VisionError::Encode {
            path: display,
            source,
        })?;
    Ok(ImageAttachment::png(STANDARD.encode(&bytes)))
}
