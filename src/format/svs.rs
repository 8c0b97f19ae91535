//! Aperio ImageDescription metadata.
//!
//! Aperio writes its metadata into the TIFF ImageDescription tag:
//!
//! ```text
//! Aperio Image Library v10.0.51
//! 46920x33014 [0,100 46000x32914] (256x256) JPEG/RGB Q=30|AppMag = 20|MPP = 0.4990|...
//! ```
//!
//! The first line identifies the scanner software; the rest is
//! pipe-separated `key = value` pairs. Omnyx JPEG 2000 files use the same
//! pair syntax in their codestream comment.

use std::collections::BTreeMap;

/// Property prefix for Aperio key/value pairs.
pub const APERIO_PREFIX: &str = "aperio.";

/// Parsed metadata from an Aperio-style description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SvsMetadata {
    /// Microns per pixel at level 0
    pub mpp: Option<f64>,

    /// Objective magnification (e.g. 20, 40)
    pub magnification: Option<f64>,

    /// Scanner vendor name
    pub vendor: Option<String>,

    /// Every `key = value` pair, in key order
    pub properties: BTreeMap<String, String>,
}

impl SvsMetadata {
    /// Parse an Aperio-style description.
    ///
    /// Unparseable `MPP` or `AppMag` values are left as raw properties only.
    pub fn parse(description: &str) -> Self {
        let mut metadata = SvsMetadata::default();

        if is_aperio_description(description) {
            metadata.vendor = Some("aperio".to_string());
        }

        for part in description.split('|') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() || key.contains('\n') {
                continue;
            }

            metadata
                .properties
                .insert(key.to_string(), value.to_string());

            match key {
                "MPP" => metadata.mpp = value.parse::<f64>().ok(),
                "AppMag" => metadata.magnification = value.parse::<f64>().ok(),
                _ => {}
            }
        }

        metadata
    }

    /// Properties under the `aperio.` prefix.
    pub fn prefixed_properties(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.properties
            .iter()
            .map(|(k, v)| (format!("{APERIO_PREFIX}{k}"), v.clone()))
    }
}

/// Whether an ImageDescription was written by Aperio software.
pub fn is_aperio_description(description: &str) -> bool {
    description.starts_with("Aperio")
}
