//! Manifest bundles: catalog, splitting and decoding.
//!
//! - [`catalog::BundleCatalog`]: ordered, injectable list of named bundles
//! - [`document::split_documents`] / [`document::decode_document`]: turn
//!   bundle text into [`document::ManifestObject`]s
//! - [`inspect_catalog`]: offline decode of a whole catalog without touching
//!   a cluster

pub mod catalog;
pub mod document;

pub use catalog::{Bundle, BundleCatalog, BundleDigest, BundleSource, DEFAULT_BUNDLE_ORDER};
pub use document::{
    decode_document, split_documents, DecodeError, ManifestObject, ObjectKey, DOCUMENT_SEPARATOR,
};

use crate::error::BundleError;

/// Objects a bundle would apply, in document order.
#[derive(Debug, Clone)]
pub struct DecodedBundle {
    pub name: String,
    pub digest: BundleDigest,
    pub objects: Vec<ManifestObject>,
}

/// Load and decode every document of `bundle`.
pub async fn decode_bundle(bundle: &Bundle) -> Result<DecodedBundle, BundleError> {
    let raw = bundle
        .source()
        .load()
        .await
        .map_err(|source| BundleError::Load { source })?;
    let digest = BundleDigest::from_bytes(&raw);
    let text = std::str::from_utf8(&raw)?;

    let objects = split_documents(text)
        .into_iter()
        .enumerate()
        .map(|(index, doc)| decode_document(doc).map_err(|source| BundleError::Decode { index, source }))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DecodedBundle {
        name: bundle.name().to_string(),
        digest,
        objects,
    })
}

/// Decode every bundle of `catalog` in order, stopping at the first failure.
///
/// On failure returns the failing bundle's name with its error.
pub async fn inspect_catalog(
    catalog: &BundleCatalog,
) -> Result<Vec<DecodedBundle>, (String, BundleError)> {
    let mut decoded = Vec::with_capacity(catalog.len());
    for bundle in catalog {
        let bundle_objects = decode_bundle(bundle)
            .await
            .map_err(|e| (bundle.name().to_string(), e))?;
        decoded.push(bundle_objects);
    }
    Ok(decoded)
}
