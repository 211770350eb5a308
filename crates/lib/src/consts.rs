//! Shared constants.

/// Fixed top-level folder name inside every proxy archive.
///
/// The management endpoints only accept archives whose single root folder
/// carries this exact name, independent of the local directory's name.
pub const PROXY_FOLDER: &str = "APIProxy";
