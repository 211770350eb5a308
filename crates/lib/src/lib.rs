//! apimgr-lib: core library for the API portal deployment toolkit.
//!
//! This crate provides the building blocks the `apim` CLI is assembled from:
//! - `template`: bidirectional placeholder substitution over proxy trees
//! - `archive`: zip packaging/unpacking in the canonical proxy layout
//! - `maps`: wholesale synchronization of remote key value maps
//! - `manifest`: declarative manifest parsing (YAML or JSON)
//! - `deploy`: single and batch manifest deployment orchestration
//! - `client`: the authenticated portal gateway client
//! - `info`: virtual host and proxy URL lookup helpers

pub mod archive;
pub mod client;
pub mod config;
pub mod consts;
pub mod deploy;
pub mod info;
pub mod layout;
pub mod manifest;
pub mod maps;
pub mod template;
pub mod util;
