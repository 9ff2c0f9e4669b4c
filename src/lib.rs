//! An IIIF Image API 2.1 and 3.0 server.
//!
//! Requests are parsed into [`api::v2::Parameters`] or [`api::v3::Parameters`],
//! compiled to an [`operation::OperationList`] and executed by [`image_ops`];
//! information documents come from the versioned `ImageInfoFactory`s.

pub mod api;
pub mod config;
pub mod delegate;
pub mod error;
pub mod format;
pub mod geometry;
pub mod image_loader;
pub mod image_ops;
pub mod info;
pub mod logger;
pub mod operation;
pub mod server;
