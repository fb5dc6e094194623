//! Object-storage result uploads for Conveyor workers.
//!
//! Handlers write their outputs to a local scratch directory; the
//! [`ResultUploader`] pushes files (or whole directories) to the
//! assignment's storage location. URIs follow `scheme://bucket/path`.

pub mod uploader;
pub mod uri;

pub use uploader::ResultUploader;
pub use uri::StorageUri;
