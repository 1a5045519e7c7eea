//! Image encoding for the decode sink

mod jpeg;

pub use jpeg::ImageStore;
