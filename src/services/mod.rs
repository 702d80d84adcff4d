//! Upload handling and image I/O services

pub mod io;
pub mod upload;

pub use io::{DecodedImage, ImageIOService};
