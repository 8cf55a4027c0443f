//! Service layer separating image I/O from processing logic

pub mod io;

pub use io::ImageIOService;
