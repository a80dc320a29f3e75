pub mod http;
pub mod traits;

pub use http::HttpSource;
pub use traits::{JobSource, LineageSource};
