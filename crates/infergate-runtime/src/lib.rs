pub mod config;
pub mod lifecycle;
pub mod postprocess;
pub mod request;
pub mod servicer;
pub mod stream;

pub use config::*;
pub use lifecycle::*;
pub use postprocess::*;
pub use request::*;
pub use servicer::*;
pub use stream::*;
