pub mod codec;
pub mod engine;
pub mod error;
pub mod tensor;

pub use engine::*;
pub use error::*;
pub use tensor::*;
