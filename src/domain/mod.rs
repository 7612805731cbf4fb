pub mod models;
pub mod codec;
pub mod errors;

pub use models::*;
pub use codec::*;
pub use errors::*;
