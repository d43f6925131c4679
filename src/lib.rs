pub mod errors;
pub mod resource;
pub mod rsrc;
pub mod stream;
pub mod types;
pub mod utils;
pub mod values;

pub use errors::RsrcError;
pub use resource::{Resource, ResourceItem, ResourceValues};
pub use rsrc::ResourceKind;
pub use stream::{AbortHandle, AccessFlags, Codepage, ResourceStream};

pub type Result<T> = std::result::Result<T, RsrcError>;
