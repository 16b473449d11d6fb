pub mod common;
pub mod main_protocol;
pub mod sub_protocol;

pub use main_protocol::MainProtocol;
pub use sub_protocol::SubProtocol;
