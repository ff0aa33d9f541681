mod builder;
mod message;

pub use builder::*;
pub use message::*;
