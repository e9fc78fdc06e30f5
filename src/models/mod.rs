//! Data models shared by callers and workers.

mod reply;
mod token;
mod value;

pub use reply::{Answer, Reply, ReplyError};
pub use token::Token;
pub use value::{BLOB_KEY, Value};
