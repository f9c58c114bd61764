pub mod input;
mod message;

pub use message::{Message, MessageLog, UNDECRYPTABLE_PLACEHOLDER};
