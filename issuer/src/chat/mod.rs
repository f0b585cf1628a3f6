//! Chat front end: parsing, confirmation and replies

mod confirm;
mod handler;
mod parser;
pub mod reply;

pub use confirm::{ConfirmOutcome, ConfirmationBook};
pub use handler::ChatHandler;
pub use parser::{parse, ChatCommand, ParseError};
