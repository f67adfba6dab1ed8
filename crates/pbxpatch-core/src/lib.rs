pub mod config;
pub mod discover;
pub mod error;
pub mod ident;
pub mod io;
pub mod lexer;
pub mod patcher;
pub mod paths;
pub mod record;
pub mod region;
pub mod verify;

pub use error::{PatchError, Result};
