pub mod account;
pub mod file;

pub use account::*;
pub use file::*;
