mod error;

pub use error::{MyndirError, MyndirResult};
