pub mod commands;
pub mod eval;
pub mod history;
pub mod id;
pub mod pixels;
pub mod state;

pub use id::PapayaID;
