pub mod cli;
pub mod daemon;
pub mod inspect;

pub use cli::*;
pub use daemon::*;
pub use inspect::*;
