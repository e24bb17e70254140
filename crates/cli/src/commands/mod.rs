pub mod analysis;
pub mod project;
pub mod roms;
pub mod util;

pub use analysis::*;
pub use project::*;
pub use roms::*;
pub use util::*;
