mod claim;
mod evidence;
mod run;
mod verdict;

pub use claim::*;
pub use evidence::*;
pub use run::*;
pub use verdict::*;
