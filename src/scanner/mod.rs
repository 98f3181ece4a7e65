pub mod change;
pub mod chunker;
pub mod compiler;
pub mod literal;
pub mod matcher;

pub use change::*;
pub use chunker::*;
pub use compiler::*;
pub use literal::*;
pub use matcher::*;
