pub mod evaluation;
pub mod features;
pub mod metrics;
pub mod recursive;

pub use evaluation::*;
pub use features::*;
pub use metrics::*;
pub use recursive::*;
