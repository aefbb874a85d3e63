pub mod chain;
pub mod normalize;

pub use chain::{Resolved, ResolutionMethod, ResolverChain, Stage, filter_keyed};
pub use normalize::normalize;
