//! Generation parameter overrides.

mod overrides;

pub use overrides::GenerationOverrides;
