pub mod lookup;
pub mod pattern;

pub use lookup::Lookup;
