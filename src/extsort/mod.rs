pub mod core;
pub mod merge;

#[cfg(test)]
mod tests;

pub use self::core::*;
pub use self::merge::*;
