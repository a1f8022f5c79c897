pub mod key;
pub mod tree;


pub use self::key::*;
pub use self::tree::*;
