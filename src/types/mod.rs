pub mod account;
pub mod address;
pub mod block;
pub mod transaction;

pub use account::*;
pub use address::*;
pub use block::*;
pub use transaction::*;
