//! Child process supervision

mod child;

pub use child::{ChildPipes, ChildProcess};
