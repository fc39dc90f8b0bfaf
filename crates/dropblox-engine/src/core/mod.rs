pub use self::{bitmap::*, block::*, catalog::*};

pub(crate) mod bitmap;
pub(crate) mod block;
pub(crate) mod catalog;
