mod change_item;

pub use change_item::*;
