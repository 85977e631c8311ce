pub mod catalog;
pub mod macros;
pub mod progress;
pub mod time;
pub mod work_item;

pub use catalog::*;
pub use progress::*;
pub use time::*;
pub use work_item::*;
