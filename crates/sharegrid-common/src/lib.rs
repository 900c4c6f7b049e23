pub mod path;
pub mod time;
pub mod value;

pub use path::*;
pub use time::*;
pub use value::*;
