pub mod list;
pub mod logical;
pub mod numeric;
pub mod text;
pub mod time;
mod utils;

use crate::function_registry::FunctionRegistry;

pub fn load_builtins(reg: &mut FunctionRegistry) {
    numeric::register_builtins(reg);
    logical::register_builtins(reg);
    list::register_builtins(reg);
    text::register_builtins(reg);
    time::register_builtins(reg);
}
