#[macro_export]
macro_rules! register_functions {
    ( $reg:expr; $($fn:path),+ $(,)? ) => {{
        use std::sync::Arc;
        $(
            $reg.register(Arc::new($fn));
        )+
    }};
}

/// Implements `Function::caps` from a list of `FnCaps` flags.
#[macro_export]
macro_rules! func_caps {
    ( $($cap:ident)|+ ) => {
        fn caps(&self) -> $crate::function::FnCaps {
            $( $crate::function::FnCaps::$cap )|+
        }
    };
}
