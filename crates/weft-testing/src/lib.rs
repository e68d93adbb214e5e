//! Testing utilities and harness for Weft

pub mod testing;

// Re-export testing utilities
pub use testing::*;

pub mod prelude {
    pub use crate::testing::*;
    pub use weft_core::{
        Component, ComponentClass, ComponentHandle, ComponentType, Context, Cx, Descriptor, Error,
        Hooks, Props, Record, View,
    };
}
