//! The owned tree a class file gets read into.

pub mod annotation;
pub mod attribute;
pub mod class;
pub mod code;
pub mod descriptor;
pub mod field;
pub mod instruction;
pub mod method;
pub mod pool;
pub mod version;
