pub mod invocation;
pub mod payload;
