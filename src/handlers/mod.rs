pub mod health_handlers;
pub mod invocation_handlers;
pub mod object_handlers;
