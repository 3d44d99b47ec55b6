pub mod hook;
pub mod queue;
pub mod record;
pub mod registry;
pub mod session;
pub mod telemetry;
pub mod validator;
pub mod worker;
