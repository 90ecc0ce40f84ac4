pub mod instance_management;
pub mod interaction;
pub mod observability;
pub mod quota;
pub mod tenant_plans;
pub mod transport;
