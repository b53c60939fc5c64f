//! sea-orm entities
pub mod comics;
pub mod credit_balances;
