//! eTuitionBd backend: a tutoring marketplace where students post tuition requests,
//! tutors apply, and students pay for an accepted tutor through a hosted checkout.

pub mod config;
pub mod error;
pub mod identity;
pub mod marketplace;
pub mod payments;
pub mod store;
pub mod telemetry;
