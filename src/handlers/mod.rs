// handlers/mod.rs - two security tiers
//
// Public (no token) → Protected (bearer token checked by the gate)
pub mod protected;
pub mod public;
