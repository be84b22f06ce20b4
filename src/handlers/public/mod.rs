// handlers/public/mod.rs - Handlers reachable without a token

pub mod register; // POST /register - duplicate-checked entry registration

pub use register::register_post;
