// handlers/protected/mod.rs - Handlers behind the token gate

pub mod not_found; // any unmatched path or method

pub use not_found::not_found;
