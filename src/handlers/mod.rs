// handlers/mod.rs - HTTP handlers
//
// users:  /api/users[/:id] CRUD over the in-memory store
// health: /health liveness probe

pub mod health;
pub mod users;

pub use health::health;
