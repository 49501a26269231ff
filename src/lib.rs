//! duel-2048: a 2048 engine with a bomb-tile variant, a search-based AI
//! opponent, and coordinators for single-player sessions and two-player rooms.
//!
//! This crate provides:
//! - A `GridEngine` over an explicit `EngineState` (classic 4x4 and 6x6 bomb rules)
//! - A depth-limited search `Agent` with single-threaded and rayon variants
//! - `SessionCoordinator` / `RoomCoordinator` plus a line-JSON TCP server
//!
//! Quick start:
//! ```
//! use duel_2048::engine::{Direction, GridEngine, Status};
//! use duel_2048::agent::Agent;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let engine = GridEngine::classic();
//! let mut rng = StdRng::seed_from_u64(42);
//! let state = engine.new_game(&mut rng);
//! assert_eq!(state.grid.count_empty(), 14);
//!
//! let mut agent = Agent::new(engine.clone());
//! let dir = agent.best_move(&state.grid, &mut rng);
//! let next = engine.apply_move(state, dir, &mut rng);
//! assert_eq!(next.status, Status::Continue);
//! # let _ = Direction::ALL;
//! ```
//!
//! Randomness is always passed in (`R: Rng`) and time comes from a
//! [`clock::Clock`], so seeded RNGs and a `ManualClock` make every rule
//! reproducible.
pub mod agent;
pub mod clock;
pub mod config;
pub mod engine;
pub mod records;
pub mod room;
pub mod server;
pub mod session;
pub mod user;
pub mod wire;
