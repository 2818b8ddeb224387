//! gamekey: logical game inputs and their spec strings.
//!
//! - `GameKey`: every input the engine can press, independent of the physical
//!   binding chosen by the input backend.
//! - Spec helpers: `GameKey::from_spec`, `GameKey::to_spec`.
//!
//! Spec strings are the snake_case variant names (`normal_attack`,
//! `switch_next`). Parsing is case-insensitive and additionally accepts a
//! small set of aliases (`attack`, `ult`, `next`, `w`, ...).

mod key;
pub use key::GameKey;

mod spec;
