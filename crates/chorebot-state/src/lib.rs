//! State model and condition expressions for the chorebot engine.
//!
//! - [`StateRecord`] holds the latest observation for one named state.
//! - [`StateStore`] owns every record of a profile and applies mutex-group
//!   clearing on update.
//! - [`Expression`] is a compiled predicate over state records, evaluated
//!   against a [`StateLookup`] at a given time.

mod error;
pub mod expr;
mod record;
mod store;

pub use error::{Error, Result};
pub use expr::{ExprError, Expression};
pub use record::{RecordSnapshot, StateEvent, StateRecord};
pub use store::{StateDecl, StateLookup, StateStore};
