//! The invocation engine (C3) and its resumer (C4): the state machine that
//! drives one invocation's lifecycle from build fetch to cleanup.

mod imp;
mod resumer;

pub use imp::{Invocation, InvocationEngine};
pub(crate) use resumer::Resumer;
