//! Panel navigation state
//!
//! The function catalog and the navigation state machine that walks it.

pub mod catalog;
pub mod machine;

pub use catalog::{
    Function, FunctionCatalog, FunctionSpec, DEFAULT_FUNCTIONS, ERROR_DETAIL_FUNCTIONS, MANUAL_MODE,
};
pub use machine::{NavEvent, StateMachine, StateSnapshot, SubState, Transition};
