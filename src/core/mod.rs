// Core modules implementing library resolution, symbol binding, and error modeling.
pub mod binding;
pub mod error;
pub mod resolve;
pub mod search;
pub mod symbols;
pub mod sys;
