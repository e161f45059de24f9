//! Dialogue engine: decides, per turn, between solving, offering a graph,
//! and rendering a previously offered one

mod engine;
mod state;
mod vocabulary;

#[cfg(test)]
mod proptests;
#[cfg(test)]
pub mod testing;

pub use engine::DialogueEngine;
#[cfg(test)]
pub use engine::{GRAPH_ACKNOWLEDGEMENT, OFFER_SUFFIX};
pub use state::DialogueState;
