//! Dancing Links engine: the arena-backed sparse matrix, the Algorithm X
//! search with the MRV heuristic, and the solution sink abstraction.

pub mod matrix;
pub mod search;
pub mod sink;

pub use matrix::{CoverMatrix, Node, ROOT};
pub use search::Solver;
pub use sink::{BinarySink, CompositeSink, CountingSink, SolutionSink, SolutionView, TextSink};
