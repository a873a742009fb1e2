pub mod evaluator;
pub mod exp6;
pub mod pair;
pub mod params;
pub mod resolver;
pub mod restart;
pub mod tally;
