//! Neighbor lists for respa force splitting: full, inner and middle lists built
//! in one pass under a single ownership policy.

pub mod bins;
pub mod builder;
pub mod list;
pub mod policy;

pub use builder::{BuildStage, NeighborBuilder, NeighborSettings};
pub use list::{Neighbor, PagedList, RespaLists};
pub use policy::{ExclusionRules, NeighborPolicy, NewtonMode, RespaCutoffs, SearchMethod};
