//! Processing stages of a remote workflow
//!
//! The service reports progress as a free-text label ("Reasoning: evaluating
//! option 2 of 5"). This module keeps the ordered list of known stages and
//! turns such a label into a per-stage checklist:
//!
//! - **Registry**: fixed, totally ordered stage descriptors
//! - **Resolver**: label → pending / active / completed for every stage

pub mod registry;
pub mod resolver;

pub use registry::{StageDescriptor, StageRegistry};
pub use resolver::{
    active_stage, all_completed, all_pending, resolve, resolve_with, StageMatcher, StageStatus,
    StageView, SubstringMatcher,
};
