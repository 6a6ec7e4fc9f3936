//! Escape checker for region-allocated programs
//!
//! A static analysis pass that rejects any reference flow from a
//! shorter-lived region into a longer-lived or unrelated one, before the
//! program is accepted for execution. It consumes two things a front-end
//! produces per compilation unit:
//!
//! - the region topology as `(id, parent)` pairs (a running
//!   [`RegionStack`](strata_memory::RegionStack) records exactly this in
//!   its lineage), assembled into a [`RegionForest`]
//! - a batch of [`Fact`]s, one per candidate reference assignment
//!
//! There is no runtime dependency in the other direction: the allocator
//! runtime never calls into this crate. The analysis is a simplified
//! borrow check, generalized to plain identifiers over a statically known
//! region tree.
//!
//! # Example
//!
//! ```
//! use strata_check::{EscapeChecker, Fact, RegionForest, Site, ViolationKind};
//! use strata_memory::RegionId;
//!
//! let root = RegionId::from_raw(0);
//! let child = RegionId::from_raw(1);
//! let forest = RegionForest::from_edges([(root, None), (child, Some(root))]).unwrap();
//! let checker = EscapeChecker::new(&forest);
//!
//! // Child holding a reference into root's data: the root outlives it.
//! assert!(checker.check(&[Fact::new(child, root, Site(0))]).is_ok());
//!
//! // Root holding a reference into child's data: dangles at child's exit.
//! let violations = checker.check(&[Fact::new(root, child, Site(1))]).unwrap_err();
//! assert_eq!(violations[0].kind, ViolationKind::EscapesToAncestor);
//! ```

#![warn(missing_docs)]

mod check;
mod forest;

pub use check::{EscapeChecker, Fact, Site, Violation, ViolationKind};
pub use forest::{ForestError, RegionForest};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
