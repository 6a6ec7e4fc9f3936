//! The escape check: batch judgment of reference-flow facts
//!
//! A fact records one candidate reference assignment: a value defined in
//! `source` is stored into a location owned by `sink`. The flow is legal
//! exactly when the sink is the source region itself or one of its
//! descendants — a child scope may freely hold a reference into its
//! parent's data, because the parent outlives it. Everything else risks a
//! dangling reference once the source region is retired.
//!
//! The check is pure and one-shot: it executes no allocations, mutates
//! nothing, and reports one violation per offending fact. Whether the
//! analyzed program is rejected on violations is the caller's gate to
//! enforce, like a type error.

use tracing::debug;

use strata_memory::RegionId;

use crate::forest::RegionForest;

/// Opaque site token supplied by the front-end
///
/// Carried through unchanged so violations can be mapped back to source
/// locations; the checker never interprets or formats it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Site(pub u64);

/// One externally produced reference-flow fact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fact {
    /// Region the flowing value was defined in
    pub source: RegionId,
    /// Region owning the location being stored into
    pub sink: RegionId,
    /// Front-end token for the assignment site
    pub site: Site,
}

impl Fact {
    /// Convenience constructor
    pub fn new(source: RegionId, sink: RegionId, site: Site) -> Self {
        Self { source, sink, site }
    }
}

/// Why a fact was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// The sink is a strict ancestor of the source: the stored reference
    /// dangles the moment the source region is retired
    EscapesToAncestor,
    /// Source and sink sit on disjoint branches; neither lifetime bounds
    /// the other, so the flow cannot be proven safe
    UnrelatedRegions,
    /// The fact names a region the forest never defined
    UnknownRegion,
}

/// One rejected fact, with everything the front-end needs to report it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Violation {
    /// Region the flowing value was defined in
    pub source: RegionId,
    /// Region owning the location being stored into
    pub sink: RegionId,
    /// The offending fact's site token
    pub site: Site,
    /// Why the flow was rejected
    pub kind: ViolationKind,
}

/// Escape checker over one region forest
#[derive(Debug)]
pub struct EscapeChecker<'a> {
    forest: &'a RegionForest,
}

impl<'a> EscapeChecker<'a> {
    /// Creates a checker over a prepared forest
    pub fn new(forest: &'a RegionForest) -> Self {
        Self { forest }
    }

    /// Judges a batch of facts
    ///
    /// `Ok(())` when every flow is legal; otherwise every offending fact
    /// contributes exactly one [`Violation`], in input order. O(F) over the
    /// forest's precomputed intervals.
    pub fn check(&self, facts: &[Fact]) -> Result<(), Vec<Violation>> {
        let violations: Vec<Violation> = facts
            .iter()
            .filter_map(|fact| {
                self.judge(fact).map(|kind| Violation {
                    source: fact.source,
                    sink: fact.sink,
                    site: fact.site,
                    kind,
                })
            })
            .collect();

        debug!(
            facts = facts.len(),
            violations = violations.len(),
            regions = self.forest.len(),
            "escape check complete"
        );

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    fn judge(&self, fact: &Fact) -> Option<ViolationKind> {
        if !self.forest.contains(fact.source) || !self.forest.contains(fact.sink) {
            return Some(ViolationKind::UnknownRegion);
        }
        if self.forest.is_ancestor_or_self(fact.source, fact.sink) {
            // Sink is the source region itself or nested inside it: the
            // sink dies first, taking the reference with it.
            return None;
        }
        if self.forest.is_ancestor_or_self(fact.sink, fact.source) {
            return Some(ViolationKind::EscapesToAncestor);
        }
        Some(ViolationKind::UnrelatedRegions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> RegionId {
        RegionId::from_raw(raw)
    }

    /// root ← child ← grandchild, plus a sibling of child
    fn family() -> RegionForest {
        RegionForest::from_edges([
            (id(0), None),
            (id(1), Some(id(0))),
            (id(2), Some(id(1))),
            (id(3), Some(id(0))),
        ])
        .unwrap()
    }

    #[test]
    fn child_into_parent_is_legal() {
        let forest = family();
        let checker = EscapeChecker::new(&forest);

        // A value defined in root, stored into memory owned by the child:
        // the child dies first, so nothing can dangle.
        let facts = [
            Fact::new(id(0), id(1), Site(1)),
            Fact::new(id(0), id(2), Site(2)),
            Fact::new(id(1), id(1), Site(3)),
        ];
        assert!(checker.check(&facts).is_ok());
    }

    #[test]
    fn parent_into_child_escapes() {
        let forest = family();
        let checker = EscapeChecker::new(&forest);

        let facts = [Fact::new(id(1), id(0), Site(7))];
        let violations = checker.check(&facts).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::EscapesToAncestor);
        assert_eq!(violations[0].site, Site(7));
    }

    #[test]
    fn sibling_flow_is_unrelated() {
        let forest = family();
        let checker = EscapeChecker::new(&forest);

        let violations = checker
            .check(&[Fact::new(id(1), id(3), Site(9))])
            .unwrap_err();
        assert_eq!(violations[0].kind, ViolationKind::UnrelatedRegions);
    }

    #[test]
    fn unknown_region_is_reported_not_panicked() {
        let forest = family();
        let checker = EscapeChecker::new(&forest);

        let violations = checker
            .check(&[Fact::new(id(42), id(0), Site(0))])
            .unwrap_err();
        assert_eq!(violations[0].kind, ViolationKind::UnknownRegion);
    }

    #[test]
    fn one_violation_per_offending_fact() {
        let forest = family();
        let checker = EscapeChecker::new(&forest);

        let facts = [
            Fact::new(id(2), id(0), Site(1)), // grandchild → root: escapes
            Fact::new(id(0), id(2), Site(2)), // root → grandchild: legal
            Fact::new(id(3), id(1), Site(3)), // sibling branches: unrelated
        ];
        let violations = checker.check(&facts).unwrap_err();
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].site, Site(1));
        assert_eq!(violations[1].site, Site(3));
    }

    #[test]
    fn empty_batch_passes() {
        let forest = family();
        assert!(EscapeChecker::new(&forest).check(&[]).is_ok());
    }
}
