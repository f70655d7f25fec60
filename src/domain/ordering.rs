//! Display order between sibling nodes

use std::cmp::Ordering;

use crate::domain::{EntityKind, EntityRecord};

/// Sequences sort by `order`, paths by `number`, everything else by display text.
///
/// Only meaningful between records of the same kind.
pub fn compare_records(a: &EntityRecord, b: &EntityRecord) -> Ordering {
    let by_display = || a.display.cmp(&b.display).then(a.key.cmp(&b.key));
    match (a.kind, b.kind) {
        (EntityKind::Sequence, EntityKind::Sequence) => a.order.cmp(&b.order).then_with(by_display),
        (EntityKind::Path, EntityKind::Path) => a.number.cmp(&b.number).then_with(by_display),
        _ => by_display(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_sequences_when_comparing_then_order_wins_over_display() {
        let first = EntityRecord::new(EntityKind::Sequence, 1, "Zeta").with_order(0);
        let second = EntityRecord::new(EntityKind::Sequence, 2, "Alpha").with_order(1);
        assert_eq!(compare_records(&first, &second), Ordering::Less);
    }

    #[test]
    fn given_paths_when_comparing_then_number_decides() {
        let p2 = EntityRecord::new(EntityKind::Path, 1, "path").with_number(2);
        let p1 = EntityRecord::new(EntityKind::Path, 2, "path").with_number(1);
        assert_eq!(compare_records(&p2, &p1), Ordering::Greater);
    }

    #[test]
    fn given_components_when_comparing_then_display_decides() {
        let a = EntityRecord::new(EntityKind::Component, 9, "Bracket");
        let b = EntityRecord::new(EntityKind::Component, 1, "Housing");
        assert_eq!(compare_records(&a, &b), Ordering::Less);
    }
}
