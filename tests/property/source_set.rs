use std::collections::BTreeSet;

use proptest::prelude::*;
use runtest::process::{Source, SourceSet};

fn source() -> impl Strategy<Value = Source> {
    proptest::sample::select(Source::ALL.to_vec())
}

fn sources() -> impl Strategy<Value = Vec<Source>> {
    proptest::collection::vec(source(), 0..12)
}

fn model(items: &[Source]) -> BTreeSet<Source> {
    items.iter().copied().collect()
}

proptest! {
    #[test]
    fn behaves_like_an_ordered_set(a in sources(), b in sources()) {
        let (sa, sb) = (a.iter().copied().collect::<SourceSet>(), b.iter().copied().collect::<SourceSet>());
        let (ma, mb) = (model(&a), model(&b));

        prop_assert_eq!(sa.len(), ma.len());
        prop_assert_eq!(sa.iter().collect::<Vec<_>>(), ma.iter().copied().collect::<Vec<_>>());
        prop_assert_eq!(
            sa.union(sb).iter().collect::<BTreeSet<_>>(),
            ma.union(&mb).copied().collect::<BTreeSet<_>>()
        );
        prop_assert_eq!(
            sa.intersection(sb).iter().collect::<BTreeSet<_>>(),
            ma.intersection(&mb).copied().collect::<BTreeSet<_>>()
        );
        prop_assert_eq!(
            sa.difference(sb).iter().collect::<BTreeSet<_>>(),
            ma.difference(&mb).copied().collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn applying_changes_turns_one_set_into_the_other(a in sources(), b in sources()) {
        let from: SourceSet = a.into_iter().collect();
        let to: SourceSet = b.into_iter().collect();

        let mut applied = from;
        for source in from.changed(to).iter() {
            if to.contains(source) {
                prop_assert!(applied.insert(source));
            } else {
                prop_assert!(applied.remove(source));
            }
        }
        prop_assert_eq!(applied, to);
    }

    #[test]
    fn iteration_follows_dispatch_order(a in sources()) {
        let set: SourceSet = a.into_iter().collect();
        let order: Vec<Source> = set.iter().collect();

        prop_assert!(order.windows(2).all(|w| w[0] < w[1]));
    }
}
