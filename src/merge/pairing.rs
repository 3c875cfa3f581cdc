use crate::model::{Range, RangeId};
use std::cmp::Ordering;

/// Pairs each wanted range with the base range occupying exactly the same span.
///
/// Range ids are not comparable across bundles, so position is the only key.
/// Both sides are sorted by start-then-end and merge-joined. The result is
/// aligned with `wanted`.
pub fn pair_by_position<'a, I>(base: I, wanted: &[&Range]) -> Vec<Option<(RangeId, &'a Range)>>
where
    I: IntoIterator<Item = (&'a RangeId, &'a Range)>,
{
    let mut base: Vec<(RangeId, &'a Range)> = base.into_iter().map(|(id, r)| (*id, r)).collect();
    base.sort_by(|(a_id, a), (b_id, b)| a.compare_span(b).then_with(|| a_id.cmp(b_id)));

    let mut order: Vec<usize> = (0..wanted.len()).collect();
    order.sort_by(|&a, &b| wanted[a].compare_span(wanted[b]));

    let mut pairs = vec![None; wanted.len()];
    let mut cursor = 0;
    for index in order {
        let target = wanted[index];
        while cursor < base.len() && base[cursor].1.compare_span(target) == Ordering::Less {
            cursor += 1;
        }
        if let Some(&(id, range)) = base.get(cursor) {
            if range.compare_span(target) == Ordering::Equal {
                pairs[index] = Some((id, range));
            }
        }
    }
    pairs
}
