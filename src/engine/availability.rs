use ulid::Ulid;

use crate::limits::MIN_SLOT_DURATION_MS;
use crate::model::*;

use super::EngineError;

// ── Reservation algorithm ─────────────────────────────────────────

/// Plan carving `reserved` out of a trainer's free time.
///
/// Exactly one slot `[s, e)` must fully contain `reserved`. The plan shrinks
/// it to `[s, reserved.start)`, adds `[reserved.end, e)` under `right_id`,
/// then prunes every slot of the trainer shorter than one hour, remainders
/// included. Zero-length remainders are never materialized.
///
/// Pure: nothing changes until the caller applies the plan.
pub fn plan_reservation(
    trainer: &TrainerState,
    reserved: Span,
    right_id: Ulid,
) -> Result<Reservation, EngineError> {
    let mut containing = trainer
        .slots
        .overlapping(&reserved)
        .filter(|s| s.span.contains_span(&reserved));
    let slot = match (containing.next(), containing.next()) {
        (Some(slot), None) => *slot,
        _ => {
            return Err(EngineError::NotAvailable {
                trainer_id: trainer.id,
                span: reserved,
            });
        }
    };

    let left = remainder(slot.span.start, reserved.start);
    let right = remainder(reserved.end, slot.span.end).map(|span| Slot { id: right_id, span });

    let pruned = trainer
        .slots
        .iter()
        .filter(|s| s.id != slot.id && s.span.duration_ms() < MIN_SLOT_DURATION_MS)
        .map(|s| s.id)
        .collect();

    Ok(Reservation {
        trainer_id: trainer.id,
        slot_id: slot.id,
        original: slot.span,
        reserved,
        left,
        right,
        pruned,
    })
}

/// `[start, end)` if it survives pruning.
fn remainder(start: Ms, end: Ms) -> Option<Span> {
    (end - start >= MIN_SLOT_DURATION_MS).then(|| Span::new(start, end))
}

/// Slots of one trainer that break the at-rest invariants: overlapping
/// neighbours (sorted order makes adjacent pairs sufficient) or sub-hour
/// duration.
pub fn slot_violations(trainer: &TrainerState) -> Vec<(Ulid, &'static str)> {
    let mut out = Vec::new();
    let mut prev: Option<&Slot> = None;
    for slot in trainer.slots.iter() {
        if slot.span.duration_ms() < MIN_SLOT_DURATION_MS {
            out.push((slot.id, "slot shorter than one hour"));
        }
        if let Some(p) = prev
            && p.span.overlaps(&slot.span)
        {
            out.push((slot.id, "slot overlaps previous slot"));
        }
        // Keep the slot reaching furthest right as the comparison point.
        if prev.is_none_or(|p| slot.span.end > p.span.end) {
            prev = Some(slot);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::conflict::check_slot_free;
    use crate::limits::HOUR_MS as H;
    use proptest::prelude::*;

    const M: Ms = 60_000;

    fn trainer_with(spans: &[(Ms, Ms)]) -> TrainerState {
        let mut t = TrainerState::new(Ulid::new(), None);
        for &(s, e) in spans {
            t.slots.insert(Slot { id: Ulid::new(), span: Span::new(s, e) });
        }
        t
    }

    fn spans(t: &TrainerState) -> Vec<Span> {
        t.slots.iter().map(|s| s.span).collect()
    }

    fn reserve(t: &mut TrainerState, start: Ms, end: Ms) -> Result<Reservation, EngineError> {
        let plan = plan_reservation(t, Span::new(start, end), Ulid::new())?;
        t.apply_reservation(&plan);
        Ok(plan)
    }

    #[test]
    fn split_in_middle_leaves_two() {
        let mut t = trainer_with(&[(9 * H, 17 * H)]);
        reserve(&mut t, 10 * H, 11 * H).unwrap();
        assert_eq!(spans(&t), vec![Span::new(9 * H, 10 * H), Span::new(11 * H, 17 * H)]);
    }

    #[test]
    fn reserve_at_slot_start_drops_empty_left() {
        let mut t = trainer_with(&[(9 * H, 17 * H)]);
        let plan = reserve(&mut t, 9 * H, 10 * H).unwrap();
        assert_eq!(plan.left, None);
        assert_eq!(spans(&t), vec![Span::new(10 * H, 17 * H)]);
    }

    #[test]
    fn reserve_at_slot_end_drops_empty_right() {
        let mut t = trainer_with(&[(9 * H, 17 * H)]);
        let plan = reserve(&mut t, 16 * H, 17 * H).unwrap();
        assert_eq!(plan.right, None);
        assert_eq!(spans(&t), vec![Span::new(9 * H, 16 * H)]);
    }

    #[test]
    fn reserve_whole_slot_removes_it() {
        let mut t = trainer_with(&[(9 * H, 11 * H)]);
        reserve(&mut t, 9 * H, 11 * H).unwrap();
        assert!(t.slots.is_empty());
    }

    #[test]
    fn sub_hour_remainders_are_pruned() {
        let mut t = trainer_with(&[(9 * H, 12 * H)]);
        reserve(&mut t, 9 * H + 30 * M, 11 * H + 15 * M).unwrap();
        assert!(t.slots.is_empty());
    }

    #[test]
    fn exactly_one_hour_remainder_survives() {
        let mut t = trainer_with(&[(9 * H, 12 * H)]);
        reserve(&mut t, 10 * H, 11 * H + 30 * M).unwrap();
        assert_eq!(spans(&t), vec![Span::new(9 * H, 10 * H)]);
    }

    #[test]
    fn window_spanning_two_slots_is_not_available() {
        let mut t = trainer_with(&[(9 * H, 10 * H), (11 * H, 12 * H)]);
        let before = spans(&t);
        let err = reserve(&mut t, 9 * H + 30 * M, 11 * H + 30 * M).unwrap_err();
        assert!(matches!(err, EngineError::NotAvailable { .. }));
        assert_eq!(spans(&t), before);
    }

    #[test]
    fn partially_covered_window_is_not_available() {
        let t = trainer_with(&[(9 * H, 12 * H)]);
        let err = plan_reservation(&t, Span::new(11 * H, 13 * H), Ulid::new()).unwrap_err();
        assert!(matches!(err, EngineError::NotAvailable { .. }));
    }

    #[test]
    fn neighbouring_slot_is_untouched() {
        // The looser "overlaps" lookup would happily pick the first slot here.
        let mut t = trainer_with(&[(8 * H, 10 * H), (10 * H, 14 * H)]);
        let first = t.slots.iter().next().unwrap().id;
        reserve(&mut t, 11 * H, 12 * H).unwrap();
        assert_eq!(
            spans(&t),
            vec![Span::new(8 * H, 10 * H), Span::new(10 * H, 11 * H), Span::new(12 * H, 14 * H)]
        );
        assert_eq!(t.slots.get(first).unwrap().span, Span::new(8 * H, 10 * H));
    }

    #[test]
    fn pre_existing_short_slot_is_pruned_too() {
        let mut t = trainer_with(&[(6 * H, 6 * H + 20 * M), (9 * H, 17 * H)]);
        let plan = reserve(&mut t, 10 * H, 11 * H).unwrap();
        assert_eq!(plan.pruned.len(), 1);
        assert_eq!(spans(&t), vec![Span::new(9 * H, 10 * H), Span::new(11 * H, 17 * H)]);
    }

    #[test]
    fn violations_detected() {
        let t = trainer_with(&[(9 * H, 9 * H + 10 * M), (9 * H + 5 * M, 12 * H)]);
        let v = slot_violations(&t);
        assert_eq!(v.len(), 2);
        assert!(slot_violations(&trainer_with(&[(9 * H, 10 * H), (10 * H, 12 * H)])).is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(Ms, Ms),
        Reserve(Ms, Ms),
    }

    fn op() -> impl Strategy<Value = Op> {
        // Quarter-hour grid across one business day.
        let window = (24u8..88, 1u8..40).prop_map(|(s, len)| {
            let start = s as Ms * 15 * M;
            (start, start + len as Ms * 15 * M)
        });
        prop_oneof![
            window.clone().prop_map(|(s, e)| Op::Add(s, e)),
            window.prop_map(|(s, e)| Op::Reserve(s, e)),
        ]
    }

    proptest! {
        #[test]
        fn overlap_is_symmetric(a in 0i64..1000, la in 1i64..500, b in 0i64..1000, lb in 1i64..500) {
            let x = Span::new(a, a + la);
            let y = Span::new(b, b + lb);
            prop_assert_eq!(x.overlaps(&y), y.overlaps(&x));
        }

        #[test]
        fn touching_never_overlaps(t0 in 0i64..1000, d1 in 1i64..500, d2 in 1i64..500) {
            let a = Span::new(t0, t0 + d1);
            let b = Span::new(t0 + d1, t0 + d1 + d2);
            prop_assert!(!a.overlaps(&b));
        }

        #[test]
        fn slots_stay_disjoint_and_bookable(ops in proptest::collection::vec(op(), 1..40)) {
            let mut t = TrainerState::new(Ulid::new(), None);
            for op in ops {
                match op {
                    Op::Add(s, e) => {
                        let span = Span::new(s, e);
                        if span.duration_ms() >= MIN_SLOT_DURATION_MS && check_slot_free(&t, &span).is_ok() {
                            t.slots.insert(Slot { id: Ulid::new(), span });
                        }
                    }
                    Op::Reserve(s, e) => {
                        let before = spans(&t);
                        match plan_reservation(&t, Span::new(s, e), Ulid::new()) {
                            Ok(plan) => t.apply_reservation(&plan),
                            Err(_) => prop_assert_eq!(spans(&t), before),
                        }
                    }
                }
                prop_assert!(slot_violations(&t).is_empty(), "{:?}", spans(&t));
            }
        }
    }
}
