use std::cell::Cell;

use bitview::{
    bits::BitOrder,
    expr::{boolean, field, this},
    field::Field,
    layout::{Layout, Structure},
    value::Value,
    view::StructureView,
};
use proptest::prelude::*;

fn ranged(lo: i128, hi: i128, order: BitOrder) -> Layout {
    Layout::compile(
        &Structure::new("Ranged")
            .bit_order(order)
            .field(Field::uint("ranged", 3, 9).requires(this().in_range(lo, hi)))
            .field(Field::alias("alias", "ranged"))
            .field(Field::uint("plain", 12, 12))
            .field(Field::flag("pinned", 24).domain(this().equals(boolean(true))))
            .requires(field("plain").ge(field("ranged"))),
    )
    .unwrap()
}

fn bit_order() -> impl Strategy<Value = BitOrder> {
    prop_oneof![Just(BitOrder::LsbFirst), Just(BitOrder::MsbFirst)]
}

proptest! {
    #[test]
    fn unconstrained_field_is_always_ok(bytes in any::<[u8; 4]>(), order in bit_order()) {
        let layout = ranged(0, 10, order);
        let mut bytes = bytes;
        let view = StructureView::new(&layout, &mut bytes).unwrap();
        let plain = view.field("plain").unwrap();

        prop_assert!(plain.ok());
        prop_assert!(plain.could_write_value(plain.read()));
    }

    #[test]
    fn range_predicate_matches_could_write(
        bytes in any::<[u8; 4]>(),
        lo in 0i128..200,
        span in 0i128..200,
        candidate in -10i128..600,
    ) {
        let hi = lo + span;
        let layout = ranged(lo, hi, BitOrder::LsbFirst);
        let mut bytes = bytes;
        let view = StructureView::new(&layout, &mut bytes).unwrap();
        let ranged = view.field("ranged").unwrap();

        let representable = (0..512).contains(&candidate);
        prop_assert_eq!(
            ranged.could_write_value(candidate),
            representable && lo <= candidate && candidate <= hi
        );
    }

    #[test]
    fn alias_reads_what_target_reads(
        bytes in any::<[u8; 4]>(),
        value in 0u16..512,
        through_alias in any::<bool>(),
        order in bit_order(),
    ) {
        let layout = ranged(0, 10, order);
        let mut bytes = bytes;
        let view = StructureView::new(&layout, &mut bytes).unwrap();
        let ranged = view.field("ranged").unwrap();
        let alias = view.field("alias").unwrap();

        prop_assert_eq!(ranged.read(), alias.read());
        if through_alias { alias.write(value) } else { ranged.write(value) }
        prop_assert_eq!(ranged.read(), Value::Int(value.into()));
        prop_assert_eq!(alias.read(), Value::Int(value.into()));
        prop_assert_eq!(ranged.ok(), value <= 10);
        // The alias carries no predicate of its own.
        prop_assert!(alias.ok());
    }

    #[test]
    fn writes_leave_other_fields_alone(
        bytes in any::<[u8; 4]>(),
        value in 0u16..4096,
        order in bit_order(),
    ) {
        let layout = ranged(0, 10, order);
        let mut bytes = bytes;
        let view = StructureView::new(&layout, &mut bytes).unwrap();
        let before = (view.field("ranged").unwrap().read(), view.field("pinned").unwrap().read());

        view.field("plain").unwrap().write(value);
        prop_assert_eq!(view.field("plain").unwrap().read(), Value::Int(value.into()));
        prop_assert_eq!(view.field("ranged").unwrap().read(), before.0);
        prop_assert_eq!(view.field("pinned").unwrap().read(), before.1);
    }

    #[test]
    fn literal_pin_accepts_only_the_literal(bytes in any::<[u8; 4]>()) {
        let layout = ranged(0, 10, BitOrder::LsbFirst);
        let mut bytes = bytes;
        let view = StructureView::new(&layout, &mut bytes).unwrap();
        let pinned = view.field("pinned").unwrap();

        prop_assert!(pinned.could_write_value(true));
        prop_assert!(!pinned.could_write_value(false));
        prop_assert_eq!(pinned.ok(), pinned.read() == Value::Bool(true));
    }

    #[test]
    fn queries_are_idempotent(bytes in any::<[u8; 4]>(), candidate in 0i128..512) {
        let layout = ranged(5, 50, BitOrder::LsbFirst);
        let mut bytes = bytes;
        let cells = Cell::from_mut(&mut bytes[..]).as_slice_of_cells();
        let snapshot: Vec<u8> = cells.iter().map(Cell::get).collect();
        let view = StructureView::from_cells(&layout, cells).unwrap();
        let ranged = view.field("ranged").unwrap();

        prop_assert_eq!(view.ok(), view.ok());
        prop_assert_eq!(ranged.ok(), ranged.ok());
        prop_assert_eq!(ranged.could_write_value(candidate), ranged.could_write_value(candidate));
        prop_assert_eq!(cells.iter().map(Cell::get).collect::<Vec<_>>(), snapshot);
    }

    #[test]
    fn structure_ok_implies_every_field_ok(bytes in any::<[u8; 4]>(), order in bit_order()) {
        let layout = ranged(0, 100, order);
        let mut bytes = bytes;
        let view = StructureView::new(&layout, &mut bytes).unwrap();

        if view.ok() {
            prop_assert!(view.fields().all(|f| f.ok()));
            let plain = view.field("plain").unwrap().read().as_int();
            let ranged = view.field("ranged").unwrap().read().as_int();
            prop_assert!(plain >= ranged);
        }
    }
}
