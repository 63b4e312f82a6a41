use pcbmill_core::Units;
use pcbmill_geometry::{
    coord, Axis, ConvertUnits, GeometryObject, Point, Shape, ShapeArena, ShapeRole, Transform,
};
use proptest::prelude::*;

fn sample_object() -> GeometryObject {
    let mut obj = GeometryObject::new(Units::In);
    obj.solid.push(Shape::Point(Point::new(1.0, 2.0)));
    obj.follow.push(Shape::Point(Point::new(1.0, 2.0)));
    obj
}

fn first_point(shapes: &[Shape]) -> (f64, f64) {
    match &shapes[0] {
        Shape::Point(p) => (p.x(), p.y()),
        other => panic!("unexpected shape {:?}", other),
    }
}

#[test]
fn test_stores_stay_aligned_after_transforms() {
    let mut obj = sample_object();
    obj.scale(2.0, 3.0, coord(0.0, 0.0));
    obj.offset(1.0, -1.0);
    obj.mirror(Axis::Y, coord(0.0, 0.0));
    obj.rotate(30.0, coord(1.0, 1.0));
    obj.skew(10.0, 5.0, coord(0.0, 0.0));

    assert_eq!(first_point(&obj.solid), first_point(&obj.follow));
}

#[test]
fn test_arena_and_object_agree() {
    let mut arena: ShapeArena<String> = ShapeArena::new();
    arena.insert("D10".into(), ShapeRole::Solid, Shape::Point(Point::new(1.0, 2.0)));
    let mut obj = sample_object();

    arena.rotate(45.0, coord(0.0, 0.0));
    obj.rotate(45.0, coord(0.0, 0.0));

    let b = arena.bounds().unwrap();
    let (x, y) = first_point(&obj.solid);
    assert!((b.min_x - x).abs() < 1e-12);
    assert!((b.min_y - y).abs() < 1e-12);
}

proptest! {
    #[test]
    fn prop_unit_round_trip(x in -1000.0f64..1000.0, y in -1000.0f64..1000.0) {
        let mut obj = GeometryObject::new(Units::Mm);
        obj.solid.push(Shape::Point(Point::new(x, y)));

        let there = obj.convert_units(Units::In);
        let back = obj.convert_units(Units::Mm);
        prop_assert!((there * back - 1.0).abs() < 1e-12);

        let (rx, ry) = first_point(&obj.solid);
        prop_assert!((rx - x).abs() < 1e-9);
        prop_assert!((ry - y).abs() < 1e-9);
    }

    #[test]
    fn prop_offset_is_reversible(dx in -50.0f64..50.0, dy in -50.0f64..50.0) {
        let mut obj = sample_object();
        obj.offset(dx, dy);
        obj.offset(-dx, -dy);
        let (x, y) = first_point(&obj.follow);
        prop_assert!((x - 1.0).abs() < 1e-9);
        prop_assert!((y - 2.0).abs() < 1e-9);
    }
}
