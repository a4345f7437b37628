//! Tests for BoundingBox and Envelope operations.

use coverage_common::{BoundingBox, Crs, Envelope, ExtraAxis};

// ============================================================================
// BoundingBox
// ============================================================================

#[test]
fn test_bbox_from_points() {
    let bbox = BoundingBox::from_points([(3.0, -1.0), (-2.0, 4.0), (0.0, 0.0)]).unwrap();
    assert_eq!(bbox, BoundingBox::new(-2.0, -1.0, 3.0, 4.0));
    assert!(BoundingBox::from_points(std::iter::empty()).is_none());
}

#[test]
fn test_bbox_union_covers_both() {
    let a = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
    let b = BoundingBox::new(5.0, -3.0, 6.0, 0.5);
    let u = a.union(&b);
    assert_eq!(u, BoundingBox::new(0.0, -3.0, 6.0, 1.0));
}

#[test]
fn test_bbox_contains_edges() {
    let bbox = BoundingBox::new(-180.0, -90.0, 180.0, 90.0);
    assert!(bbox.contains_point(180.0, 90.0));
    assert!(!bbox.contains_point(180.1, 0.0));
}

// ============================================================================
// Envelope
// ============================================================================

#[test]
fn test_envelope_with_extra_axis_is_unbounded_until_set() {
    let crs = Crs::crs_84().with_extra_axis(ExtraAxis::elevation());
    let env = Envelope::from_bbox(crs, &BoundingBox::new(0.0, 0.0, 10.0, 10.0));
    assert_eq!(env.dimension(), 3);
    assert!(!env.is_bounded(2));

    let env = env.with_range(2, 100.0, 50.0).unwrap();
    assert!(env.is_bounded(2));
    assert_eq!(env.lower[2], 50.0);
    assert_eq!(env.upper[2], 100.0);
    assert_eq!(env.median(2), 75.0);
}

#[test]
fn test_envelope_with_range_rejects_bad_dimension() {
    let env = Envelope::from_bbox(Crs::crs_84(), &BoundingBox::new(0.0, 0.0, 1.0, 1.0));
    assert!(env.with_range(2, 0.0, 1.0).is_err());
}

#[test]
fn test_degenerate_envelope_is_empty() {
    let env = Envelope::new(Crs::web_mercator(), vec![0.0, 5.0], vec![10.0, 5.0]).unwrap();
    assert!(env.is_empty());
}
