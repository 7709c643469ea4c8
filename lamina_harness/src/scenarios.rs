// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end checks of the redraw and expose engines on the in-memory
//! backend.

use lamina_core::rect::ClipRect;
use lamina_core::surface::resolve::{self, restrict_to_parent_bounds};
use lamina_core::surface::{BitmapId, Geometry, SurfaceFlags, SurfaceId, span_end};
use lamina_render::{ExposeFlags, RedrawFlags};

use crate::{CoverageGrade, CoverageTracker, TableFixture};

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn full_screen(fx: &mut TableFixture) -> SurfaceId {
    fx.surface(1, Geometry::new(0, 0, 800, 600)).register().unwrap()
}

/// Presents since the last call, graded against the current table.
fn grade_presents(fx: &mut TableFixture) -> crate::CoverageReport {
    let recs = fx.snapshot().unwrap();
    let mut tracker = CoverageTracker::new(&recs, fx.display_rect());
    let presents = fx.compositor_mut().display_mut().take_presents();
    tracker.observe_all(&presents);
    tracker.report()
}

// ---------------------------------------------------------------------------
// Concrete scenarios
// ---------------------------------------------------------------------------

#[test]
fn single_surface_draws_and_presents_once() {
    init_logging();
    let mut fx = TableFixture::new(800, 600);
    let a = full_screen(&mut fx);

    fx.compositor_mut()
        .redraw_surface(a, Some(ClipRect::new(0, 0, 800, 600)), RedrawFlags::empty())
        .unwrap();
    assert_eq!(
        fx.draws().entries(),
        [(a, ClipRect::new(0, 0, 800, 600))],
        "one draw of the full area"
    );

    fx.compositor_mut()
        .expose_surface(a, None, ExposeFlags::empty())
        .unwrap();
    let report = grade_presents(&mut fx);
    assert_eq!(report.presents, 1, "one present");
    assert_eq!(report.grade, CoverageGrade::A, "{report:?}");
}

#[test]
fn shared_buffer_child_is_cut_out_of_the_parent_draw() {
    init_logging();
    let mut fx = TableFixture::new(800, 600);
    let a = full_screen(&mut fx);
    let b = fx
        .surface(2, Geometry::new(100, 100, 200, 200))
        .parent(a)
        .sharing_parent_bitmap()
        .register()
        .unwrap();

    fx.compositor_mut()
        .redraw_surface(a, None, RedrawFlags::empty())
        .unwrap();

    let child = ClipRect::new(100, 100, 300, 300);
    let bands = fx.draws().for_surface(a);
    assert!((1..=4).contains(&bands.len()), "at most four bands: {bands:?}");
    assert!(
        bands.iter().all(|r| !r.intersects(&child)),
        "no band overlaps the child: {bands:?}"
    );
    assert_eq!(fx.draws().area_for(a), 800 * 600 - 200 * 200, "rest of A exactly");
    assert_eq!(fx.draws().for_surface(b), [child], "child drawn on its own");

    fx.compositor_mut()
        .expose_surface(a, None, ExposeFlags::CHILDREN)
        .unwrap();
    let report = grade_presents(&mut fx);
    assert_eq!(report.grade, CoverageGrade::A, "{report:?}");
}

#[test]
fn transparent_child_is_drawn_through_but_its_solid_child_is_not() {
    init_logging();
    let mut fx = TableFixture::new(800, 600);
    let a = full_screen(&mut fx);
    let b = fx
        .surface(2, Geometry::new(100, 100, 200, 200))
        .parent(a)
        .sharing_parent_bitmap()
        .flags(SurfaceFlags::TRANSPARENT)
        .register()
        .unwrap();
    let g = fx
        .surface(3, Geometry::new(50, 50, 150, 150))
        .parent(b)
        .sharing_parent_bitmap()
        .register()
        .unwrap();

    fx.compositor_mut()
        .redraw_surface(a, None, RedrawFlags::empty())
        .unwrap();

    let grandchild = ClipRect::new(150, 150, 300, 300);
    assert_eq!(
        fx.draws().area_for(a),
        800 * 600 - 150 * 150,
        "only the grandchild is cut out"
    );
    assert!(
        fx.draws()
            .for_surface(a)
            .iter()
            .any(|r| r.contains_point(110, 110)),
        "A is drawn under its transparent child"
    );
    assert!(fx.draws().for_surface(b).is_empty(), "transparent child draws nothing");
    assert_eq!(fx.draws().for_surface(g), [grandchild], "grandchild reached");
}

#[test]
fn side_by_side_children_present_disjoint_halves() {
    init_logging();
    let mut fx = TableFixture::new(800, 600);
    let root = full_screen(&mut fx);
    fx.surface(3, Geometry::new(0, 0, 400, 600))
        .parent(root)
        .register()
        .unwrap();
    fx.surface(4, Geometry::new(400, 0, 400, 600))
        .parent(root)
        .register()
        .unwrap();

    fx.compositor_mut()
        .redraw_surface(root, None, RedrawFlags::empty())
        .unwrap();
    fx.compositor_mut().display_mut().take_presents();
    fx.compositor_mut()
        .expose_surface(root, Some(ClipRect::new(0, 0, 800, 600)), ExposeFlags::CHILDREN)
        .unwrap();

    let presents = fx.compositor().display().presents().to_vec();
    assert_eq!(presents.len(), 2, "{presents:?}");
    assert!(
        !presents[0].dest_rect().intersects(&presents[1].dest_rect()),
        "{presents:?}"
    );
    let report = grade_presents(&mut fx);
    assert_eq!(report.grade, CoverageGrade::A, "{report:?}");
    assert_eq!(
        report.bounds,
        ClipRect::new(0, 0, 800, 600).to_kurbo(),
        "union is the display"
    );
}

#[test]
fn growth_keeps_every_record() {
    init_logging();
    let mut fx = TableFixture::new(800, 600);
    for id in 1..=200 {
        fx.surface(id, Geometry::new(0, 0, 4, 4)).register().unwrap();
    }
    assert_eq!(fx.registry().capacity().unwrap(), 200, "initial capacity");
    let before = fx.snapshot().unwrap();
    let memory = fx.registry().memory_id();

    fx.surface(201, Geometry::new(0, 0, 4, 4)).register().unwrap();

    assert_eq!(fx.registry().capacity().unwrap(), 400, "capacity doubled");
    assert_ne!(fx.registry().memory_id(), memory, "new block published");
    let after = fx.snapshot().unwrap();
    assert_eq!(after.len(), 201, "new record added");
    assert_eq!(&after[..200], before.as_slice(), "old records unchanged in place");
}

#[test]
fn volatile_surface_inside_exposed_region_is_refreshed() {
    init_logging();
    let mut fx = TableFixture::new(800, 600);
    let a = fx.surface(1, Geometry::new(0, 0, 400, 400)).register().unwrap();
    let region = fx
        .surface(2, Geometry::new(0, 0, 400, 400))
        .parent(a)
        .sharing_parent_bitmap()
        .flags(SurfaceFlags::REGION)
        .register()
        .unwrap();
    fx.surface(3, Geometry::new(0, 0, 200, 200))
        .parent(region)
        .register()
        .unwrap();
    let v = fx
        .surface(4, Geometry::new(150, 150, 100, 100))
        .parent(region)
        .flags(SurfaceFlags::VOLATILE)
        .register()
        .unwrap();

    fx.compositor_mut()
        .redraw_surface(a, None, RedrawFlags::empty())
        .unwrap();
    fx.draws().clear();
    fx.compositor_mut().display_mut().take_presents();

    fx.compositor_mut()
        .expose_surface(region, None, ExposeFlags::REDRAW_VOLATILE)
        .unwrap();

    assert_eq!(
        fx.draws().entries(),
        [(v, ClipRect::new(150, 150, 250, 250))],
        "only the volatile surface is redrawn"
    );
    assert!(
        fx.compositor()
            .display()
            .presents()
            .iter()
            .any(|p| p.bitmap == BitmapId(4)),
        "and exposed"
    );
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn redraw_and_expose_are_idempotent() {
    init_logging();
    let mut fx = TableFixture::new(800, 600);
    let a = full_screen(&mut fx);
    fx.surface(2, Geometry::new(100, 100, 300, 200))
        .parent(a)
        .sharing_parent_bitmap()
        .register()
        .unwrap();
    fx.surface(3, Geometry::new(350, 150, 200, 200))
        .parent(a)
        .register()
        .unwrap();

    let pass = |fx: &mut TableFixture| {
        let comp = fx.compositor_mut();
        comp.redraw_surface(a, None, RedrawFlags::empty()).unwrap();
        comp.expose_surface(a, None, ExposeFlags::CHILDREN).unwrap();
        (
            fx.bitmap_hash(BitmapId(1)).unwrap(),
            fx.bitmap_hash(BitmapId(3)).unwrap(),
            fx.display_hash(),
        )
    };
    let first = pass(&mut fx);
    let second = pass(&mut fx);
    assert_eq!(first, second, "no accumulation between passes");
}

#[test]
fn overlapping_tree_is_covered_exactly_once() {
    init_logging();
    let mut fx = TableFixture::new(800, 600);
    let a = full_screen(&mut fx);
    let b = fx
        .surface(2, Geometry::new(50, 50, 400, 300))
        .parent(a)
        .register()
        .unwrap();
    fx.surface(3, Geometry::new(20, 20, 100, 100))
        .parent(b)
        .sharing_parent_bitmap()
        .register()
        .unwrap();
    fx.surface(4, Geometry::new(300, 200, 300, 300))
        .parent(a)
        .register()
        .unwrap();
    fx.surface(5, Geometry::new(10, 10, 50, 50))
        .parent(a)
        .sharing_parent_bitmap()
        .flags(SurfaceFlags::TRANSPARENT)
        .register()
        .unwrap();

    fx.compositor_mut()
        .redraw_surface(a, None, RedrawFlags::empty())
        .unwrap();
    fx.compositor_mut().display_mut().take_presents();
    fx.compositor_mut()
        .expose_surface(a, None, ExposeFlags::CHILDREN)
        .unwrap();

    let report = grade_presents(&mut fx);
    assert_eq!(report.missed, 0, "{report:?}");
    assert_eq!(report.overdrawn, 0, "{report:?}");
    assert_eq!(report.grade, CoverageGrade::A, "{report:?}");
}

#[test]
fn untrack_removes_the_whole_span() {
    init_logging();
    let mut fx = TableFixture::new(800, 600);
    let a = full_screen(&mut fx);
    let b = fx
        .surface(2, Geometry::new(0, 0, 100, 100))
        .parent(a)
        .register()
        .unwrap();
    let c = fx
        .surface(3, Geometry::new(0, 0, 10, 10))
        .parent(b)
        .register()
        .unwrap();
    fx.surface(4, Geometry::new(0, 0, 10, 10))
        .parent(b)
        .register()
        .unwrap();
    fx.surface(5, Geometry::new(200, 0, 10, 10))
        .parent(a)
        .register()
        .unwrap();

    let before = fx.registry().record_count().unwrap();
    let removal = fx.compositor_mut().unregister_surface(b).unwrap();
    assert_eq!(removal.count, 3, "surface plus two children");
    assert_eq!(fx.registry().record_count().unwrap(), before - 3, "1 + N removed");

    let recs = fx.snapshot().unwrap();
    assert!(
        recs.iter().all(|r| r.parent != Some(b) && r.parent != Some(c)),
        "no dangling parents"
    );
    assert!(fx.compositor().object(c).is_none(), "objects dropped");
}

#[test]
fn spans_hold_exactly_the_descendants() {
    let mut fx = TableFixture::new(800, 600);
    let a = full_screen(&mut fx);
    let b = fx.surface(2, Geometry::new(0, 0, 100, 100)).parent(a).register().unwrap();
    fx.surface(3, Geometry::new(0, 0, 300, 300)).register().unwrap();
    fx.surface(4, Geometry::new(0, 0, 10, 10)).parent(b).register().unwrap();
    fx.surface(5, Geometry::new(0, 0, 10, 10)).parent(a).register().unwrap();
    fx.surface(6, Geometry::new(0, 0, 10, 10)).parent(SurfaceId(3)).register().unwrap();
    fx.surface(7, Geometry::new(0, 0, 5, 5)).parent(SurfaceId(4)).register().unwrap();

    let recs = fx.snapshot().unwrap();
    for i in 0..recs.len() {
        let end = span_end(&recs, i);
        for (j, r) in recs.iter().enumerate() {
            let inside = j > i && j < end;
            assert_eq!(
                resolve::is_child(&recs, r.id, recs[i].id),
                inside,
                "{:?} under {:?}",
                r.id,
                recs[i].id
            );
        }
    }
}

#[test]
fn restriction_never_grows_a_rect() {
    let mut fx = TableFixture::new(800, 600);
    let a = fx.surface(1, Geometry::new(10, 10, 300, 300)).register().unwrap();
    let b = fx.surface(2, Geometry::new(-20, 50, 200, 100)).parent(a).register().unwrap();
    fx.surface(3, Geometry::new(150, -10, 100, 100)).parent(b).register().unwrap();

    let recs = fx.snapshot().unwrap();
    let probes = [
        ClipRect::new(0, 0, 800, 600),
        ClipRect::new(100, 60, 120, 70),
        ClipRect::new(-50, -50, 15, 15),
        ClipRect::new(500, 500, 600, 600),
    ];
    for i in 0..recs.len() {
        for probe in probes {
            for match_bitmap in [false, true] {
                if let Some(r) = restrict_to_parent_bounds(&recs, i, probe, match_bitmap).rect() {
                    assert_eq!(r.intersect(&probe), r, "{r:?} escapes {probe:?}");
                }
            }
        }
    }
}
