//! Spatial aggregation tests: weighting, missing-slice policy, region
//! composition and error propagation.

use approx::assert_relative_eq;
use dhseries::aggregate::{
    aggregate_regions, area_weighted_mean, area_weighted_mean_detailed, area_weighted_mean_err,
    combine_series, get_subset, region_mean, AllMissingPolicy,
};
use dhseries::errors::DhSeriesError;
use dhseries::grid::{cell_areas, AreaGrid, Grid, EARTH_RADIUS_KM};
use dhseries::region::{Region, RegionCatalog};
use dhseries::stack::DataStack;
use ndarray::{Array2, Array3};

fn test_grid() -> Grid {
    let lon = (0..10).map(|j| 0.5 + j as f64).collect();
    let lat = (0..8).map(|i| -75.5 + i as f64).collect();
    Grid::new(lon, lat).expect("valid grid")
}

/// Deterministic values with a scattering of missing samples.
fn test_stack(grid: &Grid) -> DataStack {
    let nz = 6;
    let (ny, nx) = grid.shape();
    let values = Array3::from_shape_fn((nz, ny, nx), |(k, i, j)| {
        if (k + 2 * i + 3 * j) % 7 == 0 {
            f64::NAN
        } else {
            ((k * 13 + i * 7 + j * 3) % 11) as f64 - 4.0 + 0.1 * k as f64
        }
    });
    let time = (0..nz).map(|k| 2000.0 + 0.25 * k as f64).collect();
    DataStack::new(time, grid.clone(), values).expect("valid stack")
}

#[test]
fn test_mean_is_invariant_to_area_scale() {
    let grid = test_grid();
    let stack = test_stack(&grid);
    let area = cell_areas(&grid, EARTH_RADIUS_KM);
    let scaled = AreaGrid::from_array(area.values() * 7.5).expect("valid areas");

    let a = area_weighted_mean(&stack, &area, AllMissingPolicy::PropagateMissing).expect("mean");
    let b = area_weighted_mean(&stack, &scaled, AllMissingPolicy::PropagateMissing).expect("mean");
    for (x, y) in a.values().iter().zip(b.values()) {
        assert_relative_eq!(x.expect("valid"), y.expect("valid"), max_relative = 1e-12);
    }
}

#[test]
fn test_mean_of_uniform_field_with_unequal_areas() {
    let grid = test_grid();
    let area = cell_areas(&grid, EARTH_RADIUS_KM);
    let (ny, nx) = grid.shape();
    let mut values = Array3::from_elem((2, ny, nx), 3.0);
    values[[1, 0, 0]] = f64::NAN;
    let stack = DataStack::new(vec![2000.0, 2001.0], grid, values).expect("valid stack");
    let mean = area_weighted_mean(&stack, &area, AllMissingPolicy::default()).expect("mean");
    assert_relative_eq!(mean.values()[0].expect("valid"), 3.0, max_relative = 1e-12);
    assert_relative_eq!(mean.values()[1].expect("valid"), 3.0, max_relative = 1e-12);
}

#[test]
fn test_all_missing_slice_policy_is_deterministic() {
    let grid = test_grid();
    let (ny, nx) = grid.shape();
    let mut values = Array3::from_elem((3, ny, nx), 1.0);
    values.index_axis_mut(ndarray::Axis(0), 1).fill(f64::NAN);
    let stack = DataStack::new(vec![2000.0, 2001.0, 2002.0], grid.clone(), values).expect("valid stack");
    let area = cell_areas(&grid, EARTH_RADIUS_KM);

    for _ in 0..3 {
        let propagated = area_weighted_mean(&stack, &area, AllMissingPolicy::PropagateMissing).expect("mean");
        assert_eq!(propagated.values(), &[Some(1.0), None, Some(1.0)]);

        let zeroed = area_weighted_mean(&stack, &area, AllMissingPolicy::ZeroOnAllMissing).expect("mean");
        assert_eq!(zeroed.values(), &[Some(1.0), Some(0.0), Some(1.0)]);
    }

    let detailed = area_weighted_mean_detailed(&stack, &area, AllMissingPolicy::PropagateMissing).expect("mean");
    assert_eq!(detailed.valid_area[1], 0.0);
    assert_relative_eq!(detailed.valid_area[0], area.total(), max_relative = 1e-12);
}

#[test]
fn test_area_shape_mismatch_is_fatal() {
    let grid = test_grid();
    let stack = test_stack(&grid);
    let area = AreaGrid::from_array(Array2::from_elem((3, 3), 1.0)).expect("valid areas");
    assert!(matches!(
        area_weighted_mean(&stack, &area, AllMissingPolicy::default()),
        Err(DhSeriesError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_disjoint_regions_recombine_to_whole_grid_mean() {
    let grid = test_grid();
    let stack = test_stack(&grid);
    let area = cell_areas(&grid, EARTH_RADIUS_KM);
    let policy = AllMissingPolicy::PropagateMissing;

    let west = Region::bounding_box("west", 0.0, 5.0, -90.0, -60.0).expect("valid region");
    let east = Region::bounding_box("east", 5.0, 10.0, -90.0, -60.0).expect("valid region");
    let mut catalog = RegionCatalog::new();
    catalog.insert(west.clone()).expect("unique");
    catalog.insert(east.clone()).expect("unique");
    assert!(catalog.is_partition(&grid).expect("masks resolve"));

    let parts = vec![
        region_mean(&stack, &area, &west, policy).expect("west mean"),
        region_mean(&stack, &area, &east, policy).expect("east mean"),
    ];
    assert_eq!(parts[0].series.name, "west");

    let combined = combine_series("all", &parts, policy).expect("same time axis");
    let whole = area_weighted_mean(&stack, &area, policy).expect("whole mean");
    for (c, w) in combined.values().iter().zip(whole.values()) {
        assert_relative_eq!(c.expect("valid"), w.expect("valid"), max_relative = 1e-12, epsilon = 1e-12);
    }
}

#[test]
fn test_subset_mean_matches_masked_mean() {
    let grid = test_grid();
    let stack = test_stack(&grid);
    let area = cell_areas(&grid, EARTH_RADIUS_KM);
    let region = Region::bounding_box("box", 2.0, 6.0, -74.0, -70.0).expect("valid region");

    let (sub_stack, sub_area) = get_subset(&stack, &area, &region).expect("subset");
    assert_eq!(sub_stack.grid().shape(), sub_area.shape());
    assert_eq!(sub_stack.grid().lon(), &[2.5, 3.5, 4.5, 5.5]);

    let from_subset = area_weighted_mean(&sub_stack, &sub_area, AllMissingPolicy::default()).expect("mean");
    let from_mask = region_mean(&stack, &area, &region, AllMissingPolicy::default()).expect("mean");
    for (a, b) in from_subset.values().iter().zip(from_mask.series.values()) {
        assert_relative_eq!(a.expect("valid"), b.expect("valid"), max_relative = 1e-12, epsilon = 1e-12);
    }
}

#[test]
fn test_empty_region_is_reported() {
    let grid = test_grid();
    let stack = test_stack(&grid);
    let area = cell_areas(&grid, EARTH_RADIUS_KM);
    let region = Region::bounding_box("nowhere", 100.0, 120.0, -90.0, -60.0).expect("valid region");
    assert!(matches!(
        region_mean(&stack, &area, &region, AllMissingPolicy::default()),
        Err(DhSeriesError::EmptyRegion { .. })
    ));
}

#[test]
fn test_error_of_mean_for_independent_cells() {
    let grid = Grid::new(vec![0.5, 1.5], vec![-70.5, -69.5]).expect("valid grid");
    let area = AreaGrid::from_array(Array2::from_elem((2, 2), 1.0)).expect("valid areas");
    let mut errors = Array3::from_elem((2, 2, 2), 2.0);
    // Only one valid cell in the second step.
    errors[[1, 0, 1]] = f64::NAN;
    errors[[1, 1, 0]] = f64::NAN;
    errors[[1, 1, 1]] = f64::NAN;
    let stack = DataStack::new(vec![2000.0, 2001.0], grid, errors).expect("valid stack");

    let err = area_weighted_mean_err(&stack, &area, AllMissingPolicy::default()).expect("error series");
    // Four equal cells: sqrt(4 · 0.25² · 4) = 1.
    assert_relative_eq!(err.values()[0].expect("valid"), 1.0, max_relative = 1e-12);
    assert_relative_eq!(err.values()[1].expect("valid"), 2.0, max_relative = 1e-12);
}

#[test]
fn test_aggregate_regions_keeps_catalog_order() {
    let grid = test_grid();
    let stack = test_stack(&grid);
    let errors = DataStack::new(
        stack.time().to_vec(),
        grid.clone(),
        Array3::from_elem(stack.values().dim(), 0.5),
    )
    .expect("valid stack");
    let area = cell_areas(&grid, EARTH_RADIUS_KM);

    let mut catalog = RegionCatalog::new();
    for (name, lo, hi) in [("c", 6.0, 10.0), ("a", 0.0, 3.0), ("b", 3.0, 6.0)] {
        catalog
            .insert(Region::bounding_box(name, lo, hi, -90.0, -60.0).expect("valid region"))
            .expect("unique");
    }
    catalog.insert(Region::whole("all")).expect("unique");

    let results = aggregate_regions(&stack, Some(&errors), &area, &catalog, AllMissingPolicy::default())
        .expect("aggregation");
    let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["c", "a", "b", "all"]);
    for result in &results {
        let error = result.error.as_ref().expect("error series");
        assert_eq!(error.name, result.name);
        assert_eq!(error.len(), stack.nz());
    }
}
