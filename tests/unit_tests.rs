//! Unit tests for stacks, masking, regions, series filters, configuration
//! and the command line.

use approx::assert_relative_eq;
use clap::Parser;
use dhseries::aggregate::AllMissingPolicy;
use dhseries::cli::{parse_region_arg, Args};
use dhseries::config::AnalysisConfig;
use dhseries::errors::{DhSeriesError, Result};
use dhseries::grid::Grid;
use dhseries::mask::{clip_outliers, drop_sparse_series, MaskFilter};
use dhseries::parallel::ParallelConfig;
use dhseries::region::{Region, RegionCatalog, Selection};
use dhseries::series::{Reference, SeriesFilters, TimeSeries};
use dhseries::stack::{DataStack, GriddedDataset};
use dhseries::trend::{fit_trend, ErrorModel, FoldStrategy, TrendConfig, TrendMethod, MAX_POLY_DEGREE};
use ndarray::{array, Array2, Array3};

fn small_grid() -> Grid {
    Grid::new(vec![0.5, 1.5, 2.5], vec![-70.5, -69.5]).expect("valid grid")
}

fn sparse_stack() -> DataStack {
    let grid = small_grid();
    let time: Vec<f64> = (0..5).map(|k| 2000.0 + k as f64).collect();
    // Cell (0, 0): 5 valid, (0, 1): 2 valid, (1, 2): none; the rest have 4.
    let values = Array3::from_shape_fn((5, 2, 3), |(k, i, j)| match (i, j) {
        (0, 0) => 1.0 + k as f64,
        (0, 1) if k < 2 => 10.0,
        (0, 1) => f64::NAN,
        (1, 2) => f64::NAN,
        _ if k == 4 => f64::NAN,
        _ => -1.0,
    });
    DataStack::new(time, grid, values).expect("valid stack")
}

#[test]
fn test_error_types() {
    let var_err = DhSeriesError::VariableNotFound {
        var: "dh".to_string(),
    };
    assert!(format!("{}", var_err).contains("Variable 'dh' not found"));

    let fit_err = DhSeriesError::InsufficientSamples { needed: 2, got: 0 };
    assert!(format!("{}", fit_err).starts_with("Undetermined fit"));

    let generic: DhSeriesError = "boom".into();
    assert_eq!(format!("{}", generic), "boom");
}

#[test]
fn test_stack_validation() {
    let grid = small_grid();
    assert!(matches!(
        DataStack::new(vec![2000.0, 2001.0], grid.clone(), Array3::zeros((2, 3, 2))),
        Err(DhSeriesError::ShapeMismatch { .. })
    ));
    assert!(matches!(
        DataStack::new(vec![2001.0, 2000.0], grid.clone(), Array3::zeros((2, 2, 3))),
        Err(DhSeriesError::InvalidGrid(_))
    ));
    let stack = DataStack::new(vec![2000.0, 2001.0], grid, Array3::zeros((2, 2, 3))).expect("valid stack");
    assert_eq!(stack.shape(), (2, 2, 3));
    assert_eq!(stack.missing_count(), 0);
}

#[test]
fn test_time_filter_is_inclusive() {
    let stack = sparse_stack();
    let filtered = stack.time_filter(Some(2001.0), Some(2003.0)).expect("filter");
    assert_eq!(filtered.time(), &[2001.0, 2002.0, 2003.0]);
    assert_eq!(filtered.cell_series(0, 0).to_vec(), vec![2.0, 3.0, 4.0]);

    let open_end = stack.time_filter(Some(2003.0), None).expect("filter");
    assert_eq!(open_end.nz(), 2);
    assert!(matches!(
        stack.time_filter(Some(2010.0), None),
        Err(DhSeriesError::InsufficientSamples { .. })
    ));
}

#[test]
fn test_harmonize_zeros_is_explicit() {
    let grid = small_grid();
    let stack = DataStack::new(vec![2000.0], grid, Array3::from_elem((1, 2, 3), 0.0)).expect("valid stack");
    assert_eq!(stack.missing_count(), 0);
    assert_eq!(stack.harmonize_zeros().missing_count(), 6);
}

#[test]
fn test_drop_sparse_series_is_idempotent() {
    let stack = sparse_stack();
    let once = drop_sparse_series(&stack, 3).expect("drop");
    let twice = drop_sparse_series(&once, 3).expect("drop");
    assert_eq!(once.values().shape(), twice.values().shape());
    for (a, b) in once.values().iter().zip(twice.values().iter()) {
        assert!((a.is_nan() && b.is_nan()) || a == b);
    }
    let counts = once.valid_counts();
    assert_eq!(counts[[0, 0]], 5);
    assert_eq!(counts[[0, 1]], 0);
    assert_eq!(counts[[1, 0]], 4);
    // Unchanged input.
    assert_eq!(stack.valid_counts()[[0, 1]], 2);
}

#[test]
fn test_mask_filter_report() {
    let stack = sparse_stack();
    let (filtered, report) = MaskFilter::new()
        .with_abs_bound(5.0)
        .with_min_valid_samples(5)
        .apply(&stack)
        .expect("filter");
    // |5.0| is not above the bound; both samples of cell (0, 1) are.
    assert_eq!(report.values_clipped, 2);
    // Cells emptied by clipping or empty from the start are not counted.
    assert_eq!(report.cells_dropped, 3);
    assert_eq!(filtered.valid_counts()[[0, 0]], 5);
    assert_eq!(filtered.valid_counts()[[0, 1]], 0);

    let clipped = clip_outliers(&stack, 3.0).expect("clip");
    assert_eq!(clipped.valid_counts()[[0, 0]], 3);
}

#[test]
fn test_gridded_dataset() {
    let grid = small_grid();
    let mut dataset = GriddedDataset::new(vec![2000.0, 2001.0], grid).expect("dataset");
    dataset.insert("dh", Array3::zeros((2, 2, 3))).expect("insert");
    assert!(dataset.insert("bad", Array3::zeros((3, 2, 3))).is_err());
    assert!(dataset.contains("dh"));
    assert_eq!(dataset.variable_names().collect::<Vec<_>>(), vec!["dh"]);
    assert!(matches!(
        dataset.stack("err"),
        Err(DhSeriesError::VariableNotFound { .. })
    ));
    assert_eq!(dataset.stack("dh").expect("stack").nz(), 2);
}

#[test]
fn test_wrapping_bounding_box() {
    let lon: Vec<f64> = (0..12).map(|j| 30.0 * j as f64).collect();
    let grid = Grid::new(lon, vec![-75.0, -70.0, -65.0]).expect("valid grid");
    let region = Region::bounding_box("seam", 300.0, 60.0, -72.0, -60.0).expect("valid region");

    let mask = region.cell_mask(&grid).expect("mask");
    let selected: Vec<usize> = (0..12).filter(|&j| mask[[1, j]]).collect();
    assert_eq!(selected, vec![0, 1, 2, 10, 11]);
    assert!(!mask.row(0).iter().any(|&m| m));

    let index = region.subset_index(&grid).expect("subset");
    assert_eq!(index.rows, vec![1, 2]);
    assert_eq!(index.cols, vec![10, 11, 0, 1, 2]);
    assert_eq!(index.lon, vec![300.0, 330.0, 360.0, 390.0, 420.0]);
}

#[test]
fn test_box_in_other_longitude_convention() {
    let lon: Vec<f64> = (0..8).map(|j| -157.5 + 45.0 * j as f64).collect();
    let grid = Grid::new(lon, vec![-80.0, -70.0]).expect("valid grid");
    // 180–270 in 0–360 is −180–−90 here.
    let region = Region::bounding_box("ross-ish", 180.0, 270.0, -90.0, -60.0).expect("valid region");
    let mask = region.cell_mask(&grid).expect("mask");
    let selected: Vec<usize> = (0..8).filter(|&j| mask[[0, j]]).collect();
    assert_eq!(selected, vec![0, 1]);
}

#[test]
fn test_region_validation_and_masks() {
    assert!(Region::bounding_box("bad", 0.0, 10.0, -60.0, -70.0).is_err());
    assert!(Region::bounding_box("bad", f64::NAN, 10.0, -70.0, -60.0).is_err());

    let grid = small_grid();
    let region = Region::mask("cells", array![[true, false, false], [false, false, true]]);
    let mask = region.cell_mask(&grid).expect("mask");
    assert_eq!(mask.iter().filter(|&&m| m).count(), 2);
    let wrong = Region::mask("wrong", Array2::from_elem((3, 3), true));
    assert!(wrong.cell_mask(&grid).is_err());
    assert!(matches!(Region::whole("all").selection, Selection::Whole));
}

#[test]
fn test_catalog_from_toml() -> Result<()> {
    let text = r#"
        [[regions]]
        name = "Amery"
        bbox = [66.0, 75.0, -74.5, -67.5]

        [[regions]]
        name = "Everything"
    "#;
    let catalog = RegionCatalog::from_toml_str(text)?;
    assert_eq!(catalog.names(), vec!["Amery", "Everything"]);
    assert!(matches!(
        catalog.get("Everything").map(|r| &r.selection),
        Some(Selection::Whole)
    ));

    let duplicate = r#"
        [[regions]]
        name = "A"
        [[regions]]
        name = "A"
    "#;
    assert!(matches!(
        RegionCatalog::from_toml_str(duplicate),
        Err(DhSeriesError::InvalidRegion { .. })
    ));
    Ok(())
}

#[test]
fn test_antarctic_catalog() {
    let catalog = RegionCatalog::antarctic();
    assert_eq!(catalog.len(), 9);
    for name in ["Filchner-Ronne", "Ross", "Amery", "Larsen", "Queen Maud", "All Antarctica"] {
        assert!(catalog.get(name).is_some(), "missing {name}");
    }
    assert_eq!(catalog.names().last(), Some(&"All Antarctica"));
}

#[test]
fn test_partition_check() {
    let grid = small_grid();
    let mut catalog = RegionCatalog::new();
    catalog
        .insert(Region::bounding_box("left", 0.0, 1.0, -90.0, 0.0).expect("valid region"))
        .expect("unique");
    catalog
        .insert(Region::bounding_box("right", 1.2, 3.0, -90.0, 0.0).expect("valid region"))
        .expect("unique");
    assert!(catalog.is_partition(&grid).expect("masks"));

    catalog.insert(Region::whole("all")).expect("unique");
    assert!(!catalog.is_partition(&grid).expect("masks"));
}

fn series(values: &[Option<f64>]) -> TimeSeries {
    let time = (0..values.len()).map(|k| 2000.0 + k as f64).collect();
    TimeSeries::new("s", time, values.to_vec()).expect("series")
}

#[test]
fn test_series_reference() {
    let s = series(&[None, Some(2.0), Some(4.0), Some(6.0)]);
    assert_eq!(s.referenced(Reference::Mean).values(), &[None, Some(-2.0), Some(0.0), Some(2.0)]);
    assert_eq!(s.referenced(Reference::First).values(), &[None, Some(0.0), Some(2.0), Some(4.0)]);
    assert_eq!(s.referenced(Reference::None), s);
    assert_eq!(s.fill_missing(0.0).values()[0], Some(0.0));
    assert_eq!(s.valid_count(), 3);
}

#[test]
fn test_series_gradient() {
    let s = series(&[Some(0.0), Some(1.0), Some(4.0), None, Some(16.0)]);
    let g = s.gradient(1.0);
    assert_eq!(g.values(), &[Some(1.0), Some(2.0), None, Some(6.0), None]);
}

#[test]
fn test_series_detrend_and_hp_filter() -> Result<()> {
    let line = series(&[Some(1.0), Some(3.0), Some(5.0), Some(7.0), Some(9.0)]);
    for v in line.detrend()?.values() {
        assert_relative_eq!(v.expect("valid"), 0.0, epsilon = 1e-9);
    }

    // A straight line is already its own HP trend.
    let trend = line.hp_filter(1600.0)?;
    for (a, b) in trend.values().iter().zip(line.values()) {
        assert_relative_eq!(a.expect("valid"), b.expect("valid"), epsilon = 1e-6);
    }

    let bumpy = series(&[Some(0.0), Some(5.0), None, Some(0.0), Some(5.0), Some(0.0)]);
    let smooth = bumpy.hp_filter(100.0)?;
    assert_eq!(smooth.values()[2], None);
    let (_, v) = smooth.valid_pairs();
    let spread = v.iter().copied().fold(f64::NEG_INFINITY, f64::max) - v.iter().copied().fold(f64::INFINITY, f64::min);
    assert!(spread < 5.0);

    assert!(series(&[Some(1.0), Some(2.0)]).hp_filter(10.0).is_err());
    Ok(())
}

#[test]
fn test_series_limits() {
    assert_eq!(series(&[Some(1.2), Some(3.4)]).limits(), Some((0.0, 4.0)));
    assert_eq!(series(&[Some(-2.5), Some(-0.5)]).limits(), Some((-3.0, 0.0)));
    assert_eq!(series(&[None]).limits(), None);
}

#[test]
fn test_config_defaults() {
    let config = AnalysisConfig::from_toml_str("").expect("empty config");
    assert_eq!(config, AnalysisConfig::default());
    assert_eq!(config.min_valid_samples, 10);
    assert_eq!(config.all_missing, AllMissingPolicy::PropagateMissing);
    assert!(!config.zero_is_missing);
    assert_eq!(config.trend.cv_folds, 10);
    assert_eq!(config.trend.max_degree, 3);
    assert_eq!(config.regrid_factor, 10);
    assert_relative_eq!(config.smoothing_width, 1.5);
    assert_eq!(config.units, "m");
    assert!(config.area_file.is_none());
    assert!(config.series_filters.is_identity());
    assert!(config.region_catalog().expect("no regions").is_none());
}

#[test]
fn test_config_from_toml() -> Result<()> {
    let text = r#"
        scale = 100.0
        min_valid_samples = 0
        abs_bound = 15.0
        zero_is_missing = true
        all_missing = "zero_on_all_missing"
        reference = "first"
        from_time = 1992.0

        [variables]
        data = "dh"
        error = "dh_err"

        [trend]
        method = "polyfit_cv"
        fold_strategy = "interleaved"
        error_model = "independent"

        [[regions]]
        name = "Ross"
        bbox = [154.0, 204.0, -86.0, -77.0]
    "#;
    let config = AnalysisConfig::from_toml_str(text)?;
    assert_eq!(config.variables.data_variables(), vec!["dh", "dh_err"]);
    assert_eq!(config.variables.time, "time");
    assert_eq!(config.all_missing, AllMissingPolicy::ZeroOnAllMissing);
    assert_eq!(config.reference, Reference::First);
    assert_eq!(config.trend.method, TrendMethod::PolyfitCv);
    assert_eq!(config.trend.fold_strategy, FoldStrategy::Interleaved);
    assert_eq!(config.trend.error_model, ErrorModel::Independent);
    assert_eq!(config.trend.cv_folds, 10);
    assert_eq!(config.from_time, Some(1992.0));

    let filter = config.mask_filter();
    assert_eq!(filter.abs_bound, Some(15.0));
    assert_eq!(filter.min_valid_samples, None);

    let catalog = config.region_catalog()?.expect("inline regions");
    assert_eq!(catalog.names(), vec!["Ross"]);

    assert!(matches!(
        AnalysisConfig::from_toml_str("min_valid_samples = \"ten\""),
        Err(DhSeriesError::Config(_))
    ));
    Ok(())
}

#[test]
fn test_parse_region_arg() {
    let def = parse_region_arg("Amery:66:75:-74.5:-67.5").expect("valid");
    assert_eq!(def.name, "Amery");
    assert_eq!(def.bbox, Some([66.0, 75.0, -74.5, -67.5]));
    assert!(parse_region_arg("Amery:66:75").is_err());
    assert!(parse_region_arg("Amery:west:75:-74.5:-67.5").is_err());
    assert!(parse_region_arg(":1:2:3:4").is_err());
}

#[test]
fn test_cli_arguments() {
    let args = Args::try_parse_from([
        "dhseries",
        "--file",
        "data.nc",
        "--region",
        "a:0:10:-80:-70",
        "--region",
        "b:10:20:-80:-70",
        "--method",
        "robust",
        "--from",
        "1995.5",
        "--area",
        "area.nc",
        "-vv",
    ])
    .expect("valid arguments");
    assert_eq!(args.region.len(), 2);
    assert_eq!(args.verbose, 2);

    let mut config = AnalysisConfig::default();
    args.apply_overrides(&mut config);
    assert_eq!(config.trend.method, TrendMethod::Robust);
    assert_eq!(config.from_time, Some(1995.5));
    assert_eq!(config.to_time, None);
    assert_eq!(config.area_file.as_deref(), Some(std::path::Path::new("area.nc")));

    assert!(Args::try_parse_from(["dhseries", "--list-regions"]).is_ok());
    assert!(Args::try_parse_from(["dhseries"]).is_err());
    assert!(Args::try_parse_from(["dhseries", "-f", "x.nc", "--method", "spline"]).is_err());
}

#[test]
fn test_parallel_config() {
    assert!(ParallelConfig::default().num_threads.is_none());
    assert_eq!(ParallelConfig::with_threads(4).num_threads, Some(4));
    assert!(ParallelConfig::all_cores().num_threads.unwrap_or(0) > 0);
    assert!(ParallelConfig::with_threads(0).setup_global_pool().is_err());
}

fn invalid_config(text: &str) -> bool {
    matches!(AnalysisConfig::from_toml_str(text), Err(DhSeriesError::InvalidConfig(_)))
}

#[test]
fn test_config_validation() {
    assert!(AnalysisConfig::default().validate().is_ok());

    assert!(invalid_config("[trend]\nmethod = \"polyfit_cv\"\ncv_folds = 1"));
    assert!(invalid_config("[trend]\nmethod = \"lasso_cv\"\ncv_folds = 0"));
    assert!(invalid_config(&format!(
        "[trend]\nmethod = \"polynomial\"\nmax_degree = {}",
        MAX_POLY_DEGREE + 1
    )));
    assert!(invalid_config("regrid_factor = 0"));
    assert!(invalid_config("smoothing_width = -1.0"));
    assert!(invalid_config("scale = 0.0"));
    assert!(invalid_config("from_time = 2005.0\nto_time = 2000.0"));
    assert!(invalid_config("[series_filters]\nhp_lambda = -1.0"));
    assert!(invalid_config("[series_filters]\ngradient_dt = 0.0"));

    // Folds only matter to the cross-validated methods.
    let config = AnalysisConfig::from_toml_str("[trend]\nmethod = \"linear\"\ncv_folds = 1").expect("valid");
    assert_eq!(config.trend.cv_folds, 1);

    // Overrides are checked again once applied.
    let args = Args::try_parse_from(["dhseries", "-f", "x.nc", "--from", "2010", "--to", "2000"]).expect("valid arguments");
    let mut config = AnalysisConfig::default();
    args.apply_overrides(&mut config);
    assert!(matches!(config.validate(), Err(DhSeriesError::InvalidConfig(_))));
}

#[test]
fn test_validated_trend_config_fits_clean_series() -> Result<()> {
    let time: Vec<f64> = (0..40).map(|k| 2000.0 + 0.25 * k as f64).collect();
    let values: Vec<f64> = time.iter().map(|t| 0.3 * (t - 2000.0)).collect();
    let line = TimeSeries::from_floats("line", time, &values)?;

    let config = TrendConfig {
        method: TrendMethod::PolyfitCv,
        cv_folds: 1,
        ..TrendConfig::default()
    };
    assert!(matches!(config.validate(), Err(DhSeriesError::InvalidConfig(_))));

    let config = TrendConfig {
        method: TrendMethod::PolyfitCv,
        cv_folds: 4,
        ..TrendConfig::default()
    };
    config.validate()?;
    let fit = fit_trend(&line, &config)?;
    assert_relative_eq!(fit.rate, 0.3, epsilon = 1e-4);
    Ok(())
}

#[test]
fn test_series_filters() -> Result<()> {
    let filters = SeriesFilters::default();
    assert!(filters.is_identity());
    let gappy = series(&[Some(0.0), None, Some(6.0), Some(9.0)]);
    assert_eq!(filters.apply(&gappy)?, gappy);

    let filled = SeriesFilters {
        fill_missing: Some(0.0),
        ..SeriesFilters::default()
    };
    assert!(!filled.is_identity());
    assert_eq!(filled.apply(&gappy)?.values(), &[Some(0.0), Some(0.0), Some(6.0), Some(9.0)]);

    let line = series(&[Some(0.0), Some(3.0), Some(6.0), Some(9.0), Some(12.0)]);
    let rate = SeriesFilters {
        gradient_dt: Some(1.0),
        ..SeriesFilters::default()
    };
    for v in rate.apply(&line)?.values() {
        assert_relative_eq!(v.expect("valid"), 3.0, epsilon = 1e-12);
    }

    // Detrending runs before the gradient.
    let both = SeriesFilters {
        detrend: true,
        gradient_dt: Some(1.0),
        ..SeriesFilters::default()
    };
    for v in both.apply(&line)?.values() {
        assert_relative_eq!(v.expect("valid"), 0.0, epsilon = 1e-6);
    }

    let unsmoothed = SeriesFilters {
        hp_lambda: Some(0.0),
        ..SeriesFilters::default()
    };
    let bumpy = series(&[Some(0.0), Some(5.0), Some(0.0), Some(5.0), Some(0.0)]);
    for (a, b) in unsmoothed.apply(&bumpy)?.values().iter().zip(bumpy.values()) {
        assert_relative_eq!(a.expect("valid"), b.expect("valid"), epsilon = 1e-9);
    }

    let short = SeriesFilters {
        detrend: true,
        ..SeriesFilters::default()
    };
    assert!(matches!(
        short.apply(&series(&[Some(1.0)])),
        Err(DhSeriesError::InsufficientSamples { .. })
    ));
    Ok(())
}
