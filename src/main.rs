//! Entry point for the dhseries application.
//! Handles CLI parsing, configuration and region loading, and dispatches the
//! regional analysis and its outputs.

use clap::Parser;
use dhseries::cli::Args;
use dhseries::config::AnalysisConfig;
use dhseries::errors::Result;
use dhseries::netcdf_io::{
    check_variable_names, read_dataset, write_area_grid, write_field, write_report_json, SeriesWriter,
};
use dhseries::parallel::{ParallelConfig, ParallelInfo};
use dhseries::pipeline::{Pipeline, RegionReport};
use dhseries::region::{Region, RegionCatalog};
use log::{error, info};

fn setup_logging(verbosity: u8) -> std::result::Result<(), log::SetLoggerError> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stdout);
    builder.format_target(false);
    match verbosity {
        0 => builder.filter_level(log::LevelFilter::Info),
        1 => builder.filter_level(log::LevelFilter::Debug),
        _ => builder.filter_level(log::LevelFilter::Trace),
    };
    builder.try_init()
}

/// `--region` flags win over `--regions`, which wins over the configuration's
/// own list; with none of them the built-in Antarctic catalog is used.
fn resolve_catalog(args: &Args, config: &AnalysisConfig) -> Result<RegionCatalog> {
    if !args.region.is_empty() {
        let mut catalog = RegionCatalog::new();
        for def in args.region.iter().cloned() {
            catalog.insert(Region::try_from(def)?)?;
        }
        return Ok(catalog);
    }
    if let Some(path) = &args.regions {
        return RegionCatalog::from_file(path);
    }
    Ok(config.region_catalog()?.unwrap_or_else(RegionCatalog::antarctic))
}

fn print_summary(reports: &[RegionReport]) {
    println!("\n📈 Regional trends");
    println!("==============================");
    for report in reports {
        match &report.trend {
            Some(trend) => {
                let err = trend
                    .rate_error
                    .map_or_else(|| "n/a".to_string(), |e| format!("{e:.4}"));
                println!(
                    "   {:<20} rate {:>9.4} ± {:<8} /yr  ({} samples, {})",
                    report.name,
                    trend.rate,
                    err,
                    trend.valid_samples,
                    trend.method.as_str()
                );
            }
            None => println!(
                "   {:<20} ⚠ {}",
                report.name,
                report.undetermined.as_deref().unwrap_or("no trend")
            ),
        }
    }
}

fn run(args: Args) -> Result<()> {
    ParallelConfig::new(args.threads).setup_global_pool()?;
    ParallelInfo::current().log();

    let mut config = match &args.config {
        Some(path) => AnalysisConfig::from_file(path)?,
        None => AnalysisConfig::default(),
    };
    args.apply_overrides(&mut config);
    config.validate()?;
    let catalog = resolve_catalog(&args, &config)?;
    if args.output_netcdf.is_some() {
        check_variable_names(catalog.names())?;
    }

    if args.list_regions {
        println!("\n🗺  Regions ({})", catalog.len());
        for name in catalog.names() {
            println!("   {name}");
        }
        return Ok(());
    }

    let Some(file) = &args.file else {
        return Err("no input file given".into());
    };
    let dataset = read_dataset(file, &config.variables)?;
    println!("Successfully opened NetCDF file: {}", file.display());

    let pipeline = Pipeline::new(config);
    let prepared = pipeline.prepare(&dataset)?;
    let reports = pipeline.run_prepared(&prepared, &catalog)?;
    print_summary(&reports);

    if let Some(path) = &args.output_netcdf {
        SeriesWriter::new(path)
            .with_units(&pipeline.config().units)
            .write(prepared.stack.time(), &reports)?;
        println!("✅ Saved regional series to {}", path.display());
    }
    if let Some(path) = &args.output_json {
        write_report_json(path, &reports)?;
        println!("✅ Saved report to {}", path.display());
    }
    if let Some(path) = &args.output_area {
        write_area_grid(path, prepared.stack.grid(), &prepared.area)?;
        println!("✅ Saved area grid to {}", path.display());
    }
    if let Some(path) = &args.output_field {
        let field = pipeline.display_field(&prepared)?;
        write_field(path, &field.lon, &field.lat, "dh_mean", &pipeline.config().units, &field.values)?;
        println!("✅ Saved display field to {}", path.display());
    }

    info!("processed {} regions", reports.len());
    Ok(())
}

fn main() {
    // Parse command-line arguments
    let args = Args::parse();

    println!(
        r#"
------------------------------------------------------------------
         _ _                        _
      __| | |__  ___  ___ _ __ (_) ___  ___
     / _` | '_ \/ __|/ _ \ '__|| |/ _ \/ __|
    | (_| | | | \__ \  __/ |   | |  __/\__ \
     \__,_|_| |_|___/\___|_|   |_|\___||___/
          Elevation-change time series tool
------------------------------------------------------------------
                        "#
    );

    if let Err(e) = setup_logging(args.verbose) {
        eprintln!("Failed to initialise logging: {e}");
    }

    if let Err(e) = run(args) {
        error!("{e}");
        std::process::exit(1);
    }
}
