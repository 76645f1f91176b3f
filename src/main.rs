use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

mod cli;
mod config;
mod error;
mod extent;
mod frame;
mod grid;
mod io;
mod reduce;
mod state;

use cli::{get_args, log_level};
use config::{ExtentConfig, RunConfig};
use error::{ErrorCategory, MaxvalError};
use io::csv::DiagnosticsWriter;
use io::source::{FrameSource, GriddedRun, select_frames};
use reduce::{ReduceOptions, reduce_run};
use state::SummaryState;

fn main() -> Result<()> {
    let args = get_args();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level(&args.log_level))
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = args.into_config().context("Invalid run configuration")?;
    if let Err(e) = run(&config) {
        let category = e
            .chain()
            .find_map(|cause| cause.downcast_ref::<MaxvalError>())
            .map_or(ErrorCategory::Io, MaxvalError::category);
        error!("run failed ({category:?}): {e:#}");
        return Err(e);
    }
    Ok(())
}

fn run(config: &RunConfig) -> Result<()> {
    io::raster::ensure_available()?;

    // Discover timesteps
    let source = GriddedRun::discover(&config.gridded_dir, &config.output_dir, config.bbox)
        .context("Failed to find gridded rasters")?;
    let ids = select_frames(
        source.list_timesteps()?,
        config.frames.as_deref(),
        &config.gridded_dir,
    )?;

    info!("Run configuration:");
    info!("  Gridded rasters: {}", config.gridded_dir.display());
    info!("  Frames: {} ({}..={})", ids.len(), ids[0], ids[ids.len() - 1]);
    info!(
        "  Densities: rho_f={} rho_s={}",
        config.densities.rho_fluid, config.densities.rho_solid
    );
    info!("  Worker threads: {}", config.num_threads);
    if let Some(bbox) = &config.bbox {
        info!("  Bounding box: {:?}", bbox);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.num_threads)
        .build()
        .context("Failed to build worker pool")?;

    let pb = ProgressBar::new(ids.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames ({eta})")?
            .progress_chars("#>-"),
    );

    let mut diagnostics = match &config.diagnostics {
        Some(path) => Some(
            DiagnosticsWriter::create(path)
                .with_context(|| format!("Failed to create diagnostics file: {:?}", path))?,
        ),
        None => None,
    };

    let options = ReduceOptions {
        densities: config.densities,
        recency_window: config.recency_window,
        batch_size: config.num_threads,
    };
    let state = reduce_run(&source, &ids, &options, &pool, diagnostics.as_mut(), &pb)
        .context("Reduction failed")?;
    pb.finish_and_clear();

    if let Some(writer) = diagnostics {
        writer.finish().context("Failed to flush diagnostics")?;
    }

    info!(
        "Folded {} frames up to t={}; {} cells inundated, finest level {}",
        state.frames_folded(),
        state.last_time().unwrap_or_default(),
        state.inundated_cells(),
        state.max_level_seen.iter().max().copied().unwrap_or_default(),
    );

    let template = source.files(ids[0]).map(|f| f.raster.as_path());
    write_summary(config, &state, template)?;

    // Extent failures leave the written rasters in place.
    if let Some(extent) = &config.extent {
        write_extent(config, extent, &state)?;
    }

    Ok(())
}

fn write_summary(config: &RunConfig, state: &SummaryState, template: Option<&Path>) -> Result<()> {
    let bands = state.summary_bands(config.write_froude);
    let grid = state.grid();

    if config.format.geotiff() {
        io::raster::write_geotiff(&config.out_file, grid, &bands, config.epsg, template)
            .with_context(|| format!("Failed to write {:?}", config.out_file))?;
        info!("Summary raster saved to {}", config.out_file.display());
    }

    if config.format.netcdf() {
        let nc_path = config.out_file.with_extension("nc");
        #[cfg(feature = "netcdf")]
        {
            io::netcdf::write_netcdf_summary(
                &nc_path,
                grid,
                &bands,
                config.epsg,
                state.frames_folded(),
            )
            .with_context(|| format!("Failed to write {:?}", nc_path))?;
            info!("Summary NetCDF saved to {}", nc_path.display());
        }
        #[cfg(not(feature = "netcdf"))]
        warn!(
            "built without the `netcdf` feature; {} not written",
            nc_path.display()
        );
    }
    Ok(())
}

fn write_extent(config: &RunConfig, extent: &ExtentConfig, state: &SummaryState) -> Result<()> {
    let raster = state.extent_source(extent.quantity);
    let geometry = extent::delineate(raster, extent.threshold, &state.grid().transform)
        .with_context(|| format!("Extent of {:?} > {} is invalid", extent.quantity, extent.threshold))?;
    if geometry.is_empty() {
        warn!(
            "no cells exceed {} for {:?}; extent is empty",
            extent.threshold, extent.quantity
        );
    }
    io::geojson::write_extent(&extent.out_file, &geometry, config.epsg)
        .with_context(|| format!("Failed to write {:?}", extent.out_file))?;
    info!(
        "Extent with {} polygon(s), area {:.1}, saved to {}",
        geometry.polygons.len(),
        geometry.area(),
        extent.out_file.display()
    );
    Ok(())
}
