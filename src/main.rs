// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use log::info;

use ray_eikonal::boundary::Interface;
use ray_eikonal::eigenray::EigenrayMethod;
use ray_eikonal::io;
use ray_eikonal::reflection::{AttenuationUnits, Material, SurfaceClass};
use ray_eikonal::scenario::{CancelToken, Receivers, Scenario, Source, TracerSettings};
use ray_eikonal::scheduler::{ProgressInfo, RaySweep};
use ray_eikonal::sound_speed::{SoundSpeed, SpeedClass};

#[derive(Clone, Copy, ValueEnum)]
enum Eigenrays {
    Proximity,
    RegulaFalsi,
}

impl From<Eigenrays> for EigenrayMethod {
    fn from(e: Eigenrays) -> Self {
        match e {
            Eigenrays::Proximity => EigenrayMethod::Proximity,
            Eigenrays::RegulaFalsi => EigenrayMethod::RegulaFalsi,
        }
    }
}

#[derive(Parser)]
#[command(name = "ray-eikonal", about = "2-D underwater acoustic ray tracer")]
struct Cli {
    /// Source range (m)
    #[arg(long, default_value = "0.0")]
    source_range: f64,

    /// Source depth (m)
    #[arg(long)]
    source_depth: f64,

    /// Source frequency (Hz)
    #[arg(short = 'f', long, default_value = "1000.0")]
    frequency: f64,

    /// Nominal integration step (m)
    #[arg(short = 's', long, default_value = "10.0")]
    step: f64,

    /// Range box, "r0,r1" (m)
    #[arg(long)]
    range_box: String,

    /// Launch fan in degrees, "min,max,count"
    #[arg(long, default_value = "-30,30,61")]
    angles: String,

    /// Sound speed: "isov:<c>", "<class>:<z0>,<c0>,<z1>,<c1>" with class one of
    /// linp, parp, expp, n2lp, isqp, "munk:<z_axis>,<c_axis>",
    /// "table:<path>" (n x 2 rows of z, c) or "field:<path>"
    #[arg(long, default_value = "isov:1500")]
    ssp: String,

    /// Ranges of a "field:" sound-speed table, comma-separated
    #[arg(long)]
    field_ranges: Option<String>,

    /// Depths of a "field:" sound-speed table, comma-separated
    #[arg(long)]
    field_depths: Option<String>,

    /// Surface depth (m)
    #[arg(long, default_value = "0.0")]
    surface_depth: f64,

    /// Surface class: V, R, A or E
    #[arg(long, default_value = "V")]
    surface_class: String,

    /// Bottom depth (m)
    #[arg(long)]
    bottom_depth: f64,

    /// Bottom class: V, R, A or E
    #[arg(long, default_value = "R")]
    bottom_class: String,

    /// Bottom half-space, "cp,cs,rho,alpha_p,alpha_s"
    #[arg(long)]
    bottom_material: Option<String>,

    /// Units of the bottom attenuation: F, M, N, Q or W
    #[arg(long, default_value = "W")]
    bottom_units: String,

    /// Receiver ranges, comma-separated (m)
    #[arg(long)]
    receiver_ranges: Option<String>,

    /// Receiver depths, comma-separated (m)
    #[arg(long)]
    receiver_depths: Option<String>,

    /// Depth tolerance for eigenrays (m)
    #[arg(long, default_value = "1.0")]
    miss: f64,

    /// Search eigenrays at the receivers
    #[arg(long, value_enum)]
    eigenrays: Option<Eigenrays>,

    /// Output file for ray coordinates (.npy or .mat)
    #[arg(short = 'o', long, default_value = "rays.npy")]
    output: PathBuf,

    /// Output file for the arrival table (.npy or .mat)
    #[arg(long, default_value = "arrivals.npy")]
    arrivals: PathBuf,

    /// Number of Rayon worker threads
    #[arg(long)]
    threads: Option<usize>,

    /// Abort tracing after this many seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Print sweep progress to stderr
    #[arg(long)]
    progress: bool,
}

fn parse_list(s: &str, what: &str) -> Result<Vec<f64>> {
    s.split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("invalid {}: expected comma-separated floats", what))
}

fn parse_fixed<const N: usize>(s: &str, what: &str) -> Result<[f64; N]> {
    let parts = parse_list(s, what)?;
    let n = parts.len();
    parts
        .try_into()
        .map_err(|_| anyhow::anyhow!("{} has {} components, expected {}", what, n, N))
}

fn build_sound_speed(cli: &Cli) -> Result<SoundSpeed> {
    let (tag, params) = cli
        .ssp
        .split_once(':')
        .with_context(|| format!("invalid --ssp '{}': expected '<kind>:<parameters>'", cli.ssp))?;

    match tag.to_ascii_lowercase().as_str() {
        "table" => io::load_profile(Path::new(params))
            .with_context(|| format!("failed to load sound-speed profile {}", params)),
        "field" => {
            let ranges = cli
                .field_ranges
                .as_deref()
                .context("--field-ranges is required with a 'field:' sound speed")?;
            let depths = cli
                .field_depths
                .as_deref()
                .context("--field-depths is required with a 'field:' sound speed")?;
            io::load_field(
                Path::new(params),
                parse_list(ranges, "--field-ranges")?,
                parse_list(depths, "--field-depths")?,
            )
            .with_context(|| format!("failed to load sound-speed field {}", params))
        }
        "isov" => {
            let c: f64 = params.trim().parse().context("invalid isovelocity speed")?;
            Ok(SoundSpeed::isovelocity(c)?)
        }
        "munk" => {
            let [z0, c0] = parse_fixed::<2>(params, "--ssp munk")?;
            Ok(SoundSpeed::profile(SpeedClass::Munk, z0, c0, 0.0, 0.0)?)
        }
        other => {
            let class: SpeedClass = other.parse()?;
            if class == SpeedClass::Tabulated {
                bail!("use 'table:<path>' or 'field:<path>' for tabulated sound speed");
            }
            let [z0, c0, z1, c1] = parse_fixed::<4>(params, "--ssp")?;
            Ok(SoundSpeed::profile(class, z0, c0, z1, c1)?)
        }
    }
}

fn build_scenario(cli: &Cli) -> Result<Scenario> {
    let [r0, r1] = parse_fixed::<2>(&cli.range_box, "--range-box")?;
    let [a_min, a_max, count] = parse_fixed::<3>(&cli.angles, "--angles")?;
    if count < 1.0 || count.fract() != 0.0 {
        bail!("--angles count must be a positive integer, got {}", count);
    }

    let source = Source::new(cli.source_range, cli.source_depth, cli.frequency, cli.step, (r0, r1))
        .context("invalid source")?
        .with_fan(a_min, a_max, count as usize)
        .context("invalid launch fan")?;

    let surface_class: SurfaceClass = cli.surface_class.parse()?;
    let altimetry = Interface::flat(cli.surface_depth, r0, r1, surface_class)?;

    let bottom_class: SurfaceClass = cli.bottom_class.parse()?;
    let mut bathymetry = Interface::flat(cli.bottom_depth, r0, r1, bottom_class)?;
    if let Some(values) = &cli.bottom_material {
        let [cp, cs, rho, ap, as_] = parse_fixed::<5>(values, "--bottom-material")?;
        let units: AttenuationUnits = cli.bottom_units.parse()?;
        bathymetry = bathymetry.with_material(Material::new(cp, cs, rho, ap, as_), units);
    } else if bottom_class == SurfaceClass::Elastic {
        bail!("an elastic bottom needs --bottom-material");
    }

    let sound_speed = build_sound_speed(cli)?;
    let mut scenario =
        Scenario::new(source, altimetry, bathymetry, sound_speed).context("invalid scenario")?;

    if let (Some(ranges), Some(depths)) = (&cli.receiver_ranges, &cli.receiver_depths) {
        let receivers = Receivers::grid(
            &parse_list(ranges, "--receiver-ranges")?,
            &parse_list(depths, "--receiver-depths")?,
            cli.miss,
        )?;
        scenario = scenario.with_receivers(receivers);
    }
    Ok(scenario)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let scenario = build_scenario(&cli)?;

    let mut cancel = CancelToken::new();
    if let Some(secs) = cli.timeout {
        if !secs.is_finite() || secs <= 0.0 {
            bail!("--timeout must be positive, got {}", secs);
        }
        cancel = cancel.with_timeout(Duration::from_secs_f64(secs));
    }
    let settings = TracerSettings::default().with_cancel(cancel);

    let mut sweep = RaySweep::new(&scenario, settings);
    if let Some(threads) = cli.threads {
        sweep = sweep.with_threads(threads);
    }
    if cli.progress {
        sweep = sweep.with_progress(Box::new(|info: ProgressInfo| {
            eprintln!(
                "[{:.1}s] traced={} pending={} in_flight={}",
                info.elapsed.as_secs_f64(),
                info.rays_traced,
                info.rays_pending,
                info.in_flight,
            );
        }));
    }

    let output = sweep.run(None).context("ray sweep failed")?;
    io::save_rays(&cli.output, &output.rays)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;
    info!("wrote {} rays to {}", output.rays.len(), cli.output.display());

    if let Some(method) = cli.eigenrays {
        if scenario.receivers.is_empty() {
            bail!("--eigenrays needs --receiver-ranges and --receiver-depths");
        }
        let arrivals = sweep
            .eigenrays(&output.rays, method.into())
            .context("eigenray search failed")?;
        let found: usize = arrivals.iter().map(Vec::len).sum();
        io::save_arrivals(&cli.arrivals, &arrivals)
            .with_context(|| format!("failed to write {}", cli.arrivals.display()))?;
        info!(
            "found {} eigenrays for {} receivers, wrote {}",
            found,
            scenario.receivers.len(),
            cli.arrivals.display()
        );
    }

    Ok(())
}
