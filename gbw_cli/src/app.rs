//! Command implementations: config loading, hardware assembly, settings.

use crate::cli::TriggerArg;
use eyre::{Result, WrapErr};
use gbw_config::{Config, FileStore, SettingsPatch, load_calibration_csv};
use gbw_core::params::keys;
use gbw_core::{
    CalibrationParameters, FilterCfg, GbwError, GrindTrigger, InputCfg, Persistence, RunCfg,
    RunSummary, Sampler, SamplerCfg, SamplerEvent, SnapshotCell, WeightSampler,
};
use gbw_hardware::{SimCfg, SimScript, SimWorld};
use gbw_traits::{MonotonicClock, Scale, SettingValue};
use gbw_ui::{ConsolePresentation, DisplayTask, OverlaySlot, TextRenderer};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

const DISPLAY_HZ: u32 = 10;
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

impl From<TriggerArg> for GrindTrigger {
    fn from(t: TriggerArg) -> Self {
        match t {
            TriggerArg::Button => GrindTrigger::Button,
            TriggerArg::Cup => GrindTrigger::Cup,
        }
    }
}

/// Read, parse and validate the config file; defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let cfg = match path {
        Some(p) => {
            let text = fs::read_to_string(p)
                .wrap_err_with(|| format!("read config {}", p.display()))?;
            gbw_config::load_toml(&text)
                .wrap_err_with(|| format!("parse config {}", p.display()))?
        }
        None => Config::default(),
    };
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

fn open_store(cfg: &Config, path: &Path) -> Result<Persistence> {
    Ok(into_persistence(cfg, FileStore::open(path)?))
}

// A settings file that had to be set aside is rewritten with defaults at once.
fn into_persistence(cfg: &Config, file: FileStore) -> Persistence {
    let recovered = file.recovered();
    let store = Persistence::new(file);
    if recovered && !CalibrationParameters::load(&store, cfg.dosing.max_offset_g).persist_all(&store) {
        tracing::warn!("could not rewrite settings file with defaults");
    }
    store
}

fn renderer(cfg: &Config) -> TextRenderer {
    TextRenderer::default().calibration_mass(cfg.input.calibration_mass_g)
}

#[derive(Debug, Clone, Default)]
pub struct RunOpts {
    pub sim: bool,
    pub sim_script: Option<PathBuf>,
    pub shots: Option<u64>,
    pub max_runtime_ms: Option<u64>,
    pub trigger: Option<TriggerArg>,
    pub display: bool,
}

pub fn run(
    cfg: &Config,
    store_path: &Path,
    opts: &RunOpts,
    shutdown: Arc<AtomicBool>,
) -> Result<RunSummary> {
    let store = open_store(cfg, store_path)?;
    let mut run_cfg = RunCfg::from(cfg);
    run_cfg.max_runtime = opts.max_runtime_ms.map(Duration::from_millis);
    run_cfg.stop_after_doses = opts.shots;
    run_cfg.trigger_override = opts.trigger.map(GrindTrigger::from);

    let snapshots = SnapshotCell::new();
    let overlays = OverlaySlot::default();
    let _display = if opts.display {
        Some(DisplayTask::spawn(
            snapshots.clone(),
            overlays.clone(),
            renderer(cfg),
            std::io::stdout(),
            MonotonicClock::new(),
            DISPLAY_HZ,
        )?)
    } else {
        None
    };
    let mut presentation = ConsolePresentation::new(renderer(cfg), overlays, MonotonicClock::new());

    if opts.sim || opts.sim_script.is_some() {
        let script = match &opts.sim_script {
            Some(p) => {
                let text = fs::read_to_string(p)
                    .wrap_err_with(|| format!("read sim script {}", p.display()))?;
                SimScript::parse(&text)?
            }
            None => SimScript::demo(),
        };
        let world = SimWorld::with_script(sim_cfg(&store, cfg), MonotonicClock::new(), script);
        tracing::info!(steps = world.pending_steps(), "running on simulated hardware");
        return gbw_core::run(
            world.scale(),
            world.relay(),
            world.controls(),
            store,
            run_cfg,
            &mut presentation,
            snapshots,
            shutdown,
        );
    }
    run_hardware(cfg, store, run_cfg, &mut presentation, snapshots, shutdown)
}

// Simulated load cell reads in the same units as the persisted calibration.
fn sim_cfg(store: &Persistence, cfg: &Config) -> SimCfg {
    let params = CalibrationParameters::load(store, cfg.dosing.max_offset_g);
    SimCfg {
        counts_per_gram: params.scale_factor,
        ..SimCfg::default()
    }
}

#[cfg(feature = "hardware")]
fn run_hardware(
    cfg: &Config,
    store: Persistence,
    run_cfg: RunCfg,
    presentation: &mut dyn gbw_core::Presentation,
    snapshots: SnapshotCell,
    shutdown: Arc<AtomicBool>,
) -> Result<RunSummary> {
    use gbw_hardware::{ControlPins, GpioControls, GpioRelay, HardwareScale};
    let p = &cfg.pins;
    let scale = HardwareScale::open(p.hx711_dt, p.hx711_sck).wrap_err("open hx711")?;
    let relay = GpioRelay::open(p.relay, cfg.relay.active_high).wrap_err("open relay pin")?;
    let controls = GpioControls::open(ControlPins {
        encoder_a: p.encoder_a,
        encoder_b: p.encoder_b,
        encoder_button: p.encoder_button,
        trigger: p.trigger,
    })
    .wrap_err("open encoder pins")?;
    gbw_core::run(scale, relay, controls, store, run_cfg, presentation, snapshots, shutdown)
}

#[cfg(not(feature = "hardware"))]
fn run_hardware(
    _cfg: &Config,
    _store: Persistence,
    _run_cfg: RunCfg,
    _presentation: &mut dyn gbw_core::Presentation,
    _snapshots: SnapshotCell,
    _shutdown: Arc<AtomicBool>,
) -> Result<RunSummary> {
    eyre::bail!("built without hardware support; rerun with --sim or build with --features hardware")
}

/// Result of `self-check`.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub settings_keys: usize,
    pub scale_factor: f32,
    pub weight_g: f32,
    pub backend: &'static str,
}

pub fn self_check(cfg: &Config, store_path: &Path, sim: bool) -> Result<CheckReport> {
    let file = FileStore::open(store_path)?;
    let settings_keys = file.keys().count();
    let store = into_persistence(cfg, file);
    let params = CalibrationParameters::load(&store, cfg.dosing.max_offset_g);
    let sampler_cfg = SamplerCfg::from(&cfg.sampler);
    let filter_cfg = FilterCfg::from(&cfg.filter);

    let (weight_g, backend) = if sim {
        let world = SimWorld::new(sim_cfg(&store, cfg), MonotonicClock::new());
        (probe(world.scale(), sampler_cfg, filter_cfg, params.scale_factor)?, "sim")
    } else {
        (probe_hardware(cfg, sampler_cfg, filter_cfg, params.scale_factor)?, "hx711")
    };
    Ok(CheckReport {
        settings_keys,
        scale_factor: params.scale_factor,
        weight_g,
        backend,
    })
}

#[cfg(feature = "hardware")]
fn probe_hardware(cfg: &Config, s: SamplerCfg, f: FilterCfg, factor: f32) -> Result<f32> {
    let scale = gbw_hardware::HardwareScale::open(cfg.pins.hx711_dt, cfg.pins.hx711_sck)
        .wrap_err("open hx711")?;
    probe(scale, s, f, factor)
}

#[cfg(not(feature = "hardware"))]
fn probe_hardware(_cfg: &Config, _s: SamplerCfg, _f: FilterCfg, _factor: f32) -> Result<f32> {
    eyre::bail!("built without hardware support; rerun with --sim or build with --features hardware")
}

// Tare, then wait for one filtered sample.
fn probe<S: Scale + Send + 'static>(
    scale: S,
    sampler_cfg: SamplerCfg,
    filter_cfg: FilterCfg,
    factor: f32,
) -> Result<f32> {
    let sampler = Sampler::spawn(WeightSampler::new(
        scale,
        MonotonicClock::new(),
        sampler_cfg,
        filter_cfg,
        factor,
    ));
    let deadline = Instant::now() + PROBE_TIMEOUT;
    while Instant::now() < deadline {
        match sampler.recv_timeout(Duration::from_millis(100)) {
            Some(SamplerEvent::Tared { ok: false, .. }) => {
                return Err(eyre::Report::new(GbwError::Timeout)).wrap_err("tare failed");
            }
            Some(SamplerEvent::Sample(s)) => return Ok(s.value),
            Some(SamplerEvent::Tared { ok: true, .. } | SamplerEvent::NotReady { .. }) | None => {}
        }
    }
    Err(eyre::Report::new(GbwError::Timeout)).wrap_err("no sample from scale")
}

pub fn settings_show(cfg: &Config, store_path: &Path) -> Result<serde_json::Value> {
    let store = open_store(cfg, store_path)?;
    let p = CalibrationParameters::load(&store, cfg.dosing.max_offset_g);
    Ok(params_json(&p))
}

// f32 through its shortest decimal form, so 1396.21 prints as 1396.21.
fn num(v: f32) -> serde_json::Value {
    json!(v.to_string().parse::<f64>().unwrap_or(f64::from(v)))
}

fn params_json(p: &CalibrationParameters) -> serde_json::Value {
    let mut m = serde_json::Map::new();
    m.insert(keys::CALIBRATION.into(), num(p.scale_factor));
    m.insert(keys::SET_WEIGHT.into(), num(p.target_weight));
    m.insert(keys::OFFSET.into(), num(p.offset));
    m.insert(keys::CUP.into(), num(p.cup_weight));
    m.insert(keys::SCALE_MODE.into(), json!(p.scale_mode));
    m.insert(keys::GRIND_MODE.into(), json!(p.grind_continuous_mode));
    m.insert(keys::SHOT_COUNT.into(), json!(p.shot_count));
    m.insert(keys::SLEEP_TIME.into(), json!(p.sleep_timeout_ms));
    m.insert(keys::GRIND_TRIGGER.into(), json!(p.grind_trigger.is_button()));
    serde_json::Value::Object(m)
}

/// Outcome of `settings set`.
#[derive(Debug)]
pub struct PatchOutcome {
    pub view: String,
    pub restart_required: bool,
}

pub fn settings_set(
    cfg: &Config,
    store_path: &Path,
    content_type: &str,
    body: &str,
) -> Result<PatchOutcome> {
    let patch = SettingsPatch::parse(content_type, body)?;
    if patch.is_empty() {
        eyre::bail!("no recognised settings fields in request body");
    }
    let store = open_store(cfg, store_path)?;
    let mut p = CalibrationParameters::load(&store, cfg.dosing.max_offset_g);
    let input = InputCfg::from(&cfg.input);
    let restart_required = p.apply_patch(&patch, &store, &input, cfg.dosing.max_offset_g)?;
    Ok(PatchOutcome {
        view: p.view().to_json()?,
        restart_required,
    })
}

pub fn settings_reset(cfg: &Config, store_path: &Path) -> Result<serde_json::Value> {
    let store = open_store(cfg, store_path)?;
    let mut p = CalibrationParameters::load(&store, cfg.dosing.max_offset_g);
    p.reset_to_defaults();
    if !p.persist_all(&store) {
        eyre::bail!("could not write settings to {}", store_path.display());
    }
    tracing::info!(path = %store_path.display(), "settings reset to defaults");
    Ok(params_json(&p))
}

pub fn calibrate(
    cfg: &Config,
    store_path: &Path,
    csv: &Path,
    save: bool,
) -> Result<gbw_config::Calibration> {
    let cal = load_calibration_csv(csv)?;
    tracing::info!(
        counts_per_gram = cal.counts_per_gram,
        zero_counts = cal.zero_counts,
        "calibration fitted"
    );
    if save {
        let store = open_store(cfg, store_path)?;
        let ok = store.save(&[(
            keys::CALIBRATION,
            SettingValue::Float(f64::from(cal.counts_per_gram)),
        )]);
        if !ok {
            eyre::bail!("could not write settings to {}", store_path.display());
        }
    }
    Ok(cal)
}
