use anyhow::{bail, Context};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::Parser;
use onetry_permadeath::constants::{
    is_core_block, DEATH_MODE_HEALTH_CAP, DEFAULT_SETTINGS_PATH, DIFFICULTY_DIALOG_DELAY_FRAMES,
    TICK_RATE,
};
use onetry_permadeath::difficulty::TapOutcome;
use onetry_permadeath::host::WorldAccess;
use onetry_permadeath::runtime::{PermadeathRuntime, RuntimeOptions};
use onetry_permadeath::sandbox::SandboxHost;
use onetry_permadeath::service::Session;
use onetry_permadeath::settings::{JsonFileSettings, MemorySettings, SettingsStore};
use onetry_permadeath::types::{
    DifficultyMode, GameState, HostCommand, MessageKey, SectorRef, TrackerSnapshot, WorldEvent,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

const UNIT_MAX_HEALTH: f32 = 100.0;
const CORE_MAX_HEALTH: f32 = 4000.0;
const HIT_CHANCE: f64 = 0.04;
const DEFAULT_TICKS: u64 = TICK_RATE as u64 * 30;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long)]
    mode: Option<String>,
    #[arg(long)]
    players: Option<usize>,
    #[arg(long)]
    ticks: Option<u64>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, env = "ONETRY_SETTINGS_PATH")]
    settings: Option<PathBuf>,
    /// Keep settings in memory; nothing is written to disk.
    #[arg(long)]
    ephemeral: bool,
    /// Confirm the death screen as soon as it appears.
    #[arg(long)]
    confirm_deaths: bool,
    #[arg(long)]
    match_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    name: String,
    mode: DifficultyMode,
    players: usize,
    ticks: u64,
    seed: u64,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    seed: u64,
    players: usize,
    mode: DifficultyMode,
    #[serde(rename = "ticksRun")]
    ticks_run: u64,
    deaths: u32,
    #[serde(rename = "blockedRespawns")]
    blocked_respawns: usize,
    #[serde(rename = "unitsDestroyed")]
    units_destroyed: usize,
    wiped: bool,
    #[serde(rename = "returnedToMenu")]
    returned_to_menu: bool,
    tracker: TrackerSnapshot,
    anomalies: Vec<Anomaly>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
enum AnomalyKind {
    BlockedInNormal,
    DeathCountedTwice,
    BlockedHoldsUnit,
    CoreAboveCap,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct Anomaly {
    kind: AnomalyKind,
    /// Player id, or `block#id` for structures.
    subject: String,
    detail: String,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    tick: u64,
    #[serde(flatten)]
    anomaly: Anomaly,
}

/// Keeps every occurrence, but lists each kind per subject only once.
#[derive(Debug, Default)]
struct AnomalyLog {
    distinct: Vec<Anomaly>,
    records: Vec<AnomalyRecord>,
    seen: HashSet<(AnomalyKind, String)>,
}

impl AnomalyLog {
    fn record(&mut self, tick: u64, anomaly: Anomaly) {
        if self.seen.insert((anomaly.kind, anomaly.subject.clone())) {
            self.distinct.push(anomaly.clone());
        }
        self.records.push(AnomalyRecord { tick, anomaly });
    }
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioRunResult {
    #[serde(flatten)]
    result: ScenarioResultLine,
    #[serde(rename = "anomalyRecords")]
    anomaly_records: Vec<AnomalyRecord>,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "matchId")]
    match_id: String,
    #[serde(rename = "startedAt")]
    started_at: String,
    #[serde(rename = "finishedAt")]
    finished_at: String,
    #[serde(rename = "elapsedMs")]
    elapsed_ms: i64,
    #[serde(rename = "scenarioCount")]
    scenario_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "deathsByMode")]
    deaths_by_mode: BTreeMap<String, u32>,
    scenarios: Vec<ScenarioResultLine>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let scenarios = resolve_scenarios(&cli)?;
    let run_started_at = Utc::now();
    let seed_hint = scenarios.first().map(|scenario| scenario.seed).unwrap_or(0);
    let match_id = cli
        .match_id
        .clone()
        .unwrap_or_else(|| default_match_id(seed_hint, run_started_at));
    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));

    let mut has_anomaly = false;
    let mut scenario_results = Vec::new();
    let mut total_anomalies = 0usize;

    for scenario in scenarios {
        info!(
            match_id = %match_id,
            scenario = %scenario.name,
            seed = scenario.seed,
            mode = %scenario.mode,
            players = scenario.players,
            "scenario started"
        );
        let scenario_run = if cli.ephemeral {
            run_scenario(&scenario, MemorySettings::new(), cli.confirm_deaths)?
        } else {
            let store = JsonFileSettings::open(settings_path.clone());
            run_scenario(&scenario, store, cli.confirm_deaths)?
        };

        for record in &scenario_run.anomaly_records {
            warn!(
                scenario = %scenario.name,
                tick = record.tick,
                kind = ?record.anomaly.kind,
                subject = %record.anomaly.subject,
                detail = %record.anomaly.detail,
                "anomaly detected"
            );
        }
        if !scenario_run.result.anomalies.is_empty() {
            has_anomaly = true;
        }
        total_anomalies += scenario_run.anomaly_records.len();

        info!(
            scenario = %scenario.name,
            ticks = scenario_run.result.ticks_run,
            deaths = scenario_run.result.deaths,
            wiped = scenario_run.result.wiped,
            "scenario finished"
        );
        println!("{}", serde_json::to_string(&scenario_run.result)?);
        scenario_results.push(scenario_run.result);
    }

    let summary = build_run_summary(
        match_id.clone(),
        run_started_at,
        Utc::now(),
        scenario_results,
        total_anomalies,
    );

    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(err) = write_summary(path, &summary) {
            error!(path = %path.display(), error = %err, "summary write failed");
            std::process::exit(2);
        }
    }

    info!(
        match_id = %match_id,
        scenarios = summary.scenario_count,
        anomalies = summary.anomaly_count,
        "run finished"
    );

    if has_anomaly {
        std::process::exit(1);
    }
    Ok(())
}

fn run_scenario<S: SettingsStore>(
    scenario: &Scenario,
    store: S,
    confirm_deaths: bool,
) -> anyhow::Result<ScenarioRunResult> {
    let mut runtime = PermadeathRuntime::new(store, RuntimeOptions::default())
        .context("failed to initialize difficulty settings")?;
    apply_mode(&mut runtime, scenario.mode)?;
    runtime.start();
    runtime.acknowledge_warning(false);

    let mut host = SandboxHost::new();
    for content in ["duo", "scatter", "lancer"] {
        host.unlock(content);
    }
    host.start_campaign(serpulo(15), "sim-slot");
    host.discover_sector(serpulo(21));
    host.add_structure("core-shard", CORE_MAX_HEALTH);
    host.add_structure("duo", 110.0);

    let mut session = Session::new(runtime, host);
    let mut ids = Vec::with_capacity(scenario.players);
    for idx in 0..scenario.players {
        let id = session
            .host
            .connect(&format!("p{}", idx + 1), &format!("Player-{:02}", idx + 1));
        session.handle(WorldEvent::PlayerJoin {
            player_id: id.clone(),
        });
        ids.push(id);
    }

    let mut rng = StdRng::seed_from_u64(scenario.seed);
    let mut deaths = 0u32;
    let mut wipe = None;
    let mut returned_to_menu = false;
    let mut anomalies = AnomalyLog::default();
    let mut ticks_run = 0u64;

    for tick in 1..=scenario.ticks {
        ticks_run = tick;
        session.host.tick_timers();
        for id in &ids {
            if let Some(unit) = session.host.try_respawn(id, UNIT_MAX_HEALTH) {
                session.handle(WorldEvent::UnitChanged {
                    player_id: id.clone(),
                    unit: Some(unit),
                });
            }
            let unit = session.host.player(id).and_then(|player| player.unit);
            if let Some(unit) = unit {
                if rng.random_bool(HIT_CHANCE) {
                    let amount = rng.random_range(1.0f32..25.0);
                    session.host.damage_unit(unit, amount);
                }
            }
        }

        let state_before = session.host.game_state();
        session.step();

        for dialog in session.host.take_dialogs() {
            if dialog != HostCommand::ShowDeathScreen {
                continue;
            }
            deaths += 1;
            if confirm_deaths && wipe.is_none() {
                wipe = Some(session.confirm_death());
            }
        }

        if state_before == GameState::Playing && session.host.game_state() == GameState::Menu {
            session.handle(WorldEvent::StateChanged {
                state: GameState::Menu,
            });
            returned_to_menu = true;
        }

        for anomaly in collect_anomalies(&session, scenario.mode) {
            anomalies.record(tick, anomaly);
        }
        if returned_to_menu {
            break;
        }
    }

    if returned_to_menu {
        for _ in 0..=DIFFICULTY_DIALOG_DELAY_FRAMES {
            session.run_frame();
        }
    }

    let executed = session.host.executed();
    let blocked_respawns = executed
        .iter()
        .filter(|command| {
            matches!(
                command,
                HostCommand::NotifyPlayer {
                    message: MessageKey::RespawnBlocked,
                    ..
                }
            )
        })
        .count();
    let units_destroyed = executed
        .iter()
        .filter(|command| matches!(command, HostCommand::DestroyUnit { .. }))
        .count();

    Ok(ScenarioRunResult {
        result: ScenarioResultLine {
            scenario: scenario.name.clone(),
            seed: scenario.seed,
            players: scenario.players,
            mode: scenario.mode,
            ticks_run,
            deaths,
            blocked_respawns,
            units_destroyed,
            wiped: wipe.is_some_and(|result| result.occurred()),
            returned_to_menu,
            tracker: session.runtime.tracker().snapshot(),
            anomalies: anomalies.distinct,
        },
        anomaly_records: anomalies.records,
    })
}

/// Selects `mode`, using the ten-tap gesture when Death is still locked.
fn apply_mode<S: SettingsStore>(
    runtime: &mut PermadeathRuntime<S>,
    mode: DifficultyMode,
) -> anyhow::Result<()> {
    if mode == DifficultyMode::Death && !runtime.settings().death_unlocked() {
        while runtime.tap_ultra()? != TapOutcome::DeathUnlocked {}
        return Ok(());
    }
    runtime.select_mode(mode)?;
    Ok(())
}

fn collect_anomalies<S: SettingsStore>(
    session: &Session<S, SandboxHost>,
    mode: DifficultyMode,
) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    let snapshot = session.runtime.tracker().snapshot();

    for record in &snapshot.players {
        let about = |kind, detail| Anomaly {
            kind,
            subject: record.id.to_string(),
            detail,
        };
        if mode.is_normal() && record.respawn_blocked {
            anomalies.push(about(AnomalyKind::BlockedInNormal, String::new()));
        }
        if record.death_count > 1 {
            anomalies.push(about(
                AnomalyKind::DeathCountedTwice,
                format!("deaths={}", record.death_count),
            ));
        }
        if record.respawn_blocked {
            if let Some(unit) = session.host.player(&record.id).and_then(|player| player.unit) {
                anomalies.push(about(AnomalyKind::BlockedHoldsUnit, format!("unit={unit}")));
            }
        }
    }

    if mode == DifficultyMode::Death {
        for structure in session.host.structures() {
            if !is_core_block(&structure.block) {
                continue;
            }
            let Some(pool) = session.host.structure_health(structure.id) else {
                continue;
            };
            if pool.health > DEATH_MODE_HEALTH_CAP || pool.max_health > DEATH_MODE_HEALTH_CAP {
                anomalies.push(Anomaly {
                    kind: AnomalyKind::CoreAboveCap,
                    subject: format!("{}#{}", structure.block, structure.id.0),
                    detail: format!("{}/{}", pool.health, pool.max_health),
                });
            }
        }
    }
    anomalies
}

fn resolve_scenarios(cli: &Cli) -> anyhow::Result<Vec<Scenario>> {
    let seed = cli.seed.unwrap_or_else(rand::random);
    let players = cli.players.unwrap_or(3).clamp(1, 64);
    let ticks = cli.ticks.unwrap_or(DEFAULT_TICKS).max(1);

    if let Some(raw) = cli.mode.as_deref() {
        let normalized = raw.trim().to_ascii_lowercase();
        let Some(mode) = DifficultyMode::parse(&normalized) else {
            bail!("unknown difficulty mode: {raw}");
        };
        return Ok(vec![Scenario {
            name: format!("custom-{mode}-p{players}"),
            mode,
            players,
            ticks,
            seed,
        }]);
    }

    Ok(DifficultyMode::ALL
        .iter()
        .enumerate()
        .map(|(idx, mode)| Scenario {
            name: format!("{mode}-p{players}"),
            mode: *mode,
            players,
            ticks,
            seed: seed.wrapping_add(idx as u64),
        })
        .collect())
}

fn serpulo(sector: u32) -> SectorRef {
    SectorRef {
        planet: "serpulo".to_string(),
        sector,
    }
}

/// `onetry-<seed>-<UTC start, basic ISO 8601>`, stable enough to grep logs by.
fn default_match_id(seed: u64, started_at: DateTime<Utc>) -> String {
    format!("onetry-{seed}-{}", started_at.format("%Y%m%dT%H%M%SZ"))
}

fn build_run_summary(
    match_id: String,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    scenarios: Vec<ScenarioResultLine>,
    anomaly_count: usize,
) -> RunSummary {
    let mut deaths_by_mode: BTreeMap<String, u32> = BTreeMap::new();
    for scenario in &scenarios {
        *deaths_by_mode
            .entry(scenario.mode.as_str().to_string())
            .or_insert(0) += scenario.deaths;
    }
    RunSummary {
        match_id,
        started_at: started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        finished_at: finished_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        elapsed_ms: (finished_at - started_at).num_milliseconds(),
        scenario_count: scenarios.len(),
        anomaly_count,
        deaths_by_mode,
        scenarios,
    }
}

fn write_summary(path: &Path, summary: &RunSummary) -> anyhow::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, summary_text)
        .with_context(|| format!("failed to write summary to {}", path.display()))
}
