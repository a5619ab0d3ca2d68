use deps::*;

use std::{path::PathBuf, time::Duration};

use bevy::{
    app::{AppExit, ScheduleRunnerSettings},
    ecs::event::{Events, ManualEventReader},
    prelude::*,
};
use clap::Parser;
use eyre::WrapErr;
use rand::{rngs::StdRng, Rng, SeedableRng};

use galacron::{
    config::GameConfig,
    events::{ScoreTally, SimEvent},
    math::*,
    mind::{actor::ActorIndex, ActorSystems, MindPlugin, SimClock, SimulationSettings},
    sensors::{SharedTargets, TargetId},
    sim,
};

/// Headless formation demo: a player drifts along the bottom of the field
/// while an automatic gunner picks enemies off.
#[derive(Debug, Parser)]
#[clap(name = "galacron", version)]
struct Cli {
    #[clap(long, short, default_value = "assets/config/galacron.ron")]
    config: PathBuf,
    #[clap(long, default_value_t = 7)]
    seed: u64,
    /// Simulated seconds before giving up.
    #[clap(long, default_value_t = 90.)]
    max_seconds: f32,
    /// Seconds between the gunner's kills.
    #[clap(long, default_value_t = 1.5)]
    kill_interval: f32,
    /// Formations to clear before stopping. Each level restarts the same
    /// formation from scratch.
    #[clap(long, default_value_t = 1)]
    levels: u32,
    /// Run at wall-clock speed instead of as fast as possible.
    #[clap(long)]
    realtime: bool,
}

const STEP: f32 = 1. / 60.;

fn main() -> eyre::Result<()> {
    let _log_guard = setup_tracing()?;
    let cli = Cli::parse();

    let config = GameConfig::load(&cli.config)?;
    let (wait, fixed_dt) = if cli.realtime {
        (Duration::from_secs_f32(STEP), None)
    } else {
        (Duration::ZERO, Some(STEP))
    };

    let mut app = App::new();
    app.insert_resource(ScheduleRunnerSettings::run_loop(wait))
        .add_plugins(MinimalPlugins)
        .add_plugin(MindPlugin)
        .insert_resource(SimulationSettings { fixed_dt });

    let formation =
        sim::install(&mut app.world, &config, cli.seed).wrap_err("invalid formation config")?;
    let player = Player {
        id: TargetId(0),
        phase: 0.,
        targets: app.world.resource::<SharedTargets>().clone(),
    };
    player
        .targets
        .write()
        .register(player.id, TVec2::new(0., PLAYER_ROW));
    sim::start_formation(&mut app.world, formation).wrap_err("unable to start the formation")?;
    tracing::info!(seed = cli.seed, config = %cli.config.display(), "starting");

    app.insert_resource(player)
        .insert_resource(Gunner {
            interval: cli.kill_interval,
            timer: cli.kill_interval,
            rng: StdRng::seed_from_u64(cli.seed.wrapping_add(1)),
        })
        .insert_resource(RunLimit {
            max_seconds: cli.max_seconds,
            levels_left: cli.levels.max(1),
            formation,
        })
        .insert_resource(ScoreTally::default())
        .init_resource::<SimEventCursor>()
        .add_system(move_player.before(ActorSystems::Update))
        .add_system_to_stage(CoreStage::PostUpdate, gunner.exclusive_system())
        .add_system_to_stage(CoreStage::PostUpdate, scoreboard.exclusive_system().at_end())
        .run();

    Ok(())
}

fn setup_tracing() -> eyre::Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    color_eyre::install()?;
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new("info,galacron=debug")?,
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer))
        .with(tracing_error::ErrorLayer::default())
        .try_init()?;
    Ok(guard)
}

const PLAYER_ROW: f32 = -6.;

struct Player {
    id: TargetId,
    phase: f32,
    targets: SharedTargets,
}

fn move_player(clock: Res<SimClock>, mut player: ResMut<Player>) {
    player.phase += clock.dt;
    let x = (player.phase * 0.7).sin() * 4.;
    player
        .targets
        .write()
        .set_position(player.id, TVec2::new(x, PLAYER_ROW));
}

struct Gunner {
    interval: f32,
    timer: f32,
    rng: StdRng,
}

fn gunner(world: &mut World) {
    let dt = world.resource::<SimClock>().dt;
    let victim = {
        let ids = world.resource::<ActorIndex>().ids();
        let mut gunner = world.resource_mut::<Gunner>();
        gunner.timer -= dt;
        if gunner.timer > 0. {
            return;
        }
        let interval = gunner.interval;
        gunner.timer += interval;
        if ids.is_empty() {
            return;
        }
        ids[gunner.rng.gen_range(0..ids.len())]
    };
    if let Err(err) = sim::kill_actor(world, victim) {
        tracing::warn!(%err, "gunner missed");
    }
}

struct RunLimit {
    max_seconds: f32,
    levels_left: u32,
    formation: Entity,
}

fn scoreboard(world: &mut World) {
    let events: Vec<SimEvent> = world.resource_scope(|world, mut reader: Mut<SimEventCursor>| {
        let events = world.resource::<Events<SimEvent>>();
        reader.0.iter(events).cloned().collect()
    });
    let mut exit = false;
    for event in events {
        match event {
            SimEvent::EnemyKilled(kill) => {
                let mut tally = world.resource_mut::<ScoreTally>();
                tally.record(&kill);
                tracing::info!(
                    actor = %kill.actor,
                    points = kill.point_value,
                    diving = kill.while_diving,
                    score = tally.score,
                    "enemy down"
                );
            }
            SimEvent::SpawnComplete => tracing::info!("all waves in, diving enabled"),
            SimEvent::DiveStarted { actor } => tracing::info!(%actor, "dive"),
            SimEvent::FormationDefeated => {
                let tally = world.resource::<ScoreTally>();
                tracing::info!(score = tally.score, high_score = tally.high_score, "formation defeated");
                let mut limit = world.resource_mut::<RunLimit>();
                limit.levels_left = limit.levels_left.saturating_sub(1);
                if limit.levels_left == 0 {
                    exit = true;
                    continue;
                }
                let formation = limit.formation;
                match sim::restart_formation(world, formation) {
                    Ok(()) => tracing::info!("next level"),
                    Err(err) => {
                        tracing::error!(%err, "unable to restart the formation");
                        exit = true;
                    }
                }
            }
            _ => {}
        }
    }
    let elapsed = world.resource::<SimClock>().elapsed;
    if elapsed >= world.resource::<RunLimit>().max_seconds as f64 {
        tracing::info!(score = world.resource::<ScoreTally>().score, "out of time");
        exit = true;
    }
    if exit {
        world.resource_mut::<Events<AppExit>>().send(AppExit);
    }
}

/// Where the scoreboard left off in the event stream.
#[derive(Default)]
struct SimEventCursor(ManualEventReader<SimEvent>);
