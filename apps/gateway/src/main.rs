//! Gateway: loads the Engine config, wires the scheduler and a
//! per-stream persistence component into the lifecycle container, brings
//! the components up in dependency order, then hands every configured
//! session to the engine driver (`driver::GatewayDriver`) and runs the
//! network event loop until the process is killed.

mod driver;

use std::any::Any;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use xlink_config::{EngineConfig, ScheduleConfig};
use xlink_core::clock::SystemClock;
use xlink_core::SessionId;
use xlink_lifecycle::{Component, Container, LifecycleError, Registration};
use xlink_log::LogStore;
use xlink_net::EventLoop;
use xlink_scheduler::{Schedule, Scheduler, SchedulerEvent, SchedulerListener, TimeWindow};

use driver::GatewayDriver;

/// Turns a validated [`ScheduleConfig`] into the scheduler's runtime
/// [`Schedule`]. Rejected at registration time (logged and skipped)
/// rather than failing startup: a single malformed schedule shouldn't
/// take every other session down with it.
fn build_schedule(config: &ScheduleConfig) -> Option<Schedule> {
    let tz = chrono_tz::Tz::from_str(&config.timezone)
        .map_err(|_| warn!(schedule = %config.name, tz = %config.timezone, "unknown timezone, skipping schedule"))
        .ok()?;
    let mut schedule = Schedule::new(config.name.clone(), tz);
    for window in &config.windows {
        let start = chrono::NaiveTime::parse_from_str(&window.start, "%H:%M").ok()?;
        let end = chrono::NaiveTime::parse_from_str(&window.end, "%H:%M").ok()?;
        let weekdays = window
            .weekdays
            .iter()
            .filter_map(|d| d.parse::<chrono::Weekday>().ok())
            .collect();
        schedule = schedule.with_window(TimeWindow::new(start, end, weekdays));
    }
    if let Some(reset_time) = &config.reset_fixed_time {
        let reset_time = chrono::NaiveTime::parse_from_str(reset_time, "%H:%M").ok()?;
        schedule = schedule.with_reset(reset_time, chrono::Duration::minutes(config.reset_tolerance_minutes.into()));
        schedule = schedule.with_warning(chrono::Duration::minutes(config.warning_minutes_before_reset.into()));
    }
    Some(schedule)
}

struct LoggingListener;

impl SchedulerListener for LoggingListener {
    fn on_schedule_event(&mut self, session_id: &SessionId, event: SchedulerEvent) {
        info!(session = %session_id, event = ?event, "schedule event");
    }
}

struct SchedulerComponent {
    scheduler: Scheduler,
}

impl Component for SchedulerComponent {
    fn init(&mut self) -> Result<(), LifecycleError> {
        info!("scheduler initialized");
        Ok(())
    }

    fn start(&mut self) -> Result<(), LifecycleError> {
        self.scheduler.tick(&mut LoggingListener);
        info!("scheduler started");
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct PersistenceComponent {
    path: PathBuf,
}

impl Component for PersistenceComponent {
    fn init(&mut self) -> Result<(), LifecycleError> {
        std::fs::create_dir_all(&self.path).map_err(|e| LifecycleError::FactoryFailure {
            name: "persistence".into(),
            reason: e.to_string(),
        })?;
        info!(path = %self.path.display(), "persistence directory ready");
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn default_config_path() -> PathBuf {
    std::env::var("XLINK_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/etc/xlink/engine.toml"))
}

fn build_container(config: &EngineConfig) -> Result<Container, LifecycleError> {
    let mut container = Container::new();

    container.register(Registration::new("persistence"), {
        let path = config.persistence_path.clone();
        move || {
            Ok(Box::new(PersistenceComponent { path: path.clone() }) as Box<dyn Component>)
        }
    })?;

    container.register(Registration::new("scheduler").depends_on(["persistence"]), {
        let schedules = config.schedules.clone();
        let sessions = config.sessions.clone();
        move || {
            let mut scheduler = Scheduler::new(Arc::new(SystemClock));
            for schedule_config in &schedules {
                if let Some(schedule) = build_schedule(schedule_config) {
                    scheduler.register_schedule(schedule);
                }
            }
            for session in &sessions {
                if let Some(schedule_name) = &session.schedule {
                    scheduler.associate(SessionId::new(session.session_id.clone()), schedule_name.clone());
                }
            }
            Ok(Box::new(SchedulerComponent { scheduler }) as Box<dyn Component>)
        }
    })?;

    Ok(container)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "xlink gateway starting");

    let config_path = default_config_path();
    let config = match xlink_config::load_engine_config(&config_path) {
        Ok(config) => {
            info!(
                sessions = config.sessions.len(),
                path = %config_path.display(),
                "engine config loaded"
            );
            config
        }
        Err(e) => {
            error!(error = %e, path = %config_path.display(), "failed to load engine config");
            std::process::exit(1);
        }
    };

    let mut container = match build_container(&config) {
        Ok(container) => container,
        Err(e) => {
            error!(error = %e, "failed to register components");
            std::process::exit(1);
        }
    };

    if let Err(e) = container.initialize_all() {
        error!(error = %e, "component initialization failed");
        std::process::exit(1);
    }
    if let Err(e) = container.start("persistence") {
        error!(error = %e, "failed to start persistence");
        std::process::exit(1);
    }
    if let Err(e) = container.start("scheduler") {
        error!(error = %e, "failed to start scheduler");
        std::process::exit(1);
    }

    info!("xlink gateway initialized, starting the network event loop");
    run_engine(&config);
}

/// Builds the event loop and the per-channel driver, attaches every
/// configured session, and runs until the process is killed. This is the
/// control flow spec.md §2 describes: inbound bytes flow event loop ->
/// driver -> session -> (persisted + dispatched), outbound intents flow
/// session -> ring -> event loop, with persistence on both paths.
fn run_engine(config: &EngineConfig) {
    let mut event_loop = match EventLoop::new(1024) {
        Ok(e) => e,
        Err(e) => {
            error!(error = %e, "failed to create event loop");
            std::process::exit(1);
        }
    };

    let log = LogStore::new(
        config.persistence_path.clone(),
        config.persistence_max_log_file_size,
        true,
    );
    let mut driver = GatewayDriver::new(Arc::new(SystemClock), log);

    for session in &config.sessions {
        if session.initiator {
            if let Err(e) = driver.connect_session(&mut event_loop, session.clone()) {
                error!(session = %session.session_id, error = %e, "failed to attach session");
            }
        } else if let Err(e) = driver.listen_session(&mut event_loop, session.clone()) {
            error!(session = %session.session_id, error = %e, "failed to attach session");
        }
    }

    let poll_timeout = Duration::from_millis(100);
    let mut last_timer_tick = std::time::Instant::now();
    loop {
        if let Err(e) = event_loop.run_once(&mut driver, Some(poll_timeout)) {
            error!(error = %e, "event loop iteration failed");
        }
        driver.drain_outbound(&mut event_loop);
        driver.drain_disconnects(&mut event_loop);

        if last_timer_tick.elapsed() >= Duration::from_secs(1) {
            driver.on_timer_tick();
            last_timer_tick = std::time::Instant::now();
        }
    }
}
