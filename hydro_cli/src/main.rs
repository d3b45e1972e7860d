use clap::{Args, Parser, Subcommand};
use hydro_core::export::{self, ExportFormat};
use hydro_core::*;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "hydro")]
#[command(about = "Smart bottle hydration tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Live session with a bottle or mock intake (default)
    Watch(WatchArgs),

    /// Show the daily goal for a body weight
    Goal {
        /// Body weight in kilograms
        #[arg(long, allow_hyphen_values = true, value_parser = parse_weight)]
        weight: f64,
    },

    /// Show progress, remaining volume and prediction for an intake total
    Progress {
        /// Cumulative intake in milliliters
        #[arg(long)]
        intake: u32,

        /// Body weight in kilograms (defaults to the configured profile)
        #[arg(long, allow_hyphen_values = true, value_parser = parse_weight)]
        weight: Option<f64>,
    },

    /// Decode one raw intake notification given as hex
    Decode {
        /// Payload bytes, e.g. 2c010000
        payload: String,
    },
}

#[derive(Args, Default)]
struct WatchArgs {
    /// Start in mock mode
    #[arg(long, conflicts_with = "connect")]
    mock: bool,

    /// Connect to a bottle on start
    #[arg(long)]
    connect: bool,

    /// Body weight in kilograms for this session
    #[arg(long, allow_hyphen_values = true, value_parser = parse_weight)]
    weight: Option<f64>,

    /// Bottle name or address to pick during discovery
    #[arg(long)]
    device: Option<String>,

    /// Exit after this many readings
    #[arg(long)]
    max_readings: Option<usize>,

    /// Print events and the final snapshot as JSON
    #[arg(long)]
    json: bool,

    /// Write an export when the session ends (.csv, *daily.csv or .json)
    #[arg(long)]
    export: Option<PathBuf>,

    /// Mock tick period in milliseconds
    #[arg(long, hide = true, value_parser = clap::value_parser!(u64).range(1..))]
    mock_period_ms: Option<u64>,

    /// Seed for the mock sip sequence
    #[arg(long, hide = true)]
    mock_seed: Option<u64>,
}

/// Any finite number of kilograms. Zero or less means no goal.
fn parse_weight(value: &str) -> std::result::Result<f64, String> {
    let weight_kg: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("Invalid weight: {}", value))?;
    if !weight_kg.is_finite() {
        return Err(format!("Weight must be a finite number: {}", value));
    }
    Ok(weight_kg)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    hydro_core::logging::init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Some(Commands::Watch(args)) => cmd_watch(args, config).await,
        Some(Commands::Goal { weight }) => cmd_goal(weight),
        Some(Commands::Progress { intake, weight }) => cmd_progress(intake, weight, &config),
        Some(Commands::Decode { payload }) => cmd_decode(&payload),
        None => {
            // Default to "watch"
            cmd_watch(WatchArgs::default(), config).await
        }
    }
}

fn cmd_goal(weight_kg: f64) -> Result<()> {
    let goal = daily_goal_ml(weight_kg);
    if goal == 0 {
        println!("{}", Prediction::NoGoal);
    } else {
        println!("Daily goal: {} ml", goal);
    }
    Ok(())
}

fn cmd_progress(intake_ml: u32, weight_kg: Option<f64>, config: &Config) -> Result<()> {
    let mut profile = config.profile.clone();
    if let Some(weight_kg) = weight_kg {
        profile.weight_kg = weight_kg;
    }

    let summary = GoalSummary::compute(&profile, intake_ml);
    println!("Intake:    {} ml", summary.intake_ml);
    println!("Goal:      {} ml", summary.goal_ml);
    println!("Progress:  {}%", summary.progress_percent);
    println!("Remaining: {} ml", summary.remaining_ml);
    println!("{}", summary.prediction_text);
    Ok(())
}

fn cmd_decode(payload: &str) -> Result<()> {
    let bytes = hex::decode(payload.trim())
        .map_err(|e| Error::Other(format!("Invalid hex payload: {}", e)))?;
    let intake_ml = decode(&bytes)?;
    println!("{} ml", intake_ml);
    Ok(())
}

// ============================================================================
// Watch
// ============================================================================

#[cfg(not(feature = "bluetooth"))]
async fn open_transport(_config: &Config, device: Option<String>) -> UnavailableTransport {
    if device.is_some() {
        tracing::warn!("--device ignored: built without Bluetooth support");
    }
    UnavailableTransport
}

#[cfg(feature = "bluetooth")]
async fn open_transport(config: &Config, device: Option<String>) -> BtleTransport {
    let scan_window = config.link.scan_window();
    match device {
        Some(name) => BtleTransport::new(NamedDevice(name), scan_window).await,
        None => BtleTransport::new(FirstDevice, scan_window).await,
    }
}

/// Read stdin lines on a plain thread; a blocked read must not hold up
/// runtime shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn cmd_watch(args: WatchArgs, mut config: Config) -> Result<()> {
    if let Some(weight_kg) = args.weight {
        config.profile.weight_kg = weight_kg;
    }

    let mut mock = MockGenerator::new(&config.mock);
    if let Some(ms) = args.mock_period_ms {
        mock = mock.with_period(Duration::from_millis(ms));
    }
    if let Some(seed) = args.mock_seed {
        mock = mock.with_seed(seed);
    }

    let transport = open_transport(&config, args.device.clone()).await;
    let tracker = Tracker::new(transport, &config).with_mock_generator(mock);

    let mut session = Session {
        tracker,
        json: args.json,
        max_readings: args.max_readings,
        accepted: 0,
        last_status: String::new(),
        export_dir: config.export.dir.clone(),
    };
    session.print_status();

    if args.mock {
        session.set_mock(true).await;
    }
    if args.connect {
        session.connect().await;
    }

    let mut lines = spawn_stdin_reader();
    let mut stdin_open = true;

    while !session.done() {
        tokio::select! {
            event = session.tracker.next_event() => match event {
                Some(event) => session.handle_event(event).await,
                None => break,
            },
            line = lines.recv(), if stdin_open => match line {
                Some(line) => {
                    if session.run_command(&line).await == Flow::Quit {
                        break;
                    }
                }
                None => stdin_open = false,
            },
            _ = ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }

        // Nothing left to wait for once input is gone and no source runs
        if !stdin_open && session.tracker.active_source().is_none() {
            break;
        }
    }

    // Print what was delivered before the sources go away
    session.flush().await;
    session.tracker.disconnect().await;
    session.tracker.set_mock_mode(false).await?;
    session.flush().await;

    if let Some(path) = &args.export {
        session.export_to(path)?;
    }
    session.print_summary()
}

#[derive(PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

struct Session<T: BleTransport> {
    tracker: Tracker<T>,
    json: bool,
    max_readings: Option<usize>,
    accepted: usize,
    last_status: String,
    export_dir: PathBuf,
}

impl<T: BleTransport> Session<T> {
    fn done(&self) -> bool {
        self.max_readings.is_some_and(|max| self.accepted >= max)
    }

    async fn handle_event(&mut self, event: IntakeEvent) {
        if let Some(reading) = self.tracker.apply(event).await {
            self.accepted += 1;
            self.print_reading(&reading);
        }
        self.print_status();
    }

    /// Apply and print everything already queued
    async fn flush(&mut self) {
        while let Some(event) = self.tracker.try_next_event() {
            self.handle_event(event).await;
        }
    }

    fn print_status(&mut self) {
        if self.tracker.status() == self.last_status {
            return;
        }
        self.last_status = self.tracker.status().to_string();

        if self.json {
            let line = serde_json::json!({
                "type": "status",
                "state": self.tracker.connection_state(),
                "status": self.last_status,
            });
            println!("{}", line);
        } else {
            println!("Status: {}", self.last_status);
        }
    }

    fn print_reading(&self, reading: &IntakeReading) {
        let summary = self.tracker.goal_summary();
        if self.json {
            let line = serde_json::json!({
                "type": "reading",
                "timestamp": reading.timestamp,
                "intake_ml": reading.intake_ml,
                "progress_percent": summary.progress_percent,
            });
            println!("{}", line);
        } else {
            let local = reading.timestamp.with_timezone(&chrono::Local);
            println!(
                "{}  {} ml  ({}% of {} ml)",
                local.format("%H:%M:%S"),
                reading.intake_ml,
                summary.progress_percent,
                summary.goal_ml
            );
        }
    }

    async fn set_mock(&mut self, enabled: bool) {
        if !enabled {
            self.flush().await;
        }
        if let Err(e) = self.tracker.set_mock_mode(enabled).await {
            eprintln!("{}", e);
        }
        self.print_status();
    }

    async fn connect(&mut self) {
        let result = self.tracker.connect_or_abort(ctrl_c()).await;
        self.flush().await;
        match result {
            Ok(()) | Err(Error::Link(LinkError::UserCancelled)) => {}
            Err(e) => eprintln!("Connect failed: {}", e),
        }
    }

    async fn run_command(&mut self, line: &str) -> Flow {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Flow::Continue;
        };
        let argument = words.next();

        match (command.to_lowercase().as_str(), argument) {
            ("quit" | "exit" | "q", _) => return Flow::Quit,
            ("connect", _) => self.connect().await,
            ("disconnect", _) => {
                self.flush().await;
                self.tracker.disconnect().await;
                self.flush().await;
            }
            ("mock", Some("on")) => self.set_mock(true).await,
            ("mock", Some("off")) => self.set_mock(false).await,
            ("weight", Some(value)) => match parse_weight(value) {
                Ok(weight_kg) => {
                    self.tracker.set_weight_kg(weight_kg);
                    println!("{}", self.tracker.goal_summary().prediction_text);
                }
                Err(e) => eprintln!("{}", e),
            },
            ("age", Some(value)) => match value.parse::<u32>() {
                Ok(age) => self.tracker.set_age(Some(age)),
                Err(_) => eprintln!("Invalid age: {}", value),
            },
            ("activity", Some(value)) => match value.parse::<ActivityLevel>() {
                Ok(level) => self.tracker.set_activity(level),
                Err(e) => eprintln!("{}", e),
            },
            ("status", _) => self.print_dashboard(),
            ("recent", count) => {
                let count = count.and_then(|c| c.parse().ok()).unwrap_or(5);
                for reading in self.tracker.ledger().recent(count) {
                    let local = reading.timestamp.with_timezone(&chrono::Local);
                    println!("  {}  {} ml", local.format("%Y-%m-%d %H:%M:%S"), reading.intake_ml);
                }
            }
            ("export", path) => {
                let path = path
                    .map(PathBuf::from)
                    .unwrap_or_else(|| {
                        self.export_dir
                            .join(export::default_file_name(chrono::Local::now()))
                    });
                if let Err(e) = self.export_to(&path) {
                    eprintln!("Export failed: {}", e);
                }
            }
            ("help", _) => print_help(),
            _ => eprintln!("Unknown command: {} (try 'help')", line.trim()),
        }
        Flow::Continue
    }

    fn export_to(&self, path: &std::path::Path) -> Result<()> {
        let dashboard = self.tracker.dashboard();
        let format = export::export(self.tracker.ledger(), &dashboard, path)?;
        let what = match format {
            ExportFormat::Readings => "readings",
            ExportFormat::Daily => "daily totals",
            ExportFormat::Json => "snapshot",
        };
        if !self.json {
            println!("Exported {} to {}", what, path.display());
        }
        Ok(())
    }

    fn print_dashboard(&self) {
        let dashboard = self.tracker.dashboard();
        if self.json {
            if let Ok(line) = serde_json::to_string(&dashboard) {
                println!("{}", line);
            }
            return;
        }

        println!("Status:   {}", dashboard.status);
        println!("Goal:     {}", dashboard.goal.badge());
        println!(
            "Intake:   {} ml / {} ml ({}%)",
            dashboard.intake_ml, dashboard.goal.goal_ml, dashboard.goal.progress_percent
        );
        println!("          {}", dashboard.goal.prediction_text);
        match dashboard.last_synced {
            Some(at) => println!(
                "Synced:   {}",
                at.with_timezone(&chrono::Local).format("%H:%M:%S")
            ),
            None => println!("Synced:   never"),
        }

        let history = &dashboard.history;
        println!("Records:  {}", history.total_records);
        println!("Average:  {} ml", history.average_ml);
        println!("Highest:  {} ml", history.highest_ml);
        if !history.week.is_empty() {
            println!("Last {} days:", WEEK_DAYS);
            for bucket in &history.week {
                println!("  {}  {} ml", bucket.day_key(), bucket.ml);
            }
        }
    }

    fn print_summary(&self) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(&self.tracker.dashboard())?);
            return Ok(());
        }

        let summary = self.tracker.goal_summary();
        println!();
        println!(
            "Session ended: {} reading(s), {} ml of {} ml ({}%)",
            self.tracker.ledger().len(),
            summary.intake_ml,
            summary.goal_ml,
            summary.progress_percent
        );
        println!("{}", summary.prediction_text);
        Ok(())
    }
}

fn print_help() {
    println!("Commands:");
    println!("  connect            find and connect to a bottle");
    println!("  disconnect         drop the bottle link");
    println!("  mock on|off        toggle simulated intake");
    println!("  weight KG          set body weight");
    println!("  age YEARS          set age");
    println!("  activity LEVEL     low, moderate or high");
    println!("  status             show the dashboard");
    println!("  recent [N]         last N readings");
    println!("  export [PATH]      write readings (.csv), daily totals (*daily.csv) or a snapshot (.json)");
    println!("  quit               end the session");
}
