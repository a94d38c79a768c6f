use chrono::{DateTime, Local, NaiveDateTime, TimeDelta, TimeZone, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::{Context, Result, eyre};
use std::io::Write;
use std::path::{Path, PathBuf};
use timesup::{ActionItem, ChangeNotifier, Countdown, ItemFilter, LiveClock, Settings, Status, Store, clock};
use tracing::{Level, debug};

#[derive(Parser)]
#[command(name = "timesup")]
#[command(about = "TimesUp - action items, countdowns and a live clock")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Directory holding the item store (default: <data dir>/timesup)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Settings file (default: <config dir>/timesup/settings.yml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log more (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new action item
    Add {
        /// Due date: RFC 3339, "YYYY-MM-DD HH:MM" (local time) or relative like +2h, -30m, +1d
        due: String,

        #[arg(short, long, default_value = "")]
        title: String,

        #[arg(short, long, default_value = "")]
        link: String,
    },

    /// Change an existing action item
    Edit {
        id: String,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        link: Option<String>,

        #[arg(short, long)]
        due: Option<String>,
    },

    /// Delete action items
    Rm {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// List action items, earliest due first
    List {
        /// all, ongoing or ended
        #[arg(short, long, default_value = "all")]
        filter: ItemFilter,
    },

    /// Show one action item
    Show { id: String },

    /// Show the countdown to the next ongoing item
    Next,

    /// Run the live clock
    Clock {
        /// Stop after this many ticks
        #[arg(short, long)]
        ticks: Option<u64>,
    },

    /// Rebuild the index from the journal
    Sync,

    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the current settings
    Show,

    /// Set one setting and save
    Set { key: String, value: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let settings_path = cli
        .config
        .clone()
        .or_else(Settings::default_path)
        .ok_or_else(|| eyre!("Could not determine config directory"))?;
    let mut settings = Settings::load(&settings_path)
        .wrap_err_with(|| format!("Failed to load settings from {}", settings_path.display()))?;

    if let Commands::Settings { action } = cli.command {
        return run_settings(action, &mut settings, &settings_path);
    }

    let data_dir = cli
        .data_dir
        .clone()
        .or_else(Store::default_path)
        .ok_or_else(|| eyre!("Could not determine data directory"))?;

    let notifier = ChangeNotifier::new();
    let _subscription = notifier.subscribe(|event| debug!(?event, "Store changed"));
    let mut store = Store::open_with_notifier(&data_dir, notifier)
        .wrap_err_with(|| format!("Failed to open store at {}", data_dir.display()))?;

    match cli.command {
        Commands::Add { due, title, link } => {
            let due = parse_due(&due, Utc::now())?;
            let id = store.create(title, link, due).wrap_err("Failed to add item")?;
            println!("{}", id);
        }
        Commands::Edit { id, title, link, due } => {
            let item = store.get(&id)?.ok_or_else(|| eyre!("No action item with id {}", id))?;
            let due = match due {
                Some(due) => parse_due(&due, Utc::now())?,
                None => item.due_date,
            };
            store
                .update(
                    &id,
                    title.unwrap_or(item.main_title),
                    link.unwrap_or(item.link),
                    due,
                )
                .wrap_err("Failed to save item")?;
            println!("Updated {}", id);
        }
        Commands::Rm { ids } => {
            let removed = store.delete(&ids).wrap_err("Failed to delete items")?;
            println!("Deleted {} of {} item(s)", removed.len(), ids.len());
        }
        Commands::List { filter } => {
            let now = Utc::now();
            let items = store.list_at(filter, now)?;
            if items.is_empty() {
                println!("No {} items", filter);
            }
            for item in &items {
                print_item(item, now, &settings);
            }
        }
        Commands::Show { id } => {
            let item = store.get(&id)?.ok_or_else(|| eyre!("No action item with id {}", id))?;
            print_item(&item, Utc::now(), &settings);
        }
        Commands::Next => {
            let now = Utc::now();
            match store.next_ongoing(now)?.and_then(|item| Countdown::until(&item, now)) {
                Some(countdown) => println!("{} in {}", countdown.title.bold(), countdown),
                None => println!("Nothing ongoing"),
            }
        }
        Commands::Clock { ticks } => run_clock(&store, &settings, ticks)?,
        Commands::Sync => {
            println!("Syncing index from journal...");
            store.sync()?;
            println!("Sync complete");
        }
        Commands::Settings { .. } => unreachable!("handled before opening the store"),
    }

    Ok(())
}

fn run_settings(action: Option<SettingsAction>, settings: &mut Settings, path: &Path) -> Result<()> {
    match action.unwrap_or(SettingsAction::Show) {
        SettingsAction::Show => {
            print!("{}", serde_yaml::to_string(settings)?);
        }
        SettingsAction::Set { key, value } => {
            settings.set(&key, &value)?;
            settings
                .save(path)
                .wrap_err_with(|| format!("Failed to save settings to {}", path.display()))?;
            println!("{} = {}", key, value);
        }
    }
    Ok(())
}

fn run_clock(store: &Store, settings: &Settings, ticks: Option<u64>) -> Result<()> {
    let next = if settings.countdown_enabled {
        store.next_ongoing(Utc::now())?
    } else {
        None
    };

    let mut live = LiveClock::new(settings.tick_interval());
    let format = settings.clock_format;
    let mut stdout = std::io::stdout();

    clock::run(&mut live, ticks, |tick| {
        let countdown = next
            .as_ref()
            .and_then(|item| Countdown::until(item, tick.at))
            .map(|c| format!("   {} in {}", c.title, c))
            .unwrap_or_default();
        // A failed terminal write only loses one frame
        let _ = write!(
            stdout,
            "\r{} {}{}",
            tick.day_text(&Local).bold(),
            tick.time_text(&Local, format),
            countdown
        );
        let _ = stdout.flush();
    });
    println!();

    Ok(())
}

fn print_item(item: &ActionItem, now: DateTime<Utc>, settings: &Settings) {
    let status = match item.status_at(now) {
        Status::Ongoing => format!("{:<8}", Status::Ongoing).green(),
        Status::Ended => format!("{:<8}", Status::Ended).red(),
    };
    let mut due = String::new();
    if std::fmt::Write::write_fmt(
        &mut due,
        format_args!("{}", item.due_date.with_timezone(&Local).format(&settings.date_format)),
    )
    .is_err()
    {
        due = item.due_date.with_timezone(&Local).to_rfc3339();
    }

    println!("{} {} {}  {}", item.id.dimmed(), status, due, item.main_title.bold());
    if !item.link.is_empty() {
        println!("    {}", item.link.blue());
    }
}

/// Parse a due date given on the command line
fn parse_due(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();

    if let Some(offset) = parse_relative(input) {
        return now
            .checked_add_signed(offset)
            .ok_or_else(|| eyre!("Due date '{}' is out of range", input));
    }

    if let Ok(at) = DateTime::parse_from_rfc3339(input) {
        return Ok(at.with_timezone(&Utc));
    }

    for pattern in ["%Y-%m-%d %H:%M", "%Y/%m/%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, pattern) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|at| at.with_timezone(&Utc))
                .ok_or_else(|| eyre!("{} does not exist in the local time zone", input));
        }
    }

    Err(eyre!(
        "Unrecognised due date '{}' (try RFC 3339, \"YYYY-MM-DD HH:MM\" or +2h)",
        input
    ))
}

/// `+90m`, `-1h`, `+2d`, `+30s`
fn parse_relative(input: &str) -> Option<TimeDelta> {
    let (negative, rest) = match input.chars().next()? {
        '+' => (false, &input[1..]),
        '-' => (true, &input[1..]),
        _ => return None,
    };
    let unit = rest.chars().last()?;
    let amount: i64 = rest[..rest.len() - unit.len_utf8()].parse().ok()?;

    let delta = match unit {
        's' => TimeDelta::try_seconds(amount)?,
        'm' => TimeDelta::try_minutes(amount)?,
        'h' => TimeDelta::try_hours(amount)?,
        'd' => TimeDelta::try_days(amount)?,
        _ => return None,
    };
    Some(if negative { -delta } else { delta })
}
