use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand};
use planner::config::PlannerConfig;
use planner::import::{ImportOptions, ImportPreview, persist_import, preview_import};
use planner::live::LiveSchedule;
use planner::model::UserId;
use planner::projection::{WeekGrid, WeekWindow, shift_pivot};
use planner::storage::JsonFileStore;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Parser)]
#[command(
    name = "planner",
    about = "Import markdown week plans and render the weekly schedule grid",
    version
)]
struct Cli {
    /// Enable verbose logging for debugging.
    #[arg(long, global = true)]
    verbose: bool,
    /// JSON settings file (grid layout, import options, defaults).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Parse a markdown plan and print what an import would create.
    Parse(ParseArgs),

    /// Preview a markdown plan and, with --confirm, write it to the store.
    Import(ImportArgs),

    /// Render one week of the stored schedule.
    Week(WeekArgs),
}

#[derive(Debug, Args)]
struct ParseArgs {
    /// Markdown (.md) file to parse.
    file: PathBuf,
    /// Emit JSON instead of a human-readable summary.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct ImportArgs {
    /// Markdown (.md) file to import.
    file: PathBuf,
    /// JSON store file. Falls back to `storePath` from the config.
    #[arg(long)]
    store: Option<PathBuf>,
    /// User the records belong to. Falls back to `defaultUser` from the config.
    #[arg(long)]
    user: Option<String>,
    /// Any date in the week tasks are due in. Defaults to today.
    #[arg(long)]
    week: Option<NaiveDate>,
    /// Write the previewed records; without it only the preview is shown.
    #[arg(long)]
    confirm: bool,
    /// Delete this import's earlier records if a later write fails.
    #[arg(long)]
    rollback: bool,
}

#[derive(Debug, Args)]
struct WeekArgs {
    /// JSON store file. Falls back to `storePath` from the config.
    #[arg(long)]
    store: Option<PathBuf>,
    /// User whose schedule to show. Falls back to `defaultUser` from the config.
    #[arg(long)]
    user: Option<String>,
    /// Any date in the week to show. Defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,
    /// Weeks to move from --date (negative goes back).
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    offset: i32,
    /// Emit the projected grid as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    let config = match &cli.config {
        Some(path) => PlannerConfig::load(path).with_context(|| format!("loading {:?}", path))?,
        None => PlannerConfig::default(),
    };
    debug!(?config, "effective configuration");
    match cli.command {
        Commands::Parse(args) => handle_parse(args),
        Commands::Import(args) => handle_import(args, &config),
        Commands::Week(args) => handle_week(args, &config),
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let fallback = if verbose { Level::DEBUG } else { Level::WARN };
    let level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(fallback);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("installing log subscriber")
}

fn handle_parse(args: ParseArgs) -> Result<()> {
    let ParseArgs { file, json } = args;
    let preview = read_preview(&file)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
    } else {
        print!("{}", render_preview_text(&preview));
    }
    Ok(())
}

fn handle_import(args: ImportArgs, config: &PlannerConfig) -> Result<()> {
    let ImportArgs {
        file,
        store,
        user,
        week,
        confirm,
        rollback,
    } = args;

    let preview = read_preview(&file)?;
    print!("{}", render_preview_text(&preview));
    if !confirm {
        println!("Re-run with --confirm to import.");
        return Ok(());
    }

    let user = resolve_user(user, config)?;
    let store_path = resolve_store_path(store, config)?;
    let window = WeekWindow::containing(week.unwrap_or_else(today));
    let options = ImportOptions {
        rollback_on_failure: rollback || config.import.rollback_on_failure,
    };

    let mut store =
        JsonFileStore::open(&store_path).with_context(|| format!("opening {:?}", store_path))?;
    let summary = persist_import(&mut store, &user, &preview.schedule, &window, options)
        .with_context(|| format!("importing {:?}", file))?;
    info!(records = summary.record_ids.len(), store = ?store.path(), "import finished");
    println!("Successfully imported {}!", summary.counts);
    Ok(())
}

fn handle_week(args: WeekArgs, config: &PlannerConfig) -> Result<()> {
    let WeekArgs {
        store,
        user,
        date,
        offset,
        json,
    } = args;

    let user = resolve_user(user, config)?;
    let store_path = resolve_store_path(store, config)?;
    let mut store =
        JsonFileStore::open(&store_path).with_context(|| format!("opening {:?}", store_path))?;

    let now = Local::now().naive_local();
    let window = WeekWindow::containing(shift_pivot(date.unwrap_or(now.date()), offset));
    let live = LiveSchedule::attach(&mut store, &user)
        .with_context(|| format!("reading schedule for {user}"))?;
    let grid = live.week(&window, &config.grid, now);
    if !live.detach(&mut store) {
        warn!(%user, "schedule subscription was already gone");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&grid)?);
    } else {
        print!("{}", render_week_text(&grid, now));
    }
    Ok(())
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn read_preview(path: &Path) -> Result<ImportPreview> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let bytes = fs::read(path).with_context(|| format!("reading {:?}", path))?;
    preview_import(&name, &bytes).with_context(|| format!("previewing {:?}", path))
}

fn resolve_user(flag: Option<String>, config: &PlannerConfig) -> Result<UserId> {
    flag.or_else(|| config.default_user.clone())
        .filter(|u| !u.trim().is_empty())
        .map(UserId)
        .context("no user given; pass --user or set defaultUser in the config")
}

fn resolve_store_path(flag: Option<PathBuf>, config: &PlannerConfig) -> Result<PathBuf> {
    flag.or_else(|| config.store_path.clone())
        .context("no store given; pass --store or set storePath in the config")
}

fn render_preview_text(preview: &ImportPreview) -> String {
    let mut out = format!("Found {}\n", preview.counts);
    for block in &preview.schedule.blocks {
        out.push_str(&format!(
            "  {}-{}  {} ({})\n",
            block.start_time, block.end_time, block.title, block.color
        ));
    }
    for focus in &preview.schedule.daily_focus {
        let day = planner::model::WEEKDAY_SHORT_NAMES
            .get(usize::from(focus.day_index))
            .copied()
            .unwrap_or("?");
        out.push_str(&format!("  {day} focus: {}\n", focus.title));
    }
    for task in &preview.schedule.tasks {
        out.push_str(&format!("  [ ] {}\n", task.text));
    }
    out
}

fn render_week_text(grid: &WeekGrid, now: NaiveDateTime) -> String {
    let mut out = format!("{}\n", grid.month_label);
    for day in &grid.days {
        let marker = if day.is_today { " (today)" } else { "" };
        out.push_str(&format!("\n{} {}{}\n", day.weekday, day.date.format("%d"), marker));
        if let Some(focus) = &day.focus {
            out.push_str(&format!("  focus: {}\n", focus.title));
        }
        if let (true, Some(offset)) = (day.is_today, grid.now_offset) {
            out.push_str(&format!("   now  {} (line at {:.0}px)\n", now.format("%H:%M"), offset));
        }
        for slot in &day.slots {
            for entry in &slot.entries {
                out.push_str(&format!(
                    "  {:>4}  {}-{} {}\n",
                    slot.label, entry.start_time, entry.end_time, entry.title
                ));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use planner::import::preview_text;
    use planner::storage::{SCHEDULE_COLLECTION, ScheduleStore, TASKS_COLLECTION};

    const PLAN: &str = "| Block | Time | What |
|---|---|---|
| Morning | 9:00–12:00 | Deep work |

## Monday — Setup & Learn
- [ ] Buy domain name
";

    #[test]
    fn user_flag_wins_over_config() {
        let config = PlannerConfig {
            default_user: Some("from-config".into()),
            ..PlannerConfig::default()
        };
        assert_eq!(
            resolve_user(Some("flag".into()), &config).expect("user").as_str(),
            "flag"
        );
        assert_eq!(
            resolve_user(None, &config).expect("user").as_str(),
            "from-config"
        );
        assert!(resolve_user(None, &PlannerConfig::default()).is_err());
        assert!(resolve_user(Some("  ".into()), &PlannerConfig::default()).is_err());
    }

    #[test]
    fn store_path_requires_flag_or_config() {
        assert!(resolve_store_path(None, &PlannerConfig::default()).is_err());
        let config = PlannerConfig {
            store_path: Some(PathBuf::from("planner.json")),
            ..PlannerConfig::default()
        };
        assert_eq!(
            resolve_store_path(None, &config).expect("path"),
            PathBuf::from("planner.json")
        );
    }

    #[test]
    fn read_preview_checks_extension() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let md = tmp.path().join("week.md");
        let txt = tmp.path().join("week.txt");
        fs::write(&md, PLAN).expect("write md");
        fs::write(&txt, PLAN).expect("write txt");

        let preview = read_preview(&md).expect("preview");
        assert_eq!(preview.counts.total(), 3);
        assert!(read_preview(&txt).is_err());
    }

    #[test]
    fn import_then_week_round_trip_through_file_store() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let plan = tmp.path().join("week.md");
        let store_path = tmp.path().join("store.json");
        fs::write(&plan, PLAN).expect("write plan");

        let config = PlannerConfig::default();
        handle_import(
            ImportArgs {
                file: plan,
                store: Some(store_path.clone()),
                user: Some("me".into()),
                week: NaiveDate::from_ymd_opt(2026, 10, 21),
                confirm: true,
                rollback: false,
            },
            &config,
        )
        .expect("import");

        let mut store = JsonFileStore::open(&store_path).expect("open");
        let user = UserId::from("me");
        assert_eq!(store.snapshot(&user, SCHEDULE_COLLECTION).expect("schedule").len(), 2);
        assert_eq!(store.snapshot(&user, TASKS_COLLECTION).expect("tasks").len(), 1);

        let live = LiveSchedule::attach(&mut store, &user).expect("attach");
        let monday = NaiveDate::from_ymd_opt(2026, 10, 19).expect("date");
        let now = monday.and_hms_opt(10, 30, 0).expect("time");
        let grid = live.week(&WeekWindow::containing(monday), &config.grid, now);
        assert!(live.detach(&mut store));
        let text = render_week_text(&grid, now);
        assert!(text.starts_with("October 2026\n"));
        assert!(text.contains("Mon 19 (today)"));
        assert!(text.contains("focus: Setup & Learn"));
        assert!(text.contains(" 9AM  09:00-12:00 Deep work"));
        assert!(text.contains("now  10:30 (line at 200px)"));

        let next_week = WeekWindow::containing(monday).shifted(1);
        let later = render_week_text(&live_week(&mut store, &user, &next_week, now), now);
        assert!(!later.contains("now"));
        assert!(!later.contains("(today)"));
    }

    fn live_week(
        store: &mut JsonFileStore,
        user: &UserId,
        window: &WeekWindow,
        now: NaiveDateTime,
    ) -> WeekGrid {
        let live = LiveSchedule::attach(store, user).expect("attach");
        let grid = live.week(window, &PlannerConfig::default().grid, now);
        assert!(live.detach(store));
        grid
    }

    #[test]
    fn unconfirmed_import_writes_nothing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let plan = tmp.path().join("week.md");
        let store_path = tmp.path().join("store.json");
        fs::write(&plan, PLAN).expect("write plan");

        handle_import(
            ImportArgs {
                file: plan,
                store: Some(store_path.clone()),
                user: Some("me".into()),
                week: None,
                confirm: false,
                rollback: false,
            },
            &PlannerConfig::default(),
        )
        .expect("preview only");
        assert!(!store_path.exists());
    }

    #[test]
    fn preview_text_lists_items() {
        let preview = preview_text(PLAN).expect("preview");
        let text = render_preview_text(&preview);
        assert!(text.starts_with("Found 1 recurring blocks, 1 daily focuses, 1 tasks\n"));
        assert!(text.contains("09:00-12:00  Deep work (blue)"));
        assert!(text.contains("Mon focus: Setup & Learn"));
        assert!(text.contains("[ ] Buy domain name"));
    }
}
