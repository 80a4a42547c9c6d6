use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "tutorcall")]
#[command(author, version, about = "Recurring lesson scheduler with cascading reschedules and reminders")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory holding calls.json and catalog.json
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Config file to use instead of the platform default
    #[arg(long, global = true, env = "TUTORCALL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, env = "TUTORCALL_FORMAT")]
    pub format: Option<OutputFormat>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Courses, batches and people
    #[command(subcommand)]
    Catalog(CatalogCommands),

    /// Create and change lesson schedules
    #[command(subcommand)]
    Schedule(ScheduleCommands),

    /// Run one sweep tick now
    #[command(subcommand)]
    Sweep(SweepCommands),

    /// Run the reminder and status sweeps until interrupted
    Daemon,

    /// Show or initialise the config file
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Clone)]
pub enum CatalogCommands {
    /// Replace the catalog with a YAML or JSON file
    Import {
        /// Path to the catalog file (.yaml, .yml or .json)
        file: PathBuf,
    },

    /// Show courses, batches and people
    Show,
}

/// How the meeting link is chosen.
#[derive(Args, Clone, Debug, Default)]
#[group(multiple = false)]
pub struct MeetingArgs {
    /// Create a Zoom meeting
    #[arg(long)]
    pub zoom: bool,

    /// Use an existing meeting link
    #[arg(long, value_name = "URL")]
    pub link: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct CreateScheduleArgs {
    /// Batch to schedule
    #[arg(long)]
    pub batch: String,

    /// Course the batch follows
    #[arg(long)]
    pub course: String,

    #[command(flatten)]
    pub meeting: MeetingArgs,

    /// First date (YYYY-MM-DD)
    #[arg(long)]
    pub start_date: String,

    /// Start time (HH:mm, 24-hour)
    #[arg(long)]
    pub start_time: String,

    /// Weekdays, comma separated (e.g. mon,wed)
    #[arg(long, default_value = "")]
    pub days: String,

    /// Repeat weekly on --days, one lesson per date
    #[arg(long)]
    pub repeat: bool,

    /// Call length in minutes
    #[arg(long)]
    pub duration: u32,

    /// IANA timezone (defaults to config default_timezone)
    #[arg(long)]
    pub tz: Option<String>,

    /// Only schedule these lesson ids
    #[arg(long, value_delimiter = ',')]
    pub lessons: Option<Vec<String>>,
}

#[derive(Args, Clone, Debug)]
pub struct RescheduleArgs {
    /// Call id
    pub id: Uuid,

    /// Lesson the call covers
    #[arg(long)]
    pub lesson: String,

    /// New date (YYYY-MM-DD)
    #[arg(long)]
    pub date: String,

    /// New start time (HH:mm)
    #[arg(long)]
    pub time: String,

    /// New IANA timezone (defaults to the call's)
    #[arg(long)]
    pub tz: Option<String>,

    /// Weekdays for the chain, comma separated (defaults to the call's)
    #[arg(long)]
    pub days: Option<String>,

    /// Keep the call part of a weekly chain; `--repeat=false` detaches it (defaults to the call's)
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub repeat: Option<bool>,

    #[command(flatten)]
    pub meeting: MeetingArgs,

    /// Keep the current meeting link
    #[arg(long, conflicts_with_all = ["zoom", "link"])]
    pub keep_link: bool,
}

#[derive(Subcommand, Clone)]
pub enum ScheduleCommands {
    /// Create one call per lesson for a batch
    Create(CreateScheduleArgs),

    /// Move one call to a new date and time
    Reschedule(RescheduleArgs),

    /// Cancel a call and shift the rest of its chain
    Cancel {
        /// Call id
        id: Uuid,

        /// Lesson the call covers
        #[arg(long)]
        lesson: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// List calls of a batch
    List {
        #[arg(long)]
        batch: String,
    },

    /// Show one call
    Show {
        /// Call id
        id: Uuid,
    },
}

#[derive(Subcommand, Clone)]
pub enum SweepCommands {
    /// Send due reminders
    Reminders {
        /// Evaluate as of this instant (RFC 3339) instead of now
        #[arg(long)]
        now: Option<String>,
    },

    /// Complete calls that have ended
    Status {
        /// Evaluate as of this instant (RFC 3339) instead of now
        #[arg(long)]
        now: Option<String>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Display as formatted table
    #[default]
    Table,
    /// Display as JSON
    Json,
    /// Display as YAML
    Yaml,
}
