use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TranscriptFormat {
    Text,
    Json,
    Srt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SummaryFormat {
    Markdown,
    /// Word-compatible HTML document
    Html,
    /// Standalone markmap mind map
    Mindmap,
    /// Markdown note written into --vault
    Obsidian,
}

#[derive(Parser)]
#[command(
    name = "bibi",
    about = "Summarize Bilibili, YouTube, Douyin and podcast videos",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// Show extraction method and metadata
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the transcript of a video
    Transcript {
        /// Video URL, id or local file (reads from stdin if omitted)
        url: Option<String>,

        /// Output format: text (default), json, srt
        #[arg(short, long, value_enum, default_value_t = TranscriptFormat::Text)]
        format: TranscriptFormat,

        /// Prefix each text line with its start time
        #[arg(short, long)]
        timestamps: bool,

        /// Write output to file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Ignore the transcript cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Summarize a video with the configured LLM
    Summarize {
        /// Video URL, id or local file (reads from stdin if omitted)
        url: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = SummaryFormat::Markdown)]
        format: SummaryFormat,

        /// Saved template id to summarize with
        #[arg(long)]
        template: Option<String>,

        /// Custom instructions, overriding the template
        #[arg(short, long)]
        prompt: Option<String>,

        /// Tie highlights to timestamps
        #[arg(short, long)]
        timestamps: bool,

        /// Output language (e.g. 中文, English)
        #[arg(short, long)]
        language: Option<String>,

        /// Your own OpenAI API key(s), comma separated
        #[arg(long)]
        key: Option<String>,

        /// LLM model, overriding the config file
        #[arg(long)]
        model: Option<String>,

        /// Write output to file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Obsidian vault directory for --format obsidian
        #[arg(long, default_value = ".")]
        vault: PathBuf,

        /// Ignore the transcript cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Run the HTTP API
    Serve {
        /// Port to listen on, overriding BIBI_PORT and the config file
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Summary history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Summary templates
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },

    /// Default summary preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },
}

#[derive(Subcommand)]
pub enum HistoryAction {
    /// List summarized videos, newest first
    List,
    /// Print the stored summary of a video
    Show { video_id: String },
    /// Remove one entry by its id
    Remove { id: String },
    /// Remove every entry
    Clear,
}

#[derive(Subcommand)]
pub enum TemplateAction {
    List,
    Add {
        #[arg(long)]
        name: String,
        /// Instructions sent in place of the structured summary prompt
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        description: Option<String>,
    },
    Remove { id: String },
}

#[derive(Subcommand)]
pub enum PrefsAction {
    Show,
    Reset,
}
