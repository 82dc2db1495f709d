use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use bibi::config::Config;
use bibi::events::Progress;
use bibi::export::{self, ExportFormat};
use bibi::fetch::{FetchContext, NoTranscript, fetch_subtitle};
use bibi::store::{NewTemplate, NewVideoHistory, Store};
use bibi::{Transcript, VideoConfig, keys, link, media, notes, output, summarize, timestamp};
use eyre::{Result, bail, eyre};
use log::{debug, info};

mod cli;

use cli::{Cli, HistoryAction, PrefsAction, SummaryFormat, TemplateAction, TranscriptFormat};

/// Log lines go to the file and, when serving, to stderr as well
struct Tee {
    file: std::fs::File,
    stderr: bool,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.stderr {
            io::stderr().write_all(buf)?;
        }
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn setup_logging(to_stderr: bool) -> Result<()> {
    let log_dir = log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_file = log_dir.join("bibi.log");

    let file = std::fs::OpenOptions::new().create(true).append(true).open(&log_file)?;
    let target = Box::new(Tee { file, stderr: to_stderr });

    let mut builder = env_logger::Builder::new();
    if to_stderr {
        builder.filter_level(log::LevelFilter::Info);
    }
    builder
        .parse_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized: {}", log_file.display());
    Ok(())
}

fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bibi")
        .join("logs")
}

fn tool_version(name: &str, flag: &str) -> Option<String> {
    Command::new(name)
        .arg(flag)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| {
            String::from_utf8_lossy(&o.stdout)
                .trim()
                .lines()
                .next()
                .unwrap_or("")
                .to_string()
        })
}

fn tool_line(name: &str, version: Option<String>, purpose: &str) -> String {
    match version {
        Some(v) => format!("  \x1b[32m✅\x1b[0m {name:<10}{v}"),
        None => format!("  \x1b[31m❌\x1b[0m {name:<10}(not found, needed for {purpose})"),
    }
}

fn build_after_help() -> String {
    let yt_dlp = tool_line("yt-dlp", tool_version("yt-dlp", "--version"), "audio transcription");
    let ffmpeg = tool_line("ffmpeg", tool_version("ffmpeg", "-version"), "splitting long audio");

    format!(
        "\nREQUIRED TOOLS:\n{yt_dlp}\n{ffmpeg}\n\nConfig: {}\nLogs are written to: {}",
        bibi::config::config_path().display(),
        log_dir().join("bibi.log").display()
    )
}

/// Retry an async operation with exponential backoff
async fn retry<F, Fut, T>(max_attempts: u32, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..max_attempts {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if attempt + 1 < max_attempts {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    debug!("Attempt {} failed: {e}, retrying in {delay:?}", attempt + 1);
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| eyre!("no attempts made")))
}

/// URLs from the argument, or one per stdin line
fn collect_urls(url: Option<String>, usage: &str) -> Result<Vec<String>> {
    let urls: Vec<String> = match url {
        Some(url) => vec![url],
        None => io::stdin().lock().lines().collect::<Result<Vec<_>, _>>()?,
    };
    let urls: Vec<String> = urls
        .into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();
    if urls.is_empty() {
        bail!("no URL or video ID provided\n\nUsage: {usage}");
    }
    Ok(urls)
}

fn video_config(input: &str) -> Result<VideoConfig> {
    link::extract_video_config(input).ok_or_else(|| {
        eyre!(
            "could not recognise a video in: {input}\n\nSupported inputs:\n  https://www.bilibili.com/video/BV...\n  https://www.youtube.com/watch?v=ID\n  https://www.douyin.com/video/ID\n  podcast / meeting links\n  local audio or video files"
        )
    })
}

async fn load_transcript(
    client: &reqwest::Client,
    config: &Config,
    video: &VideoConfig,
    user_key: Option<&str>,
    use_cache: bool,
) -> Result<Transcript> {
    let ctx = FetchContext {
        client,
        config,
        user_key,
        progress: Progress::none(),
        use_cache,
    };
    fetch_subtitle(&ctx, video).await.map_err(|e| match e.downcast_ref::<NoTranscript>() {
        Some(no) => eyre!("{}\n{}", no.error(), no.message()),
        None => e,
    })
}

fn describe(transcript: &Transcript) {
    eprintln!(
        "Video: {} ({})\nService: {}\nSource: {}\nSegments: {}\nDuration: {}",
        transcript.title,
        transcript.video_id,
        transcript.service,
        transcript.source,
        transcript.segments.len(),
        transcript
            .duration
            .map(timestamp::seconds_to_time_string)
            .unwrap_or_else(|| "unknown".to_string()),
    );
}

fn write_output(path: Option<&Path>, rendered: &str, verbose: bool) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, rendered)?;
            if verbose {
                eprintln!("Output written to: {}", path.display());
            }
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

struct TranscriptArgs {
    url: Option<String>,
    format: TranscriptFormat,
    timestamps: bool,
    output: Option<PathBuf>,
    no_cache: bool,
}

async fn run_transcript(config: &Config, args: TranscriptArgs, verbose: bool) -> Result<()> {
    let client = reqwest::Client::new();
    for input in collect_urls(args.url, "bibi transcript <URL>")? {
        let video = video_config(&input)?;
        let transcript = load_transcript(&client, config, &video, None, !args.no_cache).await?;
        if verbose {
            describe(&transcript);
        }

        let rendered = match args.format {
            TranscriptFormat::Text if args.timestamps => output::render_timestamped(&transcript),
            TranscriptFormat::Text => output::render_text(&transcript),
            TranscriptFormat::Json => output::render_json(&transcript)?,
            TranscriptFormat::Srt => output::render_srt(&transcript),
        };
        write_output(args.output.as_deref(), &rendered, verbose)?;
    }
    Ok(())
}

struct SummarizeArgs {
    url: Option<String>,
    format: SummaryFormat,
    template: Option<String>,
    prompt: Option<String>,
    timestamps: bool,
    language: Option<String>,
    key: Option<String>,
    output: Option<PathBuf>,
    vault: PathBuf,
    no_cache: bool,
}

/// Settings and custom instructions from the saved preferences, the chosen
/// template and the command line, later ones winning
fn prepare_video(store: &Store, args: &SummarizeArgs, mut video: VideoConfig) -> Result<VideoConfig> {
    let prefs = store.preferences();
    let mut settings = prefs.default_settings();

    if let Some(id) = &args.template {
        let template = store
            .template(id)
            .ok_or_else(|| eyre!("template not found: {id} (see `bibi template list`)"))?;
        if let Some(config) = &template.config {
            settings = config.clone().or(&settings);
        }
        if !template.prompt_template.trim().is_empty() {
            video.custom_prompt = Some(template.prompt_template.clone());
        }
    }
    if let Some(language) = &args.language {
        settings.output_language = Some(language.clone());
    }
    if args.timestamps {
        settings.show_timestamp = Some(true);
    }
    if let Some(prompt) = &args.prompt {
        video.custom_prompt = Some(prompt.clone());
    }
    video.settings = settings;
    Ok(video)
}

async fn run_summarize(config: &Config, store: &Store, args: SummarizeArgs, verbose: bool) -> Result<()> {
    let client = reqwest::Client::new();
    let user_key = args.key.as_deref();
    let api = keys::select_api_key(user_key, config)?;

    for input in collect_urls(args.url.clone(), "bibi summarize <URL>")? {
        let video = prepare_video(store, &args, video_config(&input)?)?;
        let transcript = load_transcript(&client, config, &video, user_key, !args.no_cache).await?;
        if verbose {
            describe(&transcript);
        }

        let show_timestamp = video.settings.show_timestamp.unwrap_or(false);
        let request = summarize::summary_request(config.model(), &transcript, &video, show_timestamp, user_key.is_some());

        let live = args.format == SummaryFormat::Markdown && args.output.is_none();
        let summary = if live {
            let mut stdout = io::stdout();
            let summary = summarize::stream_chat(&client, &api, request, |delta| {
                let _ = write!(stdout, "{delta}");
                let _ = stdout.flush();
            })
            .await?;
            println!();
            summary
        } else {
            retry(3, || summarize::complete(&client, &api, request.clone())).await?
        };
        let summary = timestamp::clamp_summary_timestamps(&summary, transcript.duration);

        let source_url = media::source_url(&video);
        match args.format {
            SummaryFormat::Markdown if live => {}
            SummaryFormat::Markdown => {
                write_output(args.output.as_deref(), &export::render(ExportFormat::Markdown, &transcript.title, &summary), verbose)?
            }
            SummaryFormat::Html => {
                write_output(args.output.as_deref(), &export::render(ExportFormat::Word, &transcript.title, &summary), verbose)?
            }
            SummaryFormat::Mindmap => write_output(
                args.output.as_deref(),
                &export::render(ExportFormat::MindMap, &transcript.title, &summary),
                verbose,
            )?,
            SummaryFormat::Obsidian => {
                let path = notes::obsidian::write(&args.vault, &summary, &source_url)?;
                eprintln!("Note written to: {}", path.display());
            }
        }

        store.add_history(NewVideoHistory {
            video_id: video.video_id.clone(),
            video_url: source_url,
            title: transcript.title.clone(),
            summary,
            video_service: video.service.to_string(),
            subtitles_array: Some(transcript.segments),
        })?;
        store.record_config_usage(&video.settings)?;
    }
    Ok(())
}

fn run_history(store: &Store, action: HistoryAction) -> Result<()> {
    match action {
        HistoryAction::List => {
            for entry in store.history() {
                let when = chrono::DateTime::from_timestamp_millis(entry.timestamp)
                    .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!("{}  {when}  {:<9} {}  {}", entry.id, entry.video_service, entry.video_id, entry.title);
            }
        }
        HistoryAction::Show { video_id } => {
            let entry = store
                .find_history(&video_id)
                .ok_or_else(|| eyre!("no history for video: {video_id}"))?;
            println!("# {}\n{}\n\n{}", entry.title, entry.video_url, entry.summary);
        }
        HistoryAction::Remove { id } => {
            if !store.remove_history(&id)? {
                bail!("history entry not found: {id}");
            }
        }
        HistoryAction::Clear => store.clear_history()?,
    }
    Ok(())
}

fn run_template(store: &Store, action: TemplateAction) -> Result<()> {
    match action {
        TemplateAction::List => {
            for template in store.templates() {
                let marker = if template.is_default() { "*" } else { " " };
                println!(
                    "{marker} {:<38} {}  {}",
                    template.id,
                    template.name,
                    template.description.unwrap_or_default()
                );
            }
        }
        TemplateAction::Add {
            name,
            prompt,
            description,
        } => {
            let created = store.add_template(NewTemplate {
                name,
                description,
                prompt_template: prompt,
                config: None,
            })?;
            println!("{}", created.id);
        }
        TemplateAction::Remove { id } => {
            if store.template(&id).is_some_and(|t| t.is_default()) {
                bail!("the default template cannot be removed");
            }
            if !store.delete_template(&id)? {
                bail!("template not found: {id}");
            }
        }
    }
    Ok(())
}

fn run_prefs(store: &Store, action: PrefsAction) -> Result<()> {
    let prefs = match action {
        PrefsAction::Show => store.preferences(),
        PrefsAction::Reset => store.reset_preferences()?,
    };
    println!("{}", serde_json::to_string_pretty(&prefs)?);
    if let Some(settings) = store.most_used_config() {
        println!("\nMost used settings: {}", serde_json::to_string(&settings)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let after_help = build_after_help();
    let cmd = <Cli as clap::CommandFactory>::command().after_help(after_help);
    let matches = cmd.get_matches();
    let cli = <Cli as clap::FromArgMatches>::from_arg_matches(&matches)?;

    setup_logging(matches!(cli.command, cli::Command::Serve { .. }))?;

    // Config file is optional; the environment overrides it
    let mut config = Config::load().unwrap_or_default();
    config.apply_env();

    if cli.verbose {
        let config_path = bibi::config::config_path();
        if config_path.exists() {
            eprintln!("Config: {}", config_path.display());
        }
        debug!("Model: {}", config.model());
    }

    let store = Store::open_default();

    match cli.command {
        cli::Command::Transcript {
            url,
            format,
            timestamps,
            output,
            no_cache,
        } => {
            let args = TranscriptArgs {
                url,
                format,
                timestamps,
                output,
                no_cache,
            };
            run_transcript(&config, args, cli.verbose).await
        }
        cli::Command::Summarize {
            url,
            format,
            template,
            prompt,
            timestamps,
            language,
            key,
            model,
            output,
            vault,
            no_cache,
        } => {
            if model.is_some() {
                config.default_model = model;
            }
            let args = SummarizeArgs {
                url,
                format,
                template,
                prompt,
                timestamps,
                language,
                key,
                output,
                vault,
                no_cache,
            };
            run_summarize(&config, &store, args, cli.verbose).await
        }
        cli::Command::Serve { port } => {
            if port.is_some() {
                config.port = port;
            }
            bibi::server::serve(config, store).await
        }
        cli::Command::History { action } => run_history(&store, action),
        cli::Command::Template { action } => run_template(&store, action),
        cli::Command::Prefs { action } => run_prefs(&store, action),
    }
}
