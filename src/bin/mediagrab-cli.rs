use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::level_filters::LevelFilter;

use mediagrab::catalogs::ytdlp::YtDlpCatalog;
use mediagrab::tool::Ffmpeg;
use mediagrab::{
    Config, DownloadRequest, DownloadResult, Pipeline, ProgressEvent, ProgressSink, QualityTarget,
};

#[derive(Parser, Debug)]
#[command(name = "mediagrab")]
#[command(about = "Download a video, its audio, or a whole playlist")]
struct Params {
    /// Video or playlist URL. Prompted for when omitted.
    url: Option<String>,

    /// Download audio only and convert it to MP3.
    #[arg(short = 'a', long = "audio-only", default_value_t = false)]
    audio_only: bool,

    /// Highest video height to accept (e.g. 1080, 720, 480, 360).
    #[arg(short = 'q', long = "quality", default_value = "720")]
    quality: String,

    /// Directory that receives finished downloads.
    #[arg(short = 'o', long = "out-dir", default_value = "downloads")]
    out_dir: PathBuf,

    /// Directory for intermediate files (defaults to the OS temp dir).
    #[arg(long = "scratch-dir")]
    scratch_dir: Option<PathBuf>,

    /// ffmpeg executable.
    #[arg(long = "ffmpeg", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// yt-dlp executable.
    #[arg(long = "yt-dlp", default_value = "yt-dlp")]
    yt_dlp: PathBuf,

    /// Time budget for one merge or conversion, in seconds.
    #[arg(long = "timeout-secs", default_value_t = 300)]
    timeout_secs: u64,

    /// Do not save a thumbnail next to the finished file.
    #[arg(long = "no-thumbnail", default_value_t = false)]
    no_thumbnail: bool,
}

/// Renders pipeline progress as a terminal progress bar.
struct BarSink {
    bar: ProgressBar,
}

impl BarSink {
    fn new() -> Result<Self> {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
                .context("invalid progress template")?
                .progress_chars("#>-"),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Ok(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for BarSink {
    fn notify(&self, event: &ProgressEvent) {
        if let Some(item) = &event.item {
            self.bar.println(format!("🎬 {}", item.title));
            self.bar.println(format!("📺 {}", item.author));
            self.bar.println(format!("⏱  Duration: {}", item.duration));
        }

        match event.percent {
            Some(percent) => {
                // Each playlist item restarts at 0; let the bar follow.
                self.bar.set_position(u64::from(percent));
                self.bar.set_message(event.message.clone());
            }
            None => self.bar.println(&event.message),
        }
    }
}

fn main() -> Result<()> {
    mediagrab::logging::init(LevelFilter::WARN);
    let params = Params::parse();
    let request = build_request(&params, &mut io::stdin().lock(), &mut io::stdout())?;

    let mut config = Config::new(&params.out_dir)
        .with_conversion_timeout(Duration::from_secs(params.timeout_secs))
        .with_thumbnails(!params.no_thumbnail);
    if let Some(dir) = &params.scratch_dir {
        config = config.with_scratch_dir(dir);
    }

    let pipeline = Pipeline::new(
        YtDlpCatalog::with_program(&params.yt_dlp),
        Ffmpeg::with_program(&params.ffmpeg),
        config,
    );

    let sink = BarSink::new()?;
    let result = pipeline.run(&request, &sink);
    sink.finish();

    print!("{}", summary(&result));
    if !result.success || result.results.iter().any(|r| !r.success) {
        bail!("download did not complete");
    }
    Ok(())
}

/// Turn flags into a request, prompting for whatever the user left out.
fn build_request(
    params: &Params,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<DownloadRequest> {
    let (url, audio_only, quality) = match &params.url {
        Some(url) => (url.clone(), params.audio_only, params.quality.clone()),
        None => {
            let url = prompt(input, out, "Enter video or playlist URL: ")?;
            let audio_only = params.audio_only || {
                let mode = prompt(input, out, "Download (v)ideo or (a)udio only? [v/a]: ")?;
                mode.eq_ignore_ascii_case("a")
            };
            let quality = if audio_only {
                params.quality.clone()
            } else {
                let answer = prompt(input, out, "Quality (1080, 720, 480, 360): ")?;
                if answer.is_empty() {
                    params.quality.clone()
                } else {
                    answer
                }
            };
            (url, audio_only, quality)
        }
    };

    let target = QualityTarget::from_parts(Some(&quality), audio_only)?;
    Ok(DownloadRequest::new(url, target))
}

fn prompt(input: &mut impl BufRead, out: &mut impl Write, question: &str) -> Result<String> {
    write!(out, "{question}")?;
    out.flush()?;

    let mut line = String::new();
    input.read_line(&mut line).context("failed to read answer")?;
    Ok(line.trim().to_owned())
}

fn summary(result: &DownloadResult) -> String {
    let mut out = String::new();

    if !result.results.is_empty() {
        let ok = result.results.iter().filter(|r| r.success).count();
        out.push_str(&format!(
            "📜 Playlist finished: {ok}/{} downloaded\n",
            result.results.len()
        ));
        for (idx, item) in result.results.iter().enumerate() {
            out.push_str(&format!("  [{}] {}\n", idx + 1, line_for(item)));
        }
        return out;
    }

    out.push_str(&line_for(result));
    out.push('\n');
    out
}

fn line_for(result: &DownloadResult) -> String {
    match (&result.filename, &result.error) {
        (Some(name), _) if result.success => format!("✅ saved: {name}"),
        (_, Some(err)) => format!("❌ {err}"),
        _ => "✅ done".to_owned(),
    }
}
