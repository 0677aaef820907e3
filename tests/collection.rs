mod common;

use mediagrab::{Config, DownloadRequest, ErrorKind, Pipeline, QualityTarget, ResultKind};

use common::{FakeCatalog, FakeTool, Recorder, ToolBehavior, audio, file_names, video};

const PLAYLIST: &str = "https://www.youtube.com/playlist?list=PL123";

fn member(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={id}")
}

fn streams() -> Vec<mediagrab::media::Representation> {
    vec![video("v720", 720, "mp4"), audio("a160", 160)]
}

#[test]
fn failing_member_does_not_stop_the_rest() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let config = Config::new(root.path().join("out")).with_scratch_dir(root.path().join("tmp"));
    let (a, b, c) = (member("aaaaaaaaaaa"), member("bbbbbbbbbbb"), member("ccccccccccc"));

    // `b` is listed but the catalog cannot resolve it.
    let catalog = FakeCatalog::new()
        .with_item(&a, "First", streams())
        .with_item(&c, "Third", streams())
        .with_collection(PLAYLIST, "Mix", &[
            (a.as_str(), "First"),
            (b.as_str(), "Second"),
            (c.as_str(), "Third"),
        ]);
    let pipeline = Pipeline::new(catalog, FakeTool::new(ToolBehavior::Succeed), config);
    let rec = Recorder::default();

    let result = pipeline.run(&DownloadRequest::new(PLAYLIST, QualityTarget::default()), &rec);

    assert!(result.success);
    assert_eq!(result.kind, ResultKind::Playlist);
    let outcomes: Vec<bool> = result.results.iter().map(|r| r.success).collect();
    assert_eq!(outcomes, [true, false, true]);
    assert_eq!(result.results[1].error_kind, Some(ErrorKind::CatalogError));
    assert_eq!(result.results[0].filename.as_deref(), Some("First (720p).mp4"));
    assert_eq!(result.results[2].filename.as_deref(), Some("Third (720p).mp4"));

    let checkpoints = rec.checkpoints();
    let position = |msg: &str, pct: u8| {
        checkpoints
            .iter()
            .position(|(m, p)| m == msg && *p == pct)
            .unwrap_or_else(|| panic!("missing checkpoint {msg:?} at {pct}"))
    };
    let fetching = position("Fetching playlist information...", 0);
    let header = position("Playlist: Mix (3 videos)", 5);
    let first = position("[1/3] First", 30);
    let second = position("[2/3] Second", 60);
    let third = position("[3/3] Third", 90);
    assert!(fetching < header && header < first && first < second && second < third);
    assert_eq!(
        checkpoints.last(),
        Some(&("Playlist download complete!".to_owned(), 100))
    );

    assert_eq!(
        file_names(&root.path().join("out")),
        [
            "First (720p).jpg",
            "First (720p).mp4",
            "Third (720p).jpg",
            "Third (720p).mp4"
        ]
    );
    Ok(())
}

#[test]
fn playlist_lookup_failure_is_a_playlist_failure() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let pipeline = Pipeline::new(
        FakeCatalog::new(),
        FakeTool::new(ToolBehavior::Succeed),
        Config::new(root.path()),
    );
    let rec = Recorder::default();

    let result = pipeline.download_collection(PLAYLIST, QualityTarget::default(), &rec);

    assert!(!result.success);
    assert_eq!(result.kind, ResultKind::Playlist);
    assert_eq!(result.error_kind, Some(ErrorKind::CatalogError));
    assert!(result.results.is_empty());
    let (message, percent) = rec
        .checkpoints()
        .pop()
        .ok_or_else(|| anyhow::anyhow!("no events"))?;
    assert!(message.starts_with("Error: "), "{message}");
    assert_eq!(percent, 0);
    Ok(())
}

#[test]
fn empty_playlist_completes_with_no_results() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let catalog = FakeCatalog::new().with_collection(PLAYLIST, "Nothing here", &[]);
    let pipeline = Pipeline::new(
        catalog,
        FakeTool::new(ToolBehavior::Succeed),
        Config::new(root.path()),
    );
    let rec = Recorder::default();

    let result = pipeline.download_collection(PLAYLIST, QualityTarget::default(), &rec);

    assert!(result.success);
    assert!(result.results.is_empty());
    assert_eq!(
        rec.checkpoints(),
        [
            ("Fetching playlist information...".to_owned(), 0),
            ("Playlist: Nothing here (0 videos)".to_owned(), 5),
            ("Playlist download complete!".to_owned(), 100),
        ]
    );
    Ok(())
}

#[test]
fn audio_only_applies_to_every_member() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let (a, b) = (member("aaaaaaaaaaa"), member("bbbbbbbbbbb"));
    let catalog = FakeCatalog::new()
        .without_thumbnails()
        .with_item(&a, "One", streams())
        .with_item(&b, "Two", streams())
        .with_collection(PLAYLIST, "Songs", &[(a.as_str(), "One"), (b.as_str(), "Two")]);
    let pipeline = Pipeline::new(
        catalog,
        FakeTool::new(ToolBehavior::Succeed),
        Config::new(root.path().join("out")).with_scratch_dir(root.path().join("tmp")),
    );

    let result = pipeline.run(
        &DownloadRequest::new(PLAYLIST, QualityTarget::AudioOnly),
        &mediagrab::progress::NullSink,
    );

    assert!(result.results.iter().all(|r| r.success && r.kind == ResultKind::Audio));
    assert_eq!(pipeline.catalog().opened(), ["mem://a160", "mem://a160"]);
    assert_eq!(
        file_names(&root.path().join("out")),
        ["One.mp3", "Two.mp3"]
    );
    Ok(())
}
