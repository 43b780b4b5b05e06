//! End-to-end batch tests against a local HTTP server
//!
//! Images and the matting service are served by `mockito`; everything else
//! runs through the real fetcher, transformer and writer.

mod common;

use bgremove_batch::{
    error::{PipelineError, Result},
    run_batch, run_batch_and_archive, run_batch_from_csv, BatchRunner, ColorMode, PipelineConfig,
    Record, SkipReason, TargetSize, TransformOption, BATCH_ARCHIVE_NAME,
};
use common::{archive_entries, half_transparent_png, solid_image, write_table};
use image::ImageFormat;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn config_for(output_dir: &Path, matting_endpoint: String) -> Result<PipelineConfig> {
    PipelineConfig::builder()
        .output_dir(output_dir)
        .temp_dir(output_dir.join("scratch"))
        .concurrency(2)
        .matting_endpoint(matting_endpoint)
        .build()
}

fn load(path: &Path) -> image::DynamicImage {
    image::open(path).expect("artifact decodes")
}

#[tokio::test]
async fn test_original_option_writes_only_valid_records() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let image_mock = server
        .mock("GET", "/a.png")
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body(solid_image(10, 10, [10, 200, 30], ImageFormat::Png))
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new()?;
    let config = config_for(dir.path(), format!("{}/api/remove", server.url()))?;
    let records = vec![
        Record::new(format!("{}/a.png", server.url()), "a"),
        Record::new("not-a-url", "b"),
    ];

    let report = BatchRunner::new(config)?
        .run(&records, TransformOption::Original, None)
        .await?;

    assert_eq!(report.written, vec![dir.path().join("a.jpg")]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].output_name, "b");
    assert_eq!(report.skipped[0].reason, SkipReason::InvalidLocator);
    assert!(report.failed.is_empty());
    assert!(!dir.path().join("b.jpg").exists());

    let artifact = load(&dir.path().join("a.jpg"));
    assert_eq!(ColorMode::of(&artifact), ColorMode::Rgb);
    assert_eq!((artifact.width(), artifact.height()), (10, 10));

    image_mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_resize_without_size_issues_no_requests() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let image_mock = server
        .mock("GET", "/a.png")
        .with_body(solid_image(10, 10, [0, 0, 0], ImageFormat::Png))
        .expect(0)
        .create_async()
        .await;

    let dir = TempDir::new()?;
    let output_dir = dir.path().join("out");
    let config = config_for(&output_dir, format!("{}/api/remove", server.url()))?;
    let records = vec![Record::new(format!("{}/a.png", server.url()), "a")];

    let err = run_batch(&records, TransformOption::Resize, None, &config)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Validation(_)));
    assert!(!output_dir.join("a.jpg").exists());
    image_mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_resize_produces_exact_opaque_dimensions() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let _image_mock = server
        .mock("GET", "/big.jpg")
        .with_body(solid_image(400, 400, [120, 60, 30], ImageFormat::Jpeg))
        .create_async()
        .await;

    let dir = TempDir::new()?;
    let config = config_for(dir.path(), format!("{}/api/remove", server.url()))?;
    let records = vec![Record::new(format!("{}/big.jpg", server.url()), "big")];

    let written = run_batch(
        &records,
        TransformOption::Resize,
        Some(TargetSize::new(100, 100)?),
        &config,
    )
    .await?;

    assert_eq!(written, 1);
    let artifact = load(&dir.path().join("big.jpg"));
    assert_eq!((artifact.width(), artifact.height()), (100, 100));
    assert!(!artifact.color().has_alpha());
    Ok(())
}

#[tokio::test]
async fn test_background_removal_flattens_onto_white() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let _image_mock = server
        .mock("GET", "/product.png")
        .with_body(solid_image(40, 20, [0, 0, 255], ImageFormat::Png))
        .create_async()
        .await;
    let matting_mock = server
        .mock("POST", "/api/remove")
        .match_header(
            "content-type",
            mockito::Matcher::Regex("multipart/form-data.*".to_string()),
        )
        .with_body(half_transparent_png(40, 20))
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new()?;
    let config = config_for(dir.path(), format!("{}/api/remove", server.url()))?;
    let records = vec![Record::new(format!("{}/product.png", server.url()), "product")];

    let written = run_batch(&records, TransformOption::BackgroundRemove, None, &config).await?;
    assert_eq!(written, 1);

    let artifact = load(&dir.path().join("product.jpg")).to_rgb8();
    assert_eq!(artifact.dimensions(), (40, 20));

    let foreground = artifact.get_pixel(5, 10);
    assert!(foreground[0] > 200 && foreground[1] < 60 && foreground[2] < 60);

    let background = artifact.get_pixel(35, 10);
    assert!(background.0.iter().all(|&c| c > 240));

    matting_mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_failing_records_do_not_abort_batch() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let _ok = server
        .mock("GET", "/ok.png")
        .with_body(solid_image(8, 8, [1, 2, 3], ImageFormat::Png))
        .create_async()
        .await;
    let _missing = server
        .mock("GET", "/missing.png")
        .with_status(404)
        .create_async()
        .await;
    let _garbage = server
        .mock("GET", "/garbage.png")
        .with_body("this is not an image")
        .create_async()
        .await;

    let dir = TempDir::new()?;
    let config = config_for(dir.path(), format!("{}/api/remove", server.url()))?;
    let records = vec![
        Record::new(format!("{}/missing.png", server.url()), "missing"),
        Record::new(format!("{}/ok.png", server.url()), "ok"),
        Record::new(format!("{}/garbage.png", server.url()), "garbage"),
        Record::new(format!("{}/ok.png", server.url()), "ok"),
    ];

    let report = BatchRunner::new(config)?
        .run(&records, TransformOption::Original, None)
        .await?;

    assert_eq!(report.written, vec![dir.path().join("ok.jpg")]);
    let failed: Vec<(usize, &str)> = report
        .failed
        .iter()
        .map(|f| (f.index, f.output_name.as_str()))
        .collect();
    assert_eq!(failed, vec![(0, "missing"), (2, "garbage")]);
    assert!(report.failed[0].error.contains("404"));
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].reason, SkipReason::DuplicateOutputName);
    assert_eq!(report.total(), 4);
    Ok(())
}

#[tokio::test]
async fn test_matting_failure_is_per_record() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let _image = server
        .mock("GET", "/a.png")
        .with_body(solid_image(8, 8, [1, 2, 3], ImageFormat::Png))
        .create_async()
        .await;
    let _matting = server
        .mock("POST", "/api/remove")
        .with_status(503)
        .with_body("overloaded")
        .create_async()
        .await;

    let dir = TempDir::new()?;
    let config = config_for(dir.path(), format!("{}/api/remove", server.url()))?;
    let records = vec![Record::new(format!("{}/a.png", server.url()), "a")];

    let report = BatchRunner::new(config)?
        .run(&records, TransformOption::BackgroundRemove, None)
        .await?;

    assert_eq!(report.written_count(), 0);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].error.contains("overloaded"));
    assert!(!dir.path().join("a.jpg").exists());
    Ok(())
}

#[tokio::test]
async fn test_unresponsive_image_host_times_out_per_record() -> Result<()> {
    // Accepts connections and never answers.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;
    let silent_host = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let mut server = mockito::Server::new_async().await;
    let _ok = server
        .mock("GET", "/ok.png")
        .with_body(solid_image(8, 8, [1, 2, 3], ImageFormat::Png))
        .create_async()
        .await;

    let dir = TempDir::new()?;
    let config = PipelineConfig::builder()
        .output_dir(dir.path())
        .concurrency(2)
        .fetch_timeout(Duration::from_millis(200))
        .build()?;
    let records = vec![
        Record::new(format!("http://{}/slow.png", address), "slow"),
        Record::new(format!("{}/ok.png", server.url()), "ok"),
    ];

    let report = BatchRunner::new(config)?
        .run(&records, TransformOption::Original, None)
        .await?;

    assert_eq!(report.written, vec![dir.path().join("ok.jpg")]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].output_name, "slow");
    assert!(report.failed[0].error.contains("timed out"));
    assert!(!dir.path().join("slow.jpg").exists());

    silent_host.abort();
    Ok(())
}

#[tokio::test]
async fn test_original_rerun_is_idempotent() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let _image = server
        .mock("GET", "/a.png")
        .with_body(solid_image(16, 16, [90, 90, 200], ImageFormat::Png))
        .expect(2)
        .create_async()
        .await;

    let dir = TempDir::new()?;
    let config = config_for(dir.path(), format!("{}/api/remove", server.url()))?;
    let records = vec![Record::new(format!("{}/a.png", server.url()), "a")];

    run_batch(&records, TransformOption::Original, None, &config).await?;
    let first = std::fs::read(dir.path().join("a.jpg"))?;
    run_batch(&records, TransformOption::Original, None, &config).await?;
    let second = std::fs::read(dir.path().join("a.jpg"))?;

    assert_eq!(first, second);
    let jpgs = std::fs::read_dir(dir.path())?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "jpg"))
        .count();
    assert_eq!(jpgs, 1);
    Ok(())
}

#[tokio::test]
async fn test_csv_batch_and_archive() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let _image = server
        .mock("GET", "/shoe.png")
        .with_body(solid_image(12, 12, [200, 10, 10], ImageFormat::Png))
        .create_async()
        .await;

    let dir = TempDir::new()?;
    let output_dir = dir.path().join("processed");
    let table = dir.path().join("records.csv");
    let link = format!("{}/shoe.png", server.url());
    write_table(&table, &[(link.as_str(), "shoe"), ("", "empty")]);

    let config = config_for(&output_dir, format!("{}/api/remove", server.url()))?;
    let report = run_batch_from_csv(&table, TransformOption::Original, None, &config).await?;
    assert_eq!(report.written_count(), 1);
    assert_eq!(report.skipped[0].reason, SkipReason::MissingLocator);

    let records = bgremove_batch::read_records_from_path(&table)?;
    let (report, archive) =
        run_batch_and_archive(&records, TransformOption::Original, None, &config).await?;
    assert_eq!(report.written_count(), 1);
    assert_eq!(archive, output_dir.join(BATCH_ARCHIVE_NAME));
    assert_eq!(archive_entries(&archive), vec!["shoe.jpg".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_csv_missing_column_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let table = dir.path().join("records.csv");
    std::fs::write(&table, "Image link,Title\nhttps://x/a.png,a\n")?;

    let config = PipelineConfig::builder()
        .output_dir(dir.path().join("out"))
        .build()?;
    let err = run_batch_from_csv(&table, TransformOption::Original, None, &config)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Validation(_)));
    assert!(err.to_string().contains("Image Name"));
    Ok(())
}

#[tokio::test]
async fn test_archive_of_empty_batch_still_produced() -> Result<()> {
    let dir = TempDir::new()?;
    let config = PipelineConfig::builder()
        .output_dir(dir.path().join("out"))
        .build()?;
    let records = vec![Record::new("not-a-url", "a")];

    let (report, archive) =
        run_batch_and_archive(&records, TransformOption::Original, None, &config).await?;

    assert_eq!(report.written_count(), 0);
    assert!(archive.exists());
    assert!(archive_entries(&archive).is_empty());
    Ok(())
}
