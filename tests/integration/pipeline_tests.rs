//! End-to-end conversion tests.
//!
//! Tests verify:
//! - A synthetic slide converts to a PNG equal to the tissue pixels
//! - Preview level choice does not change the exported region
//! - Missing tiles export as black
//! - Blank slides, missing inputs and bad destinations fail cleanly
//!   without leaving output behind

use image::{ColorType, Rgb, Rgba};

use mrxs_crop::crop::{
    BoundingBox, ColorMode, ConvertOptions, Converter, PngCompression, PreviewSelection,
    RoiStrategy,
};
use mrxs_crop::error::{ConvertError, Stage};
use mrxs_crop::format::MiraxReader;

use super::test_utils::{expected_crop, max_channel_diff, SyntheticMrxs, TileEncoding};

fn dir_entries(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_converts_tissue_region_losslessly() {
    let dir = tempfile::tempdir().unwrap();
    let slide = SyntheticMrxs::default();
    let input = slide.write_to(dir.path(), "tissue");
    let output = dir.path().join("tissue.png");

    let report = Converter::new(ConvertOptions::new(&input, &output))
        .run()
        .await
        .unwrap();

    assert_eq!(report.preview_level, 3);
    assert_eq!((report.preview_width, report.preview_height), (64, 48));
    assert_eq!(report.downsample, 8.0);
    assert_eq!(report.preview_box, BoundingBox::new(16, 12, 47, 35).unwrap());
    assert_eq!(report.region, BoundingBox::new(128, 96, 383, 287).unwrap());
    assert_eq!((report.output_width, report.output_height), (256, 192));
    assert!(!report.full_frame);
    assert_eq!(
        report.summary(),
        "Successfully saved 256x192 cropped image (original size)"
    );
    assert!(report.timings.total >= report.timings.saving);

    let written = image::open(&output).unwrap();
    assert_eq!(written.color(), ColorType::Rgb8);
    assert_eq!(written.to_rgb8(), expected_crop(&slide, 128, 96, 384, 288));
    assert_eq!(
        std::fs::metadata(&output).unwrap().len(),
        report.bytes_written
    );
}

#[tokio::test]
async fn test_preview_level_choice_gives_same_region() {
    let dir = tempfile::tempdir().unwrap();
    let input = SyntheticMrxs::default().write_to(dir.path(), "levels");

    for preview in [
        PreviewSelection::Level(0),
        PreviewSelection::Level(1),
        PreviewSelection::Level(2),
        PreviewSelection::Downsample(8.0),
    ] {
        let output = dir.path().join("levels.png");
        let options = ConvertOptions::new(&input, &output).with_preview(preview);
        let report = Converter::new(options).run().await.unwrap();
        assert_eq!(
            report.region,
            BoundingBox::new(128, 96, 383, 287).unwrap(),
            "{:?}",
            preview
        );
    }
}

#[tokio::test]
async fn test_full_frame_tissue_exports_whole_slide() {
    let dir = tempfile::tempdir().unwrap();
    let slide = SyntheticMrxs::default().with_tissue(0, 0, 512, 384);
    let input = slide.write_to(dir.path(), "full");
    let output = dir.path().join("full.png");

    let report = Converter::new(ConvertOptions::new(&input, &output))
        .run()
        .await
        .unwrap();

    assert!(report.full_frame);
    assert_eq!((report.output_width, report.output_height), (512, 384));
    assert_eq!(
        image::open(&output).unwrap().to_rgb8(),
        expected_crop(&slide, 0, 0, 512, 384)
    );
}

#[tokio::test]
async fn test_full_frame_tissue_with_largest_contour() {
    let dir = tempfile::tempdir().unwrap();
    let slide = SyntheticMrxs::default().with_tissue(0, 0, 512, 384);
    let input = slide.write_to(dir.path(), "edge");
    let output = dir.path().join("edge.png");

    let options =
        ConvertOptions::new(&input, &output).with_strategy(RoiStrategy::LargestContour);
    let report = Converter::new(options).run().await.unwrap();

    assert!(report.full_frame);
    assert_eq!(report.region, BoundingBox::new(0, 0, 511, 383).unwrap());
    assert_eq!((report.output_width, report.output_height), (512, 384));
}

#[tokio::test]
async fn test_missing_tile_exports_black() {
    let dir = tempfile::tempdir().unwrap();
    let slide = SyntheticMrxs::default().with_missing(3, 2);
    let input = slide.write_to(dir.path(), "gappy");
    let output = dir.path().join("gappy.png");

    let report = Converter::new(ConvertOptions::new(&input, &output))
        .run()
        .await
        .unwrap();
    assert_eq!(report.region, BoundingBox::new(128, 96, 383, 287).unwrap());

    let written = image::open(&output).unwrap().to_rgb8();
    // Tile (3, 2) covers level-0 (192..256, 128..192)
    assert_eq!(written.get_pixel(192 - 128 + 5, 128 - 96 + 5), &Rgb([0, 0, 0]));
    assert_eq!(written, expected_crop(&slide, 128, 96, 384, 288));
}

#[tokio::test]
async fn test_rgba_output_keeps_missing_tiles_transparent() {
    let dir = tempfile::tempdir().unwrap();
    let slide = SyntheticMrxs::default().with_missing(3, 2);
    let input = slide.write_to(dir.path(), "alpha");
    let output = dir.path().join("alpha.png");

    let options = ConvertOptions::new(&input, &output)
        .with_color_mode(ColorMode::Rgba)
        .with_compression(PngCompression::Fast);
    Converter::new(options).run().await.unwrap();

    let written = image::open(&output).unwrap();
    assert_eq!(written.color(), ColorType::Rgba8);
    let rgba = written.to_rgba8();
    assert_eq!(rgba.get_pixel(0, 0)[3], 255);
    assert_eq!(rgba.get_pixel(70, 40), &Rgba([0, 0, 0, 0]));
}

#[tokio::test]
async fn test_largest_contour_strategy() {
    let dir = tempfile::tempdir().unwrap();
    let input = SyntheticMrxs::default().write_to(dir.path(), "contour");
    let output = dir.path().join("contour.png");

    let options =
        ConvertOptions::new(&input, &output).with_strategy(RoiStrategy::LargestContour);
    let report = Converter::new(options).run().await.unwrap();

    assert_eq!(report.strategy, RoiStrategy::LargestContour);
    assert_eq!(report.region, BoundingBox::new(128, 96, 383, 287).unwrap());
}

#[tokio::test]
async fn test_jpeg_slide_converts() {
    let dir = tempfile::tempdir().unwrap();
    let slide = SyntheticMrxs::default().with_encoding(TileEncoding::Jpeg);
    let source = slide.memory_source();
    let reader = MiraxReader::open(&source).await.unwrap();
    let output = dir.path().join("jpeg.png");

    let report = Converter::new(ConvertOptions::new("jpeg.mrxs", &output))
        .run_with_slide(reader)
        .await
        .unwrap();

    // Lossy tiles may move the tissue edge by a preview pixel or two
    let region = report.region;
    assert!(region.x_min.abs_diff(128) <= 16 && region.y_min.abs_diff(96) <= 16);
    assert!(region.x_max.abs_diff(383) <= 16 && region.y_max.abs_diff(287) <= 16);

    let written = image::open(&output).unwrap().to_rgb8();
    assert_eq!(written.dimensions(), region.size());
    let expected = expected_crop(
        &slide,
        region.x_min,
        region.y_min,
        region.x_max + 1,
        region.y_max + 1,
    );
    assert!(max_channel_diff(&written, &expected) < 255);
}

#[tokio::test]
async fn test_blank_slide_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = SyntheticMrxs::blank().write_to(dir.path(), "blank");
    let output = dir.path().join("blank.png");

    let err = Converter::new(ConvertOptions::new(&input, &output))
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Detection);
    assert!(matches!(err.source, ConvertError::DegenerateRegion(_)));
    assert_eq!(err.exit_code(), 12);
    assert!(!output.exists());
}

#[tokio::test]
async fn test_missing_input_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.png");

    let err = Converter::new(ConvertOptions::new(dir.path().join("nope.mrxs"), &output))
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Open);
    assert!(matches!(err.source, ConvertError::OpenFailure { .. }));
    assert!(err.to_string().starts_with("opening slide failed"));
    assert!(dir_entries(dir.path()).is_empty());
}

#[tokio::test]
async fn test_corrupt_slide_is_open_failure() {
    let dir = tempfile::tempdir().unwrap();
    let input = SyntheticMrxs::default().write_to(dir.path(), "corrupt");
    std::fs::write(dir.path().join("corrupt").join("Index.dat"), b"02.00 junk").unwrap();
    let output = dir.path().join("corrupt.png");

    let err = Converter::new(ConvertOptions::new(&input, &output))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err.source, ConvertError::OpenFailure { .. }));
    assert_eq!(err.exit_code(), 10);
    assert!(!output.exists());
}

#[tokio::test]
async fn test_missing_output_directory_fails_before_reading() {
    let dir = tempfile::tempdir().unwrap();
    let input = SyntheticMrxs::default().write_to(dir.path(), "slide");
    let output = dir.path().join("missing").join("slide.png");

    let err = Converter::new(ConvertOptions::new(&input, &output))
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Saving);
    assert!(matches!(err.source, ConvertError::WriteError { .. }));
    assert_eq!(dir_entries(dir.path()), vec!["slide", "slide.mrxs"]);
}

#[tokio::test]
async fn test_report_serializes() {
    let dir = tempfile::tempdir().unwrap();
    let input = SyntheticMrxs::default().write_to(dir.path(), "report");
    let output = dir.path().join("report.png");

    let report = Converter::new(ConvertOptions::new(&input, &output))
        .run()
        .await
        .unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["output_width"], 256);
    assert_eq!(json["region"]["x_max"], 383);
    assert_eq!(json["strategy"], "all");
    assert_eq!(json["compression"], "default");
    assert!(json["timings"]["total"].as_f64().unwrap() >= 0.0);
}
