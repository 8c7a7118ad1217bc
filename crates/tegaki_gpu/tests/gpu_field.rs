//! GPU field tests. Device-dependent cases skip when no compute adapter exists.

use tegaki_core::{CancelToken, ChannelFormat, FieldRequest, PixelRect, PolygonBuilder, StrokePoint, Tool};
use tegaki_gpu::{shaders, GpuContext, GpuError, GpuFieldGenerator};
use tegaki_paint::SoftwareFieldGenerator;

fn generator() -> Option<GpuFieldGenerator> {
    match GpuContext::new_blocking().and_then(GpuFieldGenerator::new) {
        Ok(generator) => Some(generator),
        Err(e) => {
            eprintln!("skipping gpu test: {e}");
            None
        }
    }
}

fn stroke_request() -> (tegaki_core::StrokePolygon, FieldRequest) {
    let polygon = PolygonBuilder::default()
        .build(
            &[
                StrokePoint::new(10.0, 10.0, 1.0),
                StrokePoint::new(30.0, 18.0, 1.0),
                StrokePoint::new(50.0, 12.0, 1.0),
            ],
            6.0,
            Tool::Pen,
        )
        .unwrap();
    let request = FieldRequest {
        region: PixelRect::enclosing(&polygon.bounds),
        format: ChannelFormat::Multi,
        refinement_pass: true,
        msdf_spread: 0.35,
    };
    (polygon, request)
}

#[test]
fn test_shaders_validate_without_device() {
    shaders::validate_all().unwrap();
}

#[test]
fn test_gpu_field_matches_software() {
    let Some(mut gpu) = generator() else { return };
    let (polygon, request) = stroke_request();
    let cancel = CancelToken::new();

    let expected = SoftwareFieldGenerator::new()
        .generate(&polygon, &request, &cancel)
        .unwrap();
    let actual = gpu.generate(&polygon, &request, &cancel).unwrap();

    assert_eq!(actual.region(), expected.region());
    let region = request.region;
    let mut mismatched_sign = 0;
    for y in region.y..region.max_y() {
        for x in region.x..region.max_x() {
            let a = actual.distance_at(x, y).unwrap();
            let e = expected.distance_at(x, y).unwrap();
            if (a < 0.0) != (e < 0.0) && e.abs() > 1.0 {
                mismatched_sign += 1;
            }
            assert!((a - e).abs() < 1.5, "({x}, {y}): gpu {a} vs software {e}");
        }
    }
    assert_eq!(mismatched_sign, 0);
}

#[test]
fn test_gpu_stamp_coverage() {
    let Some(mut gpu) = generator() else { return };
    let (polygon, request) = stroke_request();
    let coverage = gpu.stamp(&polygon, &request, 0.75, &CancelToken::new()).unwrap();

    assert!(coverage.get(30, 18) > 0.99);
    assert!(coverage.get(request.region.x, request.region.y) < 0.01);
}

#[test]
fn test_gpu_cancelled_before_start() {
    let Some(mut gpu) = generator() else { return };
    let (polygon, request) = stroke_request();
    let cancel = CancelToken::new();
    cancel.cancel();
    assert_eq!(gpu.generate(&polygon, &request, &cancel).unwrap_err(), GpuError::Cancelled);
}

#[test]
fn test_gpu_region_too_large() {
    let Some(gpu) = generator() else { return };
    let mut gpu = gpu.with_max_texture_dim(16);
    let (polygon, request) = stroke_request();
    assert!(matches!(
        gpu.generate(&polygon, &request, &CancelToken::new()),
        Err(GpuError::TooLarge { max: 16, .. })
    ));
}
