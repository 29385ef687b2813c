use criterion::{black_box, criterion_group, criterion_main, Criterion};
use video_analyzer_rust::frames::{frame_positions, SamplingRate};
use video_analyzer_rust::llm::ImageDetail;
use video_analyzer_rust::{AnalysisRequest, Frame, Prompts, SegmentationPolicy, Transcript};

/// Benchmark range planning for a two-day continuous source
fn bench_unbounded_plan(c: &mut Criterion) {
    let policy = SegmentationPolicy::Unbounded {
        seconds: 20,
        cap: 172_800,
    };

    c.bench_function("plan_unbounded_48h_20s", |b| {
        b.iter(|| black_box(policy).ranges(None).count())
    });
}

/// Benchmark range planning for a long local file
fn bench_fixed_plan(c: &mut Criterion) {
    let policy = SegmentationPolicy::FixedInterval { seconds: 60 };

    c.bench_function("plan_fixed_10h_60s", |b| {
        b.iter(|| black_box(policy).ranges(Some(black_box(36_000.0))).count())
    });
}

/// Benchmark frame position selection
fn bench_frame_positions(c: &mut Criterion) {
    let stride = SamplingRate::FramesPerSecond(0.5).stride(29.97);

    c.bench_function("frame_positions_1h", |b| {
        b.iter(|| frame_positions(black_box(107_892), stride).count())
    });
}

/// Benchmark building a vision request from sampled frames
fn bench_request_building(c: &mut Criterion) {
    let frames: Vec<Frame> = (0..60u64)
        .map(|i| Frame {
            ordinal: i as usize + 1,
            position: i * 30,
            timestamp: i as f64,
            jpeg: vec![0xAB; 24 * 1024],
        })
        .collect();
    let prompts = Prompts::new("Describe the video.", "These are the frames from the video.");
    let transcript = Transcript::Text("and now the chorus".to_string());

    c.bench_function("chat_request_60_frames", |b| {
        b.iter(|| {
            let request =
                AnalysisRequest::new(prompts.clone(), frames.clone(), Some(&transcript), 0.5);
            black_box(request.to_chat_request(4096, ImageDetail::Auto))
        })
    });
}

criterion_group!(
    benches,
    bench_unbounded_plan,
    bench_fixed_plan,
    bench_frame_positions,
    bench_request_building
);
criterion_main!(benches);
