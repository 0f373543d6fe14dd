//! Benchmarks for the hot paths: PCM sample conversion runs on the audio
//! callback cadence, narration formatting runs once per search.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use bizvoice_gateway::core::audio::{f32_to_pcm16, pcm16_bytes_to_samples, pcm16_to_f32};
use bizvoice_gateway::core::search::{BusinessHit, voice_response};

fn sample_frame(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| ((i as f32) * 0.01).sin() * 0.8)
        .collect()
}

fn sample_hits(count: usize) -> Vec<BusinessHit> {
    (0..count)
        .map(|i| BusinessHit {
            id: format!("b{i}"),
            name: format!("Business {i}"),
            description: "family owned restaurant".to_string(),
            address: "2345 J St, Sacramento, CA 95816".to_string(),
            city: "Sacramento".to_string(),
            latitude: 38.57,
            longitude: -121.47,
            phone: None,
            website: None,
            source: "supabase".to_string(),
            similarity: Some(0.9),
        })
        .collect()
}

fn bench_pcm_conversion(c: &mut Criterion) {
    // One 20ms frame at 48kHz, the WebRTC capture cadence.
    let frame = sample_frame(960);
    c.bench_function("f32_to_pcm16_960", |b| {
        b.iter(|| f32_to_pcm16(black_box(&frame)))
    });

    let pcm = f32_to_pcm16(&frame);
    c.bench_function("pcm16_to_f32_960", |b| {
        b.iter(|| pcm16_to_f32(black_box(&pcm)))
    });

    let bytes: Vec<u8> = pcm.iter().flat_map(|s| s.to_le_bytes()).collect();
    c.bench_function("pcm16_bytes_to_samples_1920", |b| {
        b.iter(|| pcm16_bytes_to_samples(black_box(&bytes)))
    });
}

fn bench_narration(c: &mut Criterion) {
    let hits = sample_hits(5);
    c.bench_function("voice_response_5_hits", |b| {
        b.iter(|| voice_response(black_box(&hits), black_box("pizza")))
    });

    c.bench_function("voice_response_empty", |b| {
        b.iter(|| voice_response(black_box(&[]), black_box("pizza")))
    });
}

criterion_group!(benches, bench_pcm_conversion, bench_narration);
criterion_main!(benches);
